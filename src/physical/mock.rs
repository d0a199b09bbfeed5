// src/physical/mock.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::Result;
use crate::physical::events::WatchBackend;

/// Backend whose events are fed by the test through a channel it creates
/// itself. Only tracks the enabled flag.
#[derive(Debug, Default)]
pub struct MockBackend {
    enabled: Arc<AtomicBool>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared flag for asserting enable/disable transitions.
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        self.enabled.clone()
    }
}

impl WatchBackend for MockBackend {
    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
