// src/polling/file_token.rs

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use tracing::debug;

use crate::token::{CancellationSource, ChangeCallback, ChangeToken, Subscription};

/// One-shot token over a single file's last-write time.
///
/// The timestamp is snapshotted at construction; `None` means the file did
/// not exist. Each [`update_has_changed`] re-reads it and latches the
/// changed flag on any difference, so creation, modification and deletion
/// all count. Reads of `has_changed` never touch the filesystem.
///
/// [`update_has_changed`]: PollingFileChangeToken::update_has_changed
pub struct PollingFileChangeToken {
    path: PathBuf,
    snapshot: Option<SystemTime>,
    changed: AtomicBool,
    source: CancellationSource,
}

impl PollingFileChangeToken {
    /// Snapshot `path` now. The backing `source` is owned by the polling
    /// watcher, which cancels it once a tick observes the change.
    pub fn new(path: impl Into<PathBuf>, source: CancellationSource) -> Self {
        let path = path.into();
        let snapshot = last_write_time(&path);
        Self {
            path,
            snapshot,
            changed: AtomicBool::new(false),
            source,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &CancellationSource {
        &self.source
    }

    /// Refresh the file's last-write time and latch the flag if it moved
    /// away from the snapshot. Returns the (monotone) flag.
    pub fn update_has_changed(&self) -> bool {
        if !self.changed.load(Ordering::SeqCst) {
            let current = last_write_time(&self.path);
            if current != self.snapshot {
                debug!(path = ?self.path, "polled file changed");
                self.changed.store(true, Ordering::SeqCst);
            }
        }
        self.changed.load(Ordering::SeqCst)
    }
}

impl ChangeToken for PollingFileChangeToken {
    fn has_changed(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }

    fn active_callbacks(&self) -> bool {
        true
    }

    fn register_callback(&self, callback: ChangeCallback) -> Subscription {
        self.source.register(callback)
    }
}

fn last_write_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
