// src/polling/mod.rs

//! Timer-driven change detection for filesystems without usable OS events.
//!
//! Polling tokens never scan on `has_changed` reads; all I/O happens in
//! `update_has_changed`, driven by the [`PollingFileWatcher`]'s timer (or
//! manually through [`PollingFileWatcher::poll_once`] in tests).

pub mod clock;
pub mod file_token;
pub mod watcher;
pub mod wildcard_token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use file_token::PollingFileChangeToken;
pub use watcher::{PollingFileWatcher, DEFAULT_INTERVAL, MIN_INTERVAL};
pub use wildcard_token::PollingWildCardChangeToken;
