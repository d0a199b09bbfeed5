// src/physical/mod.rs

//! OS-event-driven file watching.
//!
//! This module turns events from an OS watch backend into change-token
//! firings over a pattern registry:
//! - [`events`] defines the backend seam: an event enum plus enable/disable
//!   control, fed through an unbounded channel.
//! - [`notify_backend`] implements the seam over the `notify` crate.
//! - [`mock`] is a channel-fed backend for tests.
//! - [`watcher`] holds the registries and the event loop.

pub mod events;
pub mod mock;
pub mod notify_backend;
pub mod watcher;

pub use events::{FsEvent, WatchBackend};
pub use mock::MockBackend;
pub use notify_backend::NotifyBackend;
pub use watcher::PhysicalFilesWatcher;
