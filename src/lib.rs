// src/lib.rs

//! Change-token based file watching for file providers.
//!
//! Callers subscribe to change notifications over a hierarchical file
//! namespace described by glob filters and receive each notification
//! exactly once per subscription, as a one-shot [`ChangeToken`]. Tokens are
//! fired either from OS file events ([`PhysicalFilesWatcher`]) or by
//! scanning on a timer ([`PollingFileWatcher`]); both are reachable through
//! the [`FileProvider`] surface, which can also be composed
//! ([`CombinedFileProvider`]) and cached ([`CachingFileProvider`]).
//!
//! The watchers spawn their event/timer loops onto the ambient tokio
//! runtime, and callbacks are dispatched on its blocking pool so user code
//! never runs on the event path.

pub mod errors;
pub mod glob;
pub mod physical;
pub mod polling;
pub mod provider;
pub mod token;

pub use errors::{Result, WatchError};
pub use physical::{FsEvent, MockBackend, NotifyBackend, PhysicalFilesWatcher, WatchBackend};
pub use polling::{
    Clock, ManualClock, PollingFileChangeToken, PollingFileWatcher, PollingWildCardChangeToken,
    SystemClock,
};
pub use provider::{
    CachingFileProvider, CombinedFileProvider, DirectoryContents, FileInfo, FileProvider,
    NullFileProvider, PhysicalFileProvider,
};
pub use token::{
    on_change, CancellationChangeToken, CancellationSource, ChangeCallback, ChangeToken,
    CombinedChangeToken, NoopToken, Subscription,
};
