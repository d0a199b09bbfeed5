// src/physical/events.rs

use std::path::PathBuf;

use crate::errors::Result;

/// A file-system event as delivered by a watch backend.
///
/// Paths are absolute; the watcher relativizes them against its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    /// Something at this path was created, modified or deleted.
    Changed(PathBuf),
    /// A file or directory moved. For directories the watcher fans this out
    /// to every descendant on both sides.
    Renamed { from: PathBuf, to: PathBuf },
    /// The backend hit an error and may have dropped events.
    Error(String),
}

/// Control surface of an OS watch backend.
///
/// The backend is constructed per watched directory and delivers its events
/// through an unbounded channel handed to [`PhysicalFilesWatcher`]. The
/// watcher enables it when the first token is registered and disables it
/// again once every registered token has fired.
///
/// [`PhysicalFilesWatcher`]: crate::physical::PhysicalFilesWatcher
pub trait WatchBackend: Send {
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;
    fn is_enabled(&self) -> bool;
}
