// src/provider/physical.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::errors::Result;
use crate::glob::to_relative_path;
use crate::physical::{NotifyBackend, PhysicalFilesWatcher};
use crate::polling::PollingFileWatcher;
use crate::provider::{DirectoryContents, FileInfo, FileProvider};
use crate::token::{ChangeToken, NoopToken};

/// Provider over a directory on disk.
///
/// Lookups resolve subpaths beneath the root; anything absolute or escaping
/// through `..` is treated as not-found. `watch` is served by a
/// [`PhysicalFilesWatcher`] over OS events, or by a [`PollingFileWatcher`]
/// when constructed in polling mode (network mounts, containers without
/// inotify budgets).
pub struct PhysicalFileProvider {
    root: PathBuf,
    watch: WatchMode,
}

enum WatchMode {
    Physical(Arc<PhysicalFilesWatcher>),
    Polling(Arc<PollingFileWatcher>),
}

impl PhysicalFileProvider {
    /// OS-event-driven provider. Must be called within a tokio runtime.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into().canonicalize()?;
        let (backend, events) = NotifyBackend::new(&root)?;
        let watcher = PhysicalFilesWatcher::new(&root, backend, events);
        Ok(Self {
            root,
            watch: WatchMode::Physical(watcher),
        })
    }

    /// Polling provider at the default interval.
    pub fn new_polling(root: impl Into<PathBuf>) -> Result<Self> {
        Self::new_polling_with_interval(root, crate::polling::DEFAULT_INTERVAL)
    }

    pub fn new_polling_with_interval(
        root: impl Into<PathBuf>,
        interval: Duration,
    ) -> Result<Self> {
        let root = root.into().canonicalize()?;
        let watcher = PollingFileWatcher::with_interval(&root, interval);
        Ok(Self {
            root,
            watch: WatchMode::Polling(watcher),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, subpath: &str) -> Option<PathBuf> {
        let rel = to_relative_path(subpath)?;
        if rel.is_empty() {
            return Some(self.root.clone());
        }
        Some(self.root.join(rel))
    }
}

impl FileProvider for PhysicalFileProvider {
    fn get_file_info(&self, subpath: &str) -> FileInfo {
        match self.resolve(subpath) {
            Some(path) => FileInfo::from_path(&path),
            None => {
                debug!(subpath, "subpath outside root");
                FileInfo::not_found(file_name_of(subpath))
            }
        }
    }

    fn get_directory_contents(&self, subpath: &str) -> DirectoryContents {
        let Some(path) = self.resolve(subpath) else {
            return DirectoryContents::not_found();
        };
        let Ok(read_dir) = std::fs::read_dir(&path) else {
            return DirectoryContents::not_found();
        };
        let entries = read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| FileInfo::from_path(&entry.path()))
            .collect();
        DirectoryContents {
            exists: true,
            entries,
        }
    }

    fn watch(&self, filter: &str) -> Arc<dyn ChangeToken> {
        match &self.watch {
            WatchMode::Physical(watcher) => watcher.create_file_change_token(filter),
            WatchMode::Polling(watcher) => watcher.watch(filter),
        }
    }
}

/// Fallback provider name for unreachable subpaths.
fn file_name_of(subpath: &str) -> String {
    subpath
        .replace('\\', "/")
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// A provider with no files: every lookup is not-found, every watch is the
/// no-op token. Useful as a neutral element when composing providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFileProvider;

impl FileProvider for NullFileProvider {
    fn get_file_info(&self, subpath: &str) -> FileInfo {
        FileInfo::not_found(file_name_of(subpath))
    }

    fn get_directory_contents(&self, _subpath: &str) -> DirectoryContents {
        DirectoryContents::not_found()
    }

    fn watch(&self, _filter: &str) -> Arc<dyn ChangeToken> {
        NoopToken::shared()
    }
}
