// src/physical/watcher.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::glob::{normalize_filter, relative_str, NormalizedFilter, PathMatcher};
use crate::physical::events::{FsEvent, WatchBackend};
use crate::token::{CancellationChangeToken, CancellationSource, ChangeToken, NoopToken};

/// Maps watch filters to change tokens and fires them from OS events.
///
/// Two disjoint registries: exact relative paths and wildcard patterns,
/// both keyed case-insensitively (lower-cased). An event fires every
/// matching token, removes it from its registry, and disables the backend
/// once both registries are empty. Tokens are shared: asking for a filter
/// that is already registered returns the existing token.
///
/// Construction spawns the event loop onto the ambient tokio runtime; one
/// event is fully dispatched before the next is read, so all tokens
/// affected by an event transition together.
pub struct PhysicalFilesWatcher {
    root: PathBuf,
    exact: DashMap<String, WatchEntry>,
    wildcard: DashMap<String, WildcardEntry>,
    // Guards every backend enable/disable transition.
    backend: Mutex<Box<dyn WatchBackend>>,
}

struct WatchEntry {
    source: CancellationSource,
    token: Arc<CancellationChangeToken>,
}

impl WatchEntry {
    fn new() -> Self {
        let source = CancellationSource::new();
        let token = Arc::new(CancellationChangeToken::new(source.clone()));
        Self { source, token }
    }
}

struct WildcardEntry {
    matcher: PathMatcher,
    entry: WatchEntry,
}

impl PhysicalFilesWatcher {
    /// Wire a watcher to a backend and its event channel.
    ///
    /// Must be called within a tokio runtime; the event loop runs until the
    /// watcher is dropped or the channel closes.
    pub fn new(
        root: impl Into<PathBuf>,
        backend: impl WatchBackend + 'static,
        mut events: UnboundedReceiver<FsEvent>,
    ) -> Arc<Self> {
        let root = root.into();
        // Canonicalize once so event paths relativize against a stable base.
        let root = root.canonicalize().unwrap_or(root);

        let watcher = Arc::new(Self {
            root,
            exact: DashMap::new(),
            wildcard: DashMap::new(),
            backend: Mutex::new(Box::new(backend)),
        });

        let weak = Arc::downgrade(&watcher);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(watcher) = weak.upgrade() else {
                    break;
                };
                watcher.handle_event(event);
            }
            debug!("physical watcher event loop finished");
        });

        watcher
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Obtain a token that fires when something matching `filter` changes.
    ///
    /// Absolute filters and filters escaping the root are ignored: the
    /// shared no-op token is returned. A filter containing `*` or ending
    /// with a separator registers as a wildcard, anything else as an exact
    /// relative path.
    pub fn create_file_change_token(&self, filter: &str) -> Arc<dyn ChangeToken> {
        let Some(normalized) = normalize_filter(filter) else {
            debug!(filter, "filter outside root; returning no-op token");
            return NoopToken::shared();
        };

        let token = match normalized {
            NormalizedFilter::Exact(path) => self.exact_token(&path),
            NormalizedFilter::Wildcard(pattern) => self.wildcard_token(&pattern),
        };
        self.sync_backend_state();
        token
    }

    fn exact_token(&self, rel_path: &str) -> Arc<dyn ChangeToken> {
        let key = rel_path.to_lowercase();
        let entry = self.exact.entry(key).or_insert_with(WatchEntry::new);
        entry.token.clone()
    }

    fn wildcard_token(&self, pattern: &str) -> Arc<dyn ChangeToken> {
        let key = pattern.to_lowercase();
        if let Some(existing) = self.wildcard.get(&key) {
            return existing.entry.token.clone();
        }
        let matcher = match PathMatcher::new(pattern) {
            Ok(matcher) => matcher,
            Err(err) => {
                warn!(pattern, error = %err, "unusable wildcard filter");
                return NoopToken::shared();
            }
        };
        let entry = self.wildcard.entry(key).or_insert_with(|| WildcardEntry {
            matcher,
            entry: WatchEntry::new(),
        });
        entry.entry.token.clone()
    }

    fn handle_event(&self, event: FsEvent) {
        match event {
            FsEvent::Changed(path) => self.handle_changed(&path),
            FsEvent::Renamed { from, to } => self.handle_renamed(&from, &to),
            FsEvent::Error(message) => self.handle_error(&message),
        }
    }

    fn handle_changed(&self, path: &Path) {
        let Some(rel) = relative_str(&self.root, path) else {
            return;
        };
        // A root-level event without a filename: some platform watchers
        // emit these spuriously when the root itself is deleted.
        if rel.is_empty() {
            return;
        }
        // Hidden files and directories are not watchable.
        if rel.split('/').any(|segment| segment.starts_with('.')) {
            return;
        }
        self.fire_matching(&rel);
    }

    fn fire_matching(&self, rel: &str) {
        let mut matched = false;

        if let Some((_, entry)) = self.exact.remove(&rel.to_lowercase()) {
            debug!(path = rel, "firing exact-path token");
            entry.source.cancel();
            matched = true;
        }

        // Collect first: removing while iterating the map contends on the
        // same shard.
        let hits: Vec<String> = self
            .wildcard
            .iter()
            .filter(|e| e.value().matcher.is_match(rel))
            .map(|e| e.key().clone())
            .collect();
        for key in hits {
            // Remove is the atomic claim; a concurrent event that won the
            // removal already fired this token.
            if let Some((_, wildcard)) = self.wildcard.remove(&key) {
                debug!(pattern = %key, path = rel, "firing wildcard token");
                wildcard.entry.source.cancel();
                matched = true;
            }
        }

        if matched {
            self.sync_backend_state();
        }
    }

    /// A directory rename invalidates both names of the directory and of
    /// every descendant. The old tree is gone, so descendants are
    /// enumerated under the new path and mirrored onto the old one.
    fn handle_renamed(&self, from: &Path, to: &Path) {
        self.handle_changed(from);
        self.handle_changed(to);

        let is_dir = std::fs::metadata(to).map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            return;
        }

        for entry in WalkDir::new(to).into_iter().filter_map(|e| e.ok()) {
            let Ok(rel) = entry.path().strip_prefix(to) else {
                continue;
            };
            if rel.as_os_str().is_empty() {
                continue;
            }
            self.handle_changed(entry.path());
            self.handle_changed(&from.join(rel));
        }
    }

    /// After a backend error every specific-path watch is suspect: those
    /// subscriptions are typically time-sensitive, so they all fire.
    /// Wildcard watches stay registered and keep working once the backend
    /// recovers.
    fn handle_error(&self, message: &str) {
        warn!(error = message, "watch backend error; firing exact-path tokens");
        let keys: Vec<String> = self.exact.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, entry)) = self.exact.remove(&key) {
                entry.source.cancel();
            }
        }
        self.sync_backend_state();
    }

    fn sync_backend_state(&self) {
        let mut backend = self.backend.lock();
        let should_watch = !self.exact.is_empty() || !self.wildcard.is_empty();
        if should_watch != backend.is_enabled() {
            if let Err(err) = backend.set_enabled(should_watch) {
                warn!(enabled = should_watch, error = %err, "failed to toggle watch backend");
            }
        }
    }
}

impl std::fmt::Debug for PhysicalFilesWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalFilesWatcher")
            .field("root", &self.root)
            .field("exact", &self.exact.len())
            .field("wildcard", &self.wildcard.len())
            .finish()
    }
}
