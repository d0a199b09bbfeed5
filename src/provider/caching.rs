// src/provider/caching.rs

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::provider::{DirectoryContents, FileInfo, FileProvider};
use crate::token::{self, ChangeToken, Subscription};

/// Caches a wrapped provider's lookups in two bounded LRU caches.
///
/// Keys are the case-sensitive subpath strings. With a watch filter, the
/// provider subscribes to the base provider's token stream and clears both
/// caches every time it fires; without one, entries only rotate out by LRU
/// pressure.
pub struct CachingFileProvider {
    inner: Arc<dyn FileProvider>,
    caches: Arc<Caches>,
    _invalidation: Option<Subscription>,
}

struct Caches {
    files: Mutex<LruCache<String, FileInfo>>,
    directories: Mutex<LruCache<String, DirectoryContents>>,
}

impl Caches {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            files: Mutex::new(LruCache::new(capacity)),
            directories: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn clear(&self) {
        self.files.lock().clear();
        self.directories.lock().clear();
    }
}

impl CachingFileProvider {
    /// Cache without invalidation; entries only leave by LRU eviction.
    pub fn new(inner: Arc<dyn FileProvider>, capacity: usize) -> Self {
        Self::with_watch_filter(inner, capacity, None)
    }

    /// Cache that clears itself whenever the base provider reports a change
    /// matching `watch_filter`.
    pub fn with_watch_filter(
        inner: Arc<dyn FileProvider>,
        capacity: usize,
        watch_filter: Option<&str>,
    ) -> Self {
        let caches = Arc::new(Caches::new(capacity));

        let invalidation = watch_filter.map(|filter| {
            let filter = filter.to_string();
            let watched = inner.clone();
            let weak = Arc::downgrade(&caches);
            token::on_change(
                move || watched.watch(&filter),
                move || {
                    if let Some(caches) = weak.upgrade() {
                        debug!("watched change; clearing provider caches");
                        caches.clear();
                    }
                },
            )
        });

        Self {
            inner,
            caches,
            _invalidation: invalidation,
        }
    }
}

impl FileProvider for CachingFileProvider {
    fn get_file_info(&self, subpath: &str) -> FileInfo {
        let mut files = self.caches.files.lock();
        if let Some(hit) = files.get(subpath) {
            return hit.clone();
        }
        drop(files);

        let info = self.inner.get_file_info(subpath);
        self.caches
            .files
            .lock()
            .put(subpath.to_string(), info.clone());
        info
    }

    fn get_directory_contents(&self, subpath: &str) -> DirectoryContents {
        let mut directories = self.caches.directories.lock();
        if let Some(hit) = directories.get(subpath) {
            return hit.clone();
        }
        drop(directories);

        let contents = self.inner.get_directory_contents(subpath);
        self.caches
            .directories
            .lock()
            .put(subpath.to_string(), contents.clone());
        contents
    }

    fn watch(&self, filter: &str) -> Arc<dyn ChangeToken> {
        self.inner.watch(filter)
    }
}
