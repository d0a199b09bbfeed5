mod common;
use crate::common::{init_tracing, wait_until};

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::tempdir;
use tokio::time::sleep;

use provwatch::{
    CachingFileProvider, CancellationChangeToken, CancellationSource, ChangeToken,
    CombinedFileProvider, DirectoryContents, FileInfo, FileProvider, NoopToken, NullFileProvider,
    PhysicalFileProvider,
};

const DEADLINE: Duration = Duration::from_secs(3);

/// Scripted provider: a fixed file set, a fixed directory listing, and a
/// fresh cancellation source per `watch` call so tests can fire tokens by
/// hand. `marker` is stamped into `length` to identify which provider a
/// result came from.
struct StubProvider {
    marker: u64,
    files: Vec<&'static str>,
    dir_exists: bool,
    dir_entries: Vec<&'static str>,
    watchable: bool,
    sources: Mutex<Vec<CancellationSource>>,
    info_calls: AtomicUsize,
    dir_calls: AtomicUsize,
}

impl StubProvider {
    fn new(marker: u64) -> Self {
        Self {
            marker,
            files: Vec::new(),
            dir_exists: false,
            dir_entries: Vec::new(),
            watchable: true,
            sources: Mutex::new(Vec::new()),
            info_calls: AtomicUsize::new(0),
            dir_calls: AtomicUsize::new(0),
        }
    }

    fn with_files(mut self, files: &[&'static str]) -> Self {
        self.files = files.to_vec();
        self
    }

    fn with_dir(mut self, entries: &[&'static str]) -> Self {
        self.dir_exists = true;
        self.dir_entries = entries.to_vec();
        self
    }

    fn inactive(mut self) -> Self {
        self.watchable = false;
        self
    }

    fn fire_latest(&self) {
        let source = self
            .sources
            .lock()
            .last()
            .cloned()
            .expect("watch was called");
        source.cancel();
    }

    fn watch_count(&self) -> usize {
        self.sources.lock().len()
    }
}

impl FileProvider for StubProvider {
    fn get_file_info(&self, subpath: &str) -> FileInfo {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if self.files.contains(&subpath) {
            FileInfo {
                exists: true,
                is_directory: false,
                length: self.marker,
                last_modified: None,
                name: subpath.rsplit('/').next().unwrap_or_default().to_string(),
                physical_path: None,
            }
        } else {
            FileInfo::not_found(subpath)
        }
    }

    fn get_directory_contents(&self, _subpath: &str) -> DirectoryContents {
        self.dir_calls.fetch_add(1, Ordering::SeqCst);
        if !self.dir_exists {
            return DirectoryContents::not_found();
        }
        DirectoryContents {
            exists: true,
            entries: self
                .dir_entries
                .iter()
                .map(|name| FileInfo {
                    exists: true,
                    is_directory: false,
                    length: self.marker,
                    last_modified: None,
                    name: name.to_string(),
                    physical_path: None,
                })
                .collect(),
        }
    }

    fn watch(&self, _filter: &str) -> Arc<dyn ChangeToken> {
        if !self.watchable {
            return NoopToken::shared();
        }
        let source = CancellationSource::new();
        self.sources.lock().push(source.clone());
        Arc::new(CancellationChangeToken::new(source))
    }
}

#[tokio::test]
async fn combined_watch_fans_out_and_delivers_once() {
    init_tracing();
    let p1 = Arc::new(StubProvider::new(1));
    let p2 = Arc::new(StubProvider::new(2).inactive());
    let p3 = Arc::new(StubProvider::new(3));
    let combined = CombinedFileProvider::new(vec![p1.clone(), p2.clone(), p3.clone()]);

    let token = combined.watch("*");
    assert!(token.active_callbacks());
    assert!(!token.has_changed());

    let seen = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    let seen2 = seen.clone();
    let _sub = token.register_callback(Arc::new(move || {
        seen2.lock().push("state payload");
    }));

    p3.fire_latest();

    assert!(wait_until(|| token.has_changed(), DEADLINE).await);
    assert!(wait_until(|| *seen.lock() == ["state payload"], DEADLINE).await);

    // No duplicate delivery from the other inner token.
    sleep(Duration::from_millis(100)).await;
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test]
async fn combined_watch_of_only_inactive_providers_is_noop() {
    init_tracing();
    let combined = CombinedFileProvider::new(vec![
        Arc::new(StubProvider::new(1).inactive()) as Arc<dyn FileProvider>,
        Arc::new(NullFileProvider),
    ]);

    let token = combined.watch("*");
    assert!(!token.active_callbacks());
    assert!(!token.has_changed());
}

#[tokio::test]
async fn combined_file_info_takes_the_first_provider_that_has_it() {
    init_tracing();
    let p1 = Arc::new(StubProvider::new(1));
    let p2 = Arc::new(StubProvider::new(2).with_files(&["shared.txt"]));
    let p3 = Arc::new(StubProvider::new(3).with_files(&["shared.txt", "third.txt"]));
    let combined = CombinedFileProvider::new(vec![p1, p2, p3]);

    assert_eq!(combined.get_file_info("shared.txt").length, 2);
    assert_eq!(combined.get_file_info("third.txt").length, 3);
    assert!(!combined.get_file_info("absent.txt").exists);
}

#[tokio::test]
async fn combined_directory_merge_deduplicates_by_name() {
    init_tracing();
    let p1 = Arc::new(StubProvider::new(1).with_dir(&["a.txt", "b.txt"]));
    let p2 = Arc::new(StubProvider::new(2).with_dir(&["b.txt", "c.txt"]));
    let p3 = Arc::new(StubProvider::new(3)); // directory missing
    let combined = CombinedFileProvider::new(vec![p1, p2, p3]);

    let contents = combined.get_directory_contents("");
    assert!(contents.exists);
    let names: Vec<&str> = contents.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
    // First occurrence wins: "b.txt" came from provider 1.
    let b = contents
        .entries
        .iter()
        .find(|e| e.name == "b.txt")
        .expect("merged entry");
    assert_eq!(b.length, 1);
}

#[tokio::test]
async fn combined_directory_of_no_providers_does_not_exist() {
    init_tracing();
    let combined = CombinedFileProvider::new(vec![
        Arc::new(StubProvider::new(1)) as Arc<dyn FileProvider>,
        Arc::new(NullFileProvider),
    ]);
    assert!(!combined.get_directory_contents("any").exists);
}

#[tokio::test]
async fn caching_provider_serves_repeat_lookups_from_cache() {
    init_tracing();
    let stub = Arc::new(StubProvider::new(1).with_files(&["a.txt"]).with_dir(&["a.txt"]));
    let caching = CachingFileProvider::new(stub.clone(), 16);

    assert!(caching.get_file_info("a.txt").exists);
    assert!(caching.get_file_info("a.txt").exists);
    assert_eq!(stub.info_calls.load(Ordering::SeqCst), 1);

    assert!(caching.get_directory_contents("").exists);
    assert!(caching.get_directory_contents("").exists);
    assert_eq!(stub.dir_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn caching_provider_is_bounded_lru() {
    init_tracing();
    let stub = Arc::new(StubProvider::new(1).with_files(&["a", "b", "c"]));
    let caching = CachingFileProvider::new(stub.clone(), 2);

    caching.get_file_info("a");
    caching.get_file_info("b");
    caching.get_file_info("c"); // evicts "a"
    assert_eq!(stub.info_calls.load(Ordering::SeqCst), 3);

    caching.get_file_info("a");
    assert_eq!(stub.info_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn watch_filter_clears_the_caches_on_every_fire() {
    init_tracing();
    let stub = Arc::new(StubProvider::new(1).with_files(&["a.txt"]));
    let caching = CachingFileProvider::with_watch_filter(stub.clone(), 16, Some("**"));
    assert_eq!(stub.watch_count(), 1);

    caching.get_file_info("a.txt");
    caching.get_file_info("a.txt");
    assert_eq!(stub.info_calls.load(Ordering::SeqCst), 1);

    stub.fire_latest();
    // The invalidation loop re-subscribed and the next lookup misses.
    assert!(wait_until(|| stub.watch_count() == 2, DEADLINE).await);
    assert!(
        wait_until(
            || {
                caching.get_file_info("a.txt");
                stub.info_calls.load(Ordering::SeqCst) >= 2
            },
            DEADLINE
        )
        .await
    );

    // And the loop survives: a second fire clears again.
    let before = stub.info_calls.load(Ordering::SeqCst);
    stub.fire_latest();
    assert!(wait_until(|| stub.watch_count() == 3, DEADLINE).await);
    assert!(
        wait_until(
            || {
                caching.get_file_info("a.txt");
                stub.info_calls.load(Ordering::SeqCst) > before
            },
            DEADLINE
        )
        .await
    );
}

#[tokio::test]
async fn caching_provider_delegates_watch() {
    init_tracing();
    let stub = Arc::new(StubProvider::new(1));
    let caching = CachingFileProvider::new(stub.clone(), 16);

    let token = caching.watch("*.txt");
    assert!(token.active_callbacks());
    stub.fire_latest();
    assert!(wait_until(|| token.has_changed(), DEADLINE).await);
}

#[tokio::test]
async fn physical_provider_serves_disk_lookups() {
    init_tracing();
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("a.txt"), "hello").expect("write");
    fs::create_dir(dir.path().join("sub")).expect("mkdir");

    let provider = PhysicalFileProvider::new(dir.path()).expect("provider");

    let info = provider.get_file_info("a.txt");
    assert!(info.exists);
    assert_eq!(info.length, 5);
    assert_eq!(info.name, "a.txt");

    assert!(provider.get_file_info("sub").is_directory);
    assert!(!provider.get_file_info("missing.txt").exists);
    // Escapes resolve to not-found, never to files outside the root.
    assert!(!provider.get_file_info("../outside.txt").exists);
    assert!(!provider.get_file_info("/etc/passwd").exists);

    let contents = provider.get_directory_contents("");
    assert!(contents.exists);
    let mut names: Vec<&str> = contents.entries.iter().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["a.txt", "sub"]);

    assert!(!provider.get_directory_contents("missing").exists);
}

/// End-to-end through the OS watcher: a real write fires the token.
#[tokio::test]
async fn physical_provider_watch_observes_a_real_write() {
    init_tracing();
    let dir = tempdir().expect("tempdir");
    let provider = PhysicalFileProvider::new(dir.path()).expect("provider");

    let token = provider.watch("watched.txt");
    assert!(token.active_callbacks());

    // Give the OS watcher a moment to arm before producing the event.
    sleep(Duration::from_millis(200)).await;
    fs::write(dir.path().join("watched.txt"), "payload").expect("write");

    assert!(wait_until(|| token.has_changed(), Duration::from_secs(5)).await);
}

#[tokio::test]
async fn polling_mode_provider_watches_without_os_events() {
    init_tracing();
    let dir = tempdir().expect("tempdir");
    let provider =
        PhysicalFileProvider::new_polling_with_interval(dir.path(), Duration::from_millis(500))
            .expect("provider");

    let token = provider.watch("*.txt");
    // Let the first tick establish the wildcard baseline.
    sleep(Duration::from_millis(700)).await;

    fs::write(dir.path().join("fresh.txt"), "new").expect("write");
    assert!(wait_until(|| token.has_changed(), Duration::from_secs(5)).await);
}
