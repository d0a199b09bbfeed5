// src/polling/wildcard_token.rs

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::Result;
use crate::glob::{relative_str, PathMatcher};
use crate::polling::clock::Clock;
use crate::token::{CancellationSource, ChangeCallback, ChangeToken, Subscription};

/// Delimiter between fields of the digest stream.
const DELIMITER: [u8; 2] = [0xFF, 0xFE];

/// One-shot token over the set of files matching a glob pattern.
///
/// Each evaluation enumerates matching files under the root, sorted by a
/// fixed case-insensitive ordinal collation so enumeration order never
/// matters. Change is detected two ways: a file written after the previous
/// scan, or a digest mismatch over the ordered `(path, mtime)` stream. The
/// digest catches files appearing, disappearing or being renamed without
/// fresh timestamps. The first scan only establishes the digest baseline
/// and never reports a change through it.
pub struct PollingWildCardChangeToken {
    root: PathBuf,
    matcher: PathMatcher,
    clock: Arc<dyn Clock>,
    state: Mutex<ScanState>,
    changed: AtomicBool,
    source: CancellationSource,
}

struct ScanState {
    last_scan: SystemTime,
    previous_hash: Option<[u8; 32]>,
}

impl PollingWildCardChangeToken {
    pub fn new(
        root: impl Into<PathBuf>,
        pattern: &str,
        clock: Arc<dyn Clock>,
        source: CancellationSource,
    ) -> Result<Self> {
        let matcher = PathMatcher::new(pattern)?;
        let last_scan = clock.now();
        Ok(Self {
            root: root.into(),
            matcher,
            clock,
            state: Mutex::new(ScanState {
                last_scan,
                previous_hash: None,
            }),
            changed: AtomicBool::new(false),
            source,
        })
    }

    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn source(&self) -> &CancellationSource {
        &self.source
    }

    /// Scan the file set and latch the flag on change. Returns the
    /// (monotone) flag.
    pub fn update_has_changed(&self) -> bool {
        if self.changed.load(Ordering::SeqCst) {
            return true;
        }

        let mut state = self.state.lock();
        let mut changed = false;

        let mut files = self.collect_matching();
        // Fixed collation: enumeration order must never affect the digest.
        files.sort_by_cached_key(|(rel, _)| rel.to_lowercase());

        for (_, last_write) in &files {
            if *last_write > state.last_scan {
                changed = true;
            }
        }

        let digest = compute_digest(&files);
        if let Some(previous) = state.previous_hash {
            if previous != digest {
                changed = true;
            }
        }
        state.previous_hash = Some(digest);
        state.last_scan = self.clock.now();

        if changed {
            debug!(pattern = self.matcher.pattern(), "polled file set changed");
            self.changed.store(true, Ordering::SeqCst);
        }
        self.changed.load(Ordering::SeqCst)
    }

    fn collect_matching(&self) -> Vec<(String, SystemTime)> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Some(rel) = relative_str(&self.root, entry.path()) else {
                continue;
            };
            if !self.matcher.is_match(&rel) {
                continue;
            }
            // A file deleted mid-scan simply drops out of the set.
            let Some(last_write) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
                continue;
            };
            files.push((rel, last_write));
        }
        files
    }
}

impl ChangeToken for PollingWildCardChangeToken {
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

/// SHA-256 over the ordered stream of `(path, delimiter, ticks, delimiter)`.
/// Paths are hashed as UTF-16LE code units, timestamps as nanoseconds since
/// the epoch, little-endian, so the digest is identical across platforms.
fn compute_digest(files: &[(String, SystemTime)]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for (rel, last_write) in files {
        for unit in rel.encode_utf16() {
            hasher.update(unit.to_le_bytes());
        }
        hasher.update(DELIMITER);
        let ticks = last_write
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        hasher.update(ticks.to_le_bytes());
        hasher.update(DELIMITER);
    }
    hasher.finalize().into()
}
