// src/polling/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::glob::{normalize_filter, NormalizedFilter};
use crate::polling::clock::{Clock, SystemClock};
use crate::polling::file_token::PollingFileChangeToken;
use crate::polling::wildcard_token::PollingWildCardChangeToken;
use crate::token::{CancellationSource, ChangeToken, NoopToken};

/// Periodically evaluates polling tokens and fires the changed ones.
///
/// Filters route the same way as in the physical watcher: globs and
/// trailing separators become wildcard tokens, everything else single-file
/// tokens. The token map is keyed by the original filter string,
/// case-sensitively. A background timer calls [`poll_once`] every interval;
/// embedders and tests may also call it directly.
///
/// [`poll_once`]: PollingFileWatcher::poll_once
pub struct PollingFileWatcher {
    root: PathBuf,
    interval: Duration,
    tokens: DashMap<String, PollingEntry>,
    clock: Arc<dyn Clock>,
}

/// Hard floor for the polling interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(500);
/// Interval used when none is given.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(4);

#[derive(Clone)]
enum PollingEntry {
    File(Arc<PollingFileChangeToken>),
    Wildcard(Arc<PollingWildCardChangeToken>),
}

impl PollingEntry {
    fn has_changed(&self) -> bool {
        match self {
            Self::File(token) => token.has_changed(),
            Self::Wildcard(token) => token.has_changed(),
        }
    }

    fn update_has_changed(&self) -> bool {
        match self {
            Self::File(token) => token.update_has_changed(),
            Self::Wildcard(token) => token.update_has_changed(),
        }
    }

    fn source(&self) -> &CancellationSource {
        match self {
            Self::File(token) => token.source(),
            Self::Wildcard(token) => token.source(),
        }
    }

    fn as_token(&self) -> Arc<dyn ChangeToken> {
        match self {
            Self::File(token) => token.clone(),
            Self::Wildcard(token) => token.clone(),
        }
    }

    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::File(a), Self::File(b)) => Arc::ptr_eq(a, b),
            (Self::Wildcard(a), Self::Wildcard(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PollingFileWatcher {
    /// Watch `root` at the default 4s interval.
    ///
    /// Must be called within a tokio runtime; the timer task runs until the
    /// watcher is dropped.
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Self::with_interval(root, DEFAULT_INTERVAL)
    }

    /// Watch `root` at a caller-chosen interval, clamped to the 500ms floor.
    pub fn with_interval(root: impl Into<PathBuf>, interval: Duration) -> Arc<Self> {
        Self::with_clock(root, interval, Arc::new(SystemClock))
    }

    pub fn with_clock(
        root: impl Into<PathBuf>,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let interval = interval.max(MIN_INTERVAL);
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);

        let watcher = Arc::new(Self {
            root,
            interval,
            tokens: DashMap::new(),
            clock,
        });

        let weak = Arc::downgrade(&watcher);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(watcher) = weak.upgrade() else {
                    break;
                };
                watcher.poll_once();
            }
            debug!("polling watcher timer finished");
        });

        watcher
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Obtain a token for `filter`, creating and storing a polling token on
    /// first use. A stored token that has not yet changed is shared;
    /// invalid filters get the no-op token.
    pub fn watch(&self, filter: &str) -> Arc<dyn ChangeToken> {
        let Some(normalized) = normalize_filter(filter) else {
            debug!(filter, "filter outside root; returning no-op token");
            return NoopToken::shared();
        };

        if let Some(existing) = self.tokens.get(filter) {
            if !existing.has_changed() {
                return existing.as_token();
            }
        }

        let fresh = match self.new_entry(&normalized) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(filter, error = %err, "unusable polling filter");
                return NoopToken::shared();
            }
        };

        let slot = self
            .tokens
            .entry(filter.to_string())
            .and_modify(|slot| {
                // Replace a token that fired between the lookup above and
                // this insert; a live one stays shared.
                if slot.has_changed() {
                    *slot = fresh.clone();
                }
            })
            .or_insert_with(|| fresh.clone());
        slot.as_token()
    }

    fn new_entry(&self, normalized: &NormalizedFilter) -> crate::errors::Result<PollingEntry> {
        let source = CancellationSource::new();
        Ok(match normalized {
            NormalizedFilter::Exact(rel) => {
                let path = self.root.join(rel);
                PollingEntry::File(Arc::new(PollingFileChangeToken::new(path, source)))
            }
            NormalizedFilter::Wildcard(pattern) => {
                PollingEntry::Wildcard(Arc::new(PollingWildCardChangeToken::new(
                    &self.root,
                    pattern,
                    self.clock.clone(),
                    source,
                )?))
            }
        })
    }

    /// One polling tick: evaluate every stored token, then remove and fire
    /// the ones that changed.
    pub fn poll_once(&self) {
        let keys: Vec<String> = self.tokens.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let Some(entry) = self.tokens.get(&key).map(|e| e.value().clone()) else {
                continue;
            };
            if entry.update_has_changed() {
                // Only fire if this tick removed the very entry it
                // evaluated; `watch` may already have replaced it.
                let removed = self
                    .tokens
                    .remove_if(&key, |_, stored| stored.same_as(&entry))
                    .is_some();
                if removed {
                    debug!(filter = %key, "polling token changed; firing");
                    entry.source().cancel();
                }
            }
        }
    }
}

impl std::fmt::Debug for PollingFileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingFileWatcher")
            .field("root", &self.root)
            .field("interval", &self.interval)
            .field("tokens", &self.tokens.len())
            .finish()
    }
}
