// src/token/cancellation.rs

//! One-shot cancellation primitive backing the watcher tokens.
//!
//! A [`CancellationSource`] owns a set of registered callbacks and fires
//! them exactly once when cancelled. The watcher that created a source is
//! the only party that cancels it. [`CancellationChangeToken`] adapts a
//! source to the [`ChangeToken`] protocol.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::token::{ChangeCallback, ChangeToken, Subscription};

/// Cheaply clonable one-shot trigger.
#[derive(Clone)]
pub struct CancellationSource {
    inner: Arc<SourceInner>,
}

struct SourceInner {
    cancelled: AtomicBool,
    callbacks: Mutex<HashMap<u64, ChangeCallback>>,
    next_id: AtomicU64,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SourceInner {
                cancelled: AtomicBool::new(false),
                callbacks: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register a callback to run when the source is cancelled.
    ///
    /// Registration after cancellation invokes the callback synchronously
    /// before returning. The returned subscription holds only a weak
    /// reference into the source, so dropping it cannot keep the source or
    /// its watcher alive.
    pub fn register(&self, callback: ChangeCallback) -> Subscription {
        {
            let mut callbacks = self.inner.callbacks.lock();
            // The flag only ever flips under this lock, so an un-cancelled
            // read here means `cancel` will see this registration.
            if !self.inner.cancelled.load(Ordering::SeqCst) {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                callbacks.insert(id, callback);
                let weak = Arc::downgrade(&self.inner);
                return Subscription::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.callbacks.lock().remove(&id);
                    }
                });
            }
        }

        // Late registration: the token already fired.
        invoke(&callback);
        Subscription::none()
    }

    /// Fire the source: set the flag and drain the callback set, invoking
    /// each registered callback exactly once. Subsequent calls are no-ops.
    ///
    /// Callbacks run outside the source's lock, on the ambient tokio
    /// runtime's blocking pool when one is present, so user code never
    /// blocks event delivery to other tokens.
    pub fn cancel(&self) {
        let drained: Vec<ChangeCallback> = {
            let mut callbacks = self.inner.callbacks.lock();
            if self.inner.cancelled.swap(true, Ordering::SeqCst) {
                return;
            }
            callbacks.drain().map(|(_, cb)| cb).collect()
        };

        for callback in drained {
            dispatch(callback);
        }
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

fn dispatch(callback: ChangeCallback) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || invoke(&callback));
        }
        Err(_) => invoke(&callback),
    }
}

fn invoke(callback: &ChangeCallback) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        (callback.as_ref())();
    }));
    if result.is_err() {
        warn!("change callback panicked");
    }
}

/// Adapts a [`CancellationSource`] to the token protocol.
pub struct CancellationChangeToken {
    source: CancellationSource,
}

impl CancellationChangeToken {
    pub fn new(source: CancellationSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &CancellationSource {
        &self.source
    }
}

impl ChangeToken for CancellationChangeToken {
    fn has_changed(&self) -> bool {
        self.source.is_cancelled()
    }

    fn active_callbacks(&self) -> bool {
        true
    }

    fn register_callback(&self, callback: ChangeCallback) -> Subscription {
        self.source.register(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn firing_is_monotone() {
        let source = CancellationSource::new();
        let token = CancellationChangeToken::new(source.clone());
        assert!(!token.has_changed());
        source.cancel();
        assert!(token.has_changed());
        source.cancel();
        assert!(token.has_changed());
    }

    #[test]
    fn callbacks_run_exactly_once() {
        let source = CancellationSource::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let a2 = a.clone();
        let b2 = b.clone();
        let _sub_a = source.register(Arc::new(move || {
            a2.fetch_add(1, Ordering::SeqCst);
        }));
        let _sub_b = source.register(Arc::new(move || {
            b2.fetch_add(1, Ordering::SeqCst);
        }));

        source.cancel();
        source.cancel();

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_registration_fires_synchronously() {
        let source = CancellationSource::new();
        source.cancel();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let _sub = source.register(Arc::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        // No waiting: the contract is synchronous delivery.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn released_subscription_does_not_fire() {
        let source = CancellationSource::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let mut sub = source.register(Arc::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        sub.release();
        source.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_a_subscription_leaves_other_registrations_live() {
        let source = CancellationSource::new();
        let kept = Arc::new(AtomicUsize::new(0));
        let kept2 = kept.clone();
        let _kept_sub = source.register(Arc::new(move || {
            kept2.fetch_add(1, Ordering::SeqCst);
        }));
        {
            let _dropped = source.register(Arc::new(|| {}));
        }
        source.cancel();
        assert_eq!(kept.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_does_not_stop_others() {
        let source = CancellationSource::new();
        let survivor = Arc::new(AtomicUsize::new(0));
        let survivor2 = survivor.clone();
        let _bad = source.register(Arc::new(|| panic!("boom")));
        let _good = source.register(Arc::new(move || {
            survivor2.fetch_add(1, Ordering::SeqCst);
        }));
        source.cancel();
        assert_eq!(survivor.load(Ordering::SeqCst), 1);
    }
}
