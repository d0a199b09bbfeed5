// src/token/mod.rs

//! The change-token protocol.
//!
//! A [`ChangeToken`] is a one-shot observable handle for "something I was
//! watching is now different". `has_changed` is monotone: once it flips to
//! true it never reverts, and a token should be discarded after observing
//! the transition. Callbacks registered before the fire run exactly once;
//! callbacks registered after it run synchronously at registration time.

pub mod cancellation;
pub mod combined;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

pub use cancellation::{CancellationChangeToken, CancellationSource};
pub use combined::CombinedChangeToken;

/// Callback invoked when a token fires. State travels by closure capture.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// One-shot observable handle over a change event.
pub trait ChangeToken: Send + Sync {
    /// Whether the watched thing has changed. Monotone false -> true.
    fn has_changed(&self) -> bool;

    /// Whether `register_callback` will ever fire. Constant over the
    /// token's lifetime; callers may skip registration when false.
    fn active_callbacks(&self) -> bool;

    /// Register a one-shot callback. If the token has already fired, the
    /// callback is invoked synchronously before this returns; otherwise it
    /// is invoked exactly once when the token first fires. Invocation order
    /// across registrations is unspecified.
    fn register_callback(&self, callback: ChangeCallback) -> Subscription;
}

/// Handle for a callback registration. Releasing it (explicitly or on drop)
/// unregisters the callback; it never stops the token itself from firing.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// An inert subscription; releasing it does nothing.
    pub fn none() -> Self {
        Self { release: None }
    }

    /// Bundle several subscriptions; releasing the bundle releases each in
    /// order.
    pub fn from_parts(parts: Vec<Subscription>) -> Self {
        Self::new(move || {
            for mut part in parts {
                part.release();
            }
        })
    }

    /// Release the registration. Idempotent.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// The token returned when no real watcher can satisfy a subscription.
/// Never fires, has no active callbacks.
pub struct NoopToken;

static NOOP_TOKEN: Lazy<Arc<NoopToken>> = Lazy::new(|| Arc::new(NoopToken));

impl NoopToken {
    /// The shared singleton instance.
    pub fn shared() -> Arc<dyn ChangeToken> {
        NOOP_TOKEN.clone()
    }
}

impl ChangeToken for NoopToken {
    fn has_changed(&self) -> bool {
        false
    }

    fn active_callbacks(&self) -> bool {
        false
    }

    fn register_callback(&self, _callback: ChangeCallback) -> Subscription {
        Subscription::none()
    }
}

/// Run `listener` every time the token from `producer` fires.
///
/// Tokens are single-use, so observing a stream of changes means
/// re-subscribing after every fire. This helper owns that loop: it obtains
/// a token, registers, and on fire runs the listener and obtains the next
/// token. The returned [`Subscription`] stops the loop when released.
pub fn on_change<P, F>(producer: P, listener: F) -> Subscription
where
    P: Fn() -> Arc<dyn ChangeToken> + Send + Sync + 'static,
    F: Fn() + Send + Sync + 'static,
{
    let chain = Arc::new(OnChangeChain {
        producer: Box::new(producer),
        listener: Box::new(listener),
        generation: AtomicU64::new(0),
        current: Mutex::new((0, None)),
    });

    let first = (chain.producer)();
    OnChangeChain::arm(&chain, first);

    Subscription::new(move || {
        let mut current = chain.current.lock();
        if let Some(mut sub) = current.1.take() {
            sub.release();
        }
    })
}

struct OnChangeChain {
    producer: Box<dyn Fn() -> Arc<dyn ChangeToken> + Send + Sync>,
    listener: Box<dyn Fn() + Send + Sync>,
    generation: AtomicU64,
    // (generation, registration) of the most recently armed token.
    current: Mutex<(u64, Option<Subscription>)>,
}

impl OnChangeChain {
    fn arm(this: &Arc<Self>, token: Arc<dyn ChangeToken>) {
        if !token.active_callbacks() {
            debug!("on_change chain ended: token has no active callbacks");
            return;
        }
        let generation = this.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let weak = Arc::downgrade(this);
        let sub = token.register_callback(Arc::new(move || {
            if let Some(chain) = weak.upgrade() {
                OnChangeChain::fired(&chain);
            }
        }));

        if token.has_changed() {
            // The token fired while we were registering; the callback has
            // already run and armed the next token. This registration is
            // stale, releasing it must not clobber the newer one.
            drop(sub);
            return;
        }

        let mut current = this.current.lock();
        if generation >= current.0 {
            *current = (generation, Some(sub));
        }
    }

    fn fired(this: &Arc<Self>) {
        // Fetch the next token before running the listener so changes that
        // land during the listener are observed by the new registration.
        let next = (this.producer)();
        (this.listener)();
        OnChangeChain::arm(this, next);
    }
}
