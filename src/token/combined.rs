// src/token/combined.rs

//! Aggregate token over an ordered set of inner tokens.

use std::sync::Arc;

use crate::token::{ChangeCallback, ChangeToken, Subscription};

/// A token that has changed when any of its inner tokens has changed.
///
/// Registration subscribes only to inner tokens with active callbacks, so
/// no callback leaks into a token that will never fire. The returned
/// subscription releases each inner subscription in order.
pub struct CombinedChangeToken {
    tokens: Vec<Arc<dyn ChangeToken>>,
}

impl CombinedChangeToken {
    pub fn new(tokens: Vec<Arc<dyn ChangeToken>>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Arc<dyn ChangeToken>] {
        &self.tokens
    }
}

impl ChangeToken for CombinedChangeToken {
    fn has_changed(&self) -> bool {
        self.tokens.iter().any(|t| t.has_changed())
    }

    fn active_callbacks(&self) -> bool {
        self.tokens.iter().any(|t| t.active_callbacks())
    }

    fn register_callback(&self, callback: ChangeCallback) -> Subscription {
        let parts: Vec<Subscription> = self
            .tokens
            .iter()
            .filter(|t| t.active_callbacks())
            .map(|t| t.register_callback(callback.clone()))
            .collect();
        if parts.is_empty() {
            return Subscription::none();
        }
        Subscription::from_parts(parts)
    }
}
