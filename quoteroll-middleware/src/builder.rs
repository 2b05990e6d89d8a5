//! Builder for composing a backing store with middleware layers.
//!
//! Layers are stored outermost-first (last added = outermost) and applied in
//! reverse during `build()`:
//!
//! ```text
//! builder.with_timeout(..).with_retry(..)
//!
//! Storage: [Retry, Timeout]  (outermost first)
//! Applied:  Raw -> Timeout -> Retry
//! Result:   Retry(Timeout(Raw))
//! ```

use std::sync::Arc;
use std::time::Duration;

use quoteroll_core::connector::BackingStore;
use quoteroll_core::{BackoffConfig, QuoterollConfig, StoreMiddleware};

use crate::retry::RetryMiddleware;
use crate::timeout::TimeoutMiddleware;

/// Builder that wraps a raw store in timeout/retry layers.
pub struct StoreBuilder {
    raw: Arc<dyn BackingStore>,
    /// Middleware layers in outermost-first order.
    layers: Vec<Box<dyn StoreMiddleware>>,
}

impl StoreBuilder {
    /// Create a new builder from a raw, unwrapped store.
    #[must_use]
    pub fn new(raw: Arc<dyn BackingStore>) -> Self {
        Self {
            raw,
            layers: Vec::new(),
        }
    }

    /// Layers derived from a deployment configuration: timeout innermost,
    /// retry outside it, so every attempt gets its own deadline.
    #[must_use]
    pub fn from_config(raw: Arc<dyn BackingStore>, cfg: &QuoterollConfig) -> Self {
        let mut b = Self::new(raw);
        if let Some(t) = cfg.store_timeout {
            b = b.with_timeout(t);
        }
        if let Some(r) = cfg.store_retry {
            b = b.with_retry(r);
        }
        b
    }

    /// Add or replace the timeout layer at the outermost position.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.layers.retain(|m| m.name() != "TimeoutStore");
        self.layers
            .insert(0, Box::new(TimeoutMiddleware::new(timeout)));
        self
    }

    /// Add or replace the retry layer at the outermost position.
    #[must_use]
    pub fn with_retry(mut self, cfg: BackoffConfig) -> Self {
        self.layers.retain(|m| m.name() != "RetryingStore");
        self.layers.insert(0, Box::new(RetryMiddleware::new(cfg)));
        self
    }

    /// Add an arbitrary middleware layer at the outermost position.
    #[must_use]
    pub fn layer(mut self, layer: Box<dyn StoreMiddleware>) -> Self {
        self.layers.insert(0, layer);
        self
    }

    /// Names and configuration of the layers, outermost first, followed by the raw store.
    #[must_use]
    pub fn describe(&self) -> Vec<(&'static str, serde_json::Value)> {
        let mut out: Vec<_> = self
            .layers
            .iter()
            .map(|l| (l.name(), l.config_json()))
            .collect();
        out.push(("RawStore", serde_json::json!({ "name": self.raw.name() })));
        out
    }

    /// Build the wrapped store.
    #[must_use]
    pub fn build(self) -> Arc<dyn BackingStore> {
        let mut acc: Arc<dyn BackingStore> = Arc::clone(&self.raw);
        // Reverse iteration: apply innermost middleware first, outermost last
        for m in self.layers.into_iter().rev() {
            acc = m.apply(acc);
        }
        acc
    }
}
