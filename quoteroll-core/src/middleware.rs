//! Middleware trait for wrapping `BackingStore` implementations.

use std::sync::Arc;

use crate::connector::BackingStore;

/// Trait implemented by backing-store middleware layers.
///
/// A middleware consumes an inner `BackingStore` and returns a wrapped store that
/// augments its behavior (e.g., timeouts, retries).
pub trait StoreMiddleware: Send + Sync {
    /// Apply this middleware to wrap an inner store and return the wrapped store.
    fn apply(self: Box<Self>, inner: Arc<dyn BackingStore>) -> Arc<dyn BackingStore>;

    /// Human-readable middleware name for introspection/logging.
    fn name(&self) -> &'static str;

    /// Opaque configuration snapshot for serialization/inspection.
    fn config_json(&self) -> serde_json::Value;
}
