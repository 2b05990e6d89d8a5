//! Per-batch deadline for a backing store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quoteroll_core::connector::BackingStore;
use quoteroll_core::{ConsistencyLevel, PersistOp, QuoterollError, StoreMiddleware};

/// Wrapper that fails a batch with `StoreTimeout` when the inner store does not
/// answer within the deadline.
///
/// The outcome of a timed-out batch is unknown; callers treat it like any other
/// failed batch and leave the buffer uncommitted.
pub struct TimeoutStore {
    inner: Arc<dyn BackingStore>,
    timeout: Duration,
}

impl TimeoutStore {
    /// Wrap `inner` with a per-batch deadline.
    pub fn new(inner: Arc<dyn BackingStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl BackingStore for TimeoutStore {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn execute_batch(
        &self,
        ops: &[PersistOp],
        consistency: ConsistencyLevel,
    ) -> Result<(), QuoterollError> {
        match tokio::time::timeout(self.timeout, self.inner.execute_batch(ops, consistency)).await {
            Ok(res) => res,
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    store = self.inner.name(),
                    timeout_ms = %self.timeout.as_millis(),
                    ops = ops.len(),
                    "batch timed out"
                );
                Err(QuoterollError::store_timeout(self.inner.name(), self.timeout))
            }
        }
    }
}

/// Middleware config for constructing a [`TimeoutStore`].
pub struct TimeoutMiddleware {
    pub timeout: Duration,
}

impl TimeoutMiddleware {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl StoreMiddleware for TimeoutMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn BackingStore>) -> Arc<dyn BackingStore> {
        Arc::new(TimeoutStore::new(inner, self.timeout))
    }

    fn name(&self) -> &'static str {
        "TimeoutStore"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({ "timeout_ms": self.timeout.as_millis() })
    }
}
