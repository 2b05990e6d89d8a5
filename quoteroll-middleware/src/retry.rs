//! Retry of failed batches with exponential backoff.

use std::sync::Arc;

use async_trait::async_trait;
use quoteroll_core::connector::BackingStore;
use quoteroll_core::{BackoffConfig, ConsistencyLevel, PersistOp, QuoterollError, StoreMiddleware};

use crate::backoff::backoff_delay;

/// Wrapper that re-submits a batch after a store error.
///
/// Only `BackingStore` and `StoreTimeout` failures are retried. The last error is
/// returned once `max_attempts` is exhausted.
pub struct RetryingStore {
    inner: Arc<dyn BackingStore>,
    config: BackoffConfig,
}

impl RetryingStore {
    /// Wrap `inner` with the given retry policy.
    pub fn new(inner: Arc<dyn BackingStore>, config: BackoffConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl BackingStore for RetryingStore {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn execute_batch(
        &self,
        ops: &[PersistOp],
        consistency: ConsistencyLevel,
    ) -> Result<(), QuoterollError> {
        let attempts = self.config.max_attempts.max(1);
        let mut retry = 0u32;
        loop {
            match self.inner.execute_batch(ops, consistency).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_store_error() && retry + 1 < attempts => {
                    let delay = backoff_delay(&self.config, retry);
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        store = self.inner.name(),
                        attempt = retry + 1,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "retrying batch"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = e;
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Middleware config for constructing a [`RetryingStore`].
pub struct RetryMiddleware {
    pub config: BackoffConfig,
}

impl RetryMiddleware {
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self { config }
    }
}

impl StoreMiddleware for RetryMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn BackingStore>) -> Arc<dyn BackingStore> {
        Arc::new(RetryingStore::new(inner, self.config))
    }

    fn name(&self) -> &'static str {
        "RetryingStore"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "min_backoff_ms": self.config.min_backoff_ms,
            "max_backoff_ms": self.config.max_backoff_ms,
            "factor": self.config.factor,
            "jitter_percent": self.config.jitter_percent,
            "max_attempts": self.config.max_attempts,
        })
    }
}
