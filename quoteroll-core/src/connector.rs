use async_trait::async_trait;

use crate::{ConsistencyLevel, PersistOp, QuoterollError, Snapshot, Symbol};

/// Upstream client that fetches the latest OHLCV readings for a symbol set.
///
/// Implementations may be slow or fail; callers do not retry inline.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Stable name used to tag errors and log lines.
    fn name(&self) -> &'static str;

    /// Fetch one reading per requested symbol. Symbols the upstream does not
    /// know may be absent from the result.
    async fn fetch(&self, symbols: &[Symbol]) -> Result<Snapshot, QuoterollError>;
}

/// Backing store that persists buffer rows.
///
/// A batch is atomic from the caller's perspective: either every operation is
/// accepted or the call fails and none are assumed applied. Operations are keyed
/// by `(symbol, granularity, timestamp)` so re-executing a batch is idempotent.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Stable name used to tag errors and log lines.
    fn name(&self) -> &'static str;

    /// Execute `ops` as one batch at the requested consistency level.
    async fn execute_batch(
        &self,
        ops: &[PersistOp],
        consistency: ConsistencyLevel,
    ) -> Result<(), QuoterollError>;
}

/// Tag an untagged error with the store that produced it.
pub fn tag_store_err(store: &str, e: QuoterollError) -> QuoterollError {
    match e {
        e @ (QuoterollError::BackingStore { .. } | QuoterollError::StoreTimeout { .. }) => e,
        other => QuoterollError::store(store, other.to_string()),
    }
}

/// Tag an untagged error with the quote source that produced it.
pub fn tag_source_err(source_name: &str, e: QuoterollError) -> QuoterollError {
    match e {
        e @ QuoterollError::UpstreamFetch { .. } => e,
        other => QuoterollError::upstream(source_name, other.to_string()),
    }
}
