//! Quoteroll keeps rolling, multi-resolution windows of market quotes and
//! mirrors every change into a backing store.
//!
//! Overview
//! - A fixed symbol set is fetched every fine interval by several offset fine
//!   tickers that share one fine buffer, so one slow upstream call costs at
//!   most one sample.
//! - Medium and coarse tickers roll the trailing window of the tier below into
//!   one OHLCV bar per symbol.
//! - Every buffer mutation becomes one atomic batch of keyed upserts and
//!   deletes. The batch is executed first and the buffer only changes once the
//!   store accepted it.
//!
//! Key behaviors
//! - Late arrivals are spliced into place; short gaps are backfilled with
//!   duplicates of the incoming reading; long gaps start a new run.
//! - Tickers compensate drift: firings stay on `t0 + k × interval` and carry the
//!   aligned slot time, which is what gets persisted.
//! - Each buffer is owned by its own worker task, so a slow store stalls only
//!   that tier.
//!
//! Building and running a day:
//! ```rust,ignore
//! use std::sync::Arc;
//! use quoteroll::{Quoteroll, QuoterollConfig};
//!
//! let app = Quoteroll::builder()
//!     .source(source)
//!     .store(store)
//!     .symbols(["BA", "CRM", "JPM"])
//!     .build()?;
//!
//! if let Some(session) = app.run_day(today).await?.into_session() {
//!     let report = session.join().await;
//! }
//! app.shutdown().await;
//! ```
//!
//! See `quoteroll/examples/` for a runnable demonstration.
#![warn(missing_docs)]

pub(crate) mod core;
mod pipeline;
mod ticker;
mod worker;

pub use self::core::{DayOutcome, Quoteroll, QuoterollBuilder};
pub use pipeline::{RollupPipeline, SessionHandle, SessionReport};
pub use ticker::{DriftCompensatedTicker, Tick, TickerConfig, TickerHandle, TickerReport};
pub use worker::{BufferHandle, BufferStats, BufferView, BufferWorker};

pub use quoteroll_middleware::{RetryMiddleware, StoreBuilder, TimeoutMiddleware};

// Re-export core types for convenience
pub use quoteroll_core::{
    BackingStore, BackoffConfig, ConsistencyLevel, Granularity, Ohlcv, PersistOp, PricePoint,
    PushKind, PushOutcome, QuoteSource, QuoterollConfig, QuoterollError, RowKey, SessionConfig,
    Snapshot, StoreMiddleware, Symbol, TierConfig, TimeSeriesBuffer, TradingCalendar,
    WeekdayCalendar, WindowEntry,
};
