//! quoteroll-core
//!
//! Core types, traits, and the time-series buffer shared across the quoteroll workspace.
//!
//! - `market`: symbols and per-symbol OHLCV readings grouped into snapshots.
//! - `persist`: the persistence operations a buffer emits for its backing store.
//! - `connector`: the `QuoteSource` and `BackingStore` collaborator traits.
//! - `calendar`: the `TradingCalendar` trait and a weekday calendar with holidays.
//! - `middleware`: the `StoreMiddleware` layering trait.
//! - `buffer`: the ordered, capacity-bounded window with gap filling, late-arrival
//!   correction and running extrema.
//!
//! Buffer mutations are split into a pure planning step and a commit step so that
//! callers can execute the persistence batch first and only apply the in-memory
//! change once the store has accepted it.
#![warn(missing_docs)]

/// Ordered multi-symbol window with rollup extraction.
pub mod buffer;
/// Trading-day eligibility.
pub mod calendar;
/// Collaborator traits for the upstream source and the backing store.
pub mod connector;
/// Symbols, OHLCV readings and snapshots.
pub mod market;
/// Layering trait for backing-store wrappers.
pub mod middleware;
/// Persistence operations and payload encoding.
pub mod persist;
pub mod types;

pub use buffer::{Extrema, PushKind, PushOutcome, PushPlan, TimeSeriesBuffer, WindowEntry};
pub use calendar::{TradingCalendar, WeekdayCalendar};
pub use connector::{BackingStore, QuoteSource};
pub use market::{Ohlcv, PricePoint, Snapshot, Symbol};
pub use middleware::StoreMiddleware;
pub use persist::{PersistOp, RowKey};
pub use types::*;
