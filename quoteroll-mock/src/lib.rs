//! quoteroll-mock
//!
//! Deterministic collaborators for tests and demos.

mod calendar;
mod source;
mod store;

use std::time::Duration;

use quoteroll_core::QuoterollError;

pub use crate::calendar::FixedCalendar;
pub use crate::source::{MockSource, MockSourceController};
pub use crate::store::{MemoryStore, MemoryStoreController, RecordedBatch};

/// Instruction for how the next call should behave.
#[derive(Debug, Clone)]
pub enum MockBehavior<T> {
    /// Return the provided value immediately.
    Return(T),
    /// Return the provided value once the delay has elapsed (simulate a slow peer).
    Delay(Duration, T),
    /// Fail immediately with the provided error.
    Fail(QuoterollError),
    /// Hang indefinitely (simulate a stalled peer).
    Hang,
}
