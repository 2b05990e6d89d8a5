//! Configuration primitives and the shared error type for the quoteroll workspace.
#![warn(missing_docs)]

mod config;
mod error;
mod granularity;

pub use config::{
    BackoffConfig, MAX_GAP_FILL_MULTIPLIER, QuoterollConfig, SessionConfig, TierConfig,
};
pub use error::QuoterollError;
pub use granularity::{ConsistencyLevel, Granularity};
