//! Re-export of configuration and error types from `quoteroll-types`.
// Consolidated re-exports so downstream crates can depend on `quoteroll-core` only

pub use quoteroll_types::{
    BackoffConfig, ConsistencyLevel, Granularity, MAX_GAP_FILL_MULTIPLIER, QuoterollConfig,
    QuoterollError, SessionConfig, TierConfig,
};
