#![doc = include_str!("../README.md")]
//! quoteroll-middleware
//!
//! Re-exports for backing-store wrappers.

mod backoff;
mod builder;
mod retry;
mod timeout;

pub use crate::backoff::{backoff_delay, jitter_wait};
pub use crate::builder::StoreBuilder;
pub use crate::retry::{RetryMiddleware, RetryingStore};
pub use crate::timeout::{TimeoutMiddleware, TimeoutStore};
