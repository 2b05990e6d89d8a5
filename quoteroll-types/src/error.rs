use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Granularity;

/// Unified error type for the quoteroll workspace.
///
/// Covers upstream fetch failures, backing-store batch failures, configuration
/// problems detected at startup, and the buffer/worker conditions surfaced to
/// pipeline cycles.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuoterollError {
    /// The upstream quote source failed (network, auth, rate limit, ...).
    #[error("{source_name} fetch failed: {msg}")]
    UpstreamFetch {
        /// Name of the quote source that failed.
        source_name: String,
        /// Human-readable error message.
        msg: String,
    },

    /// The backing store rejected or failed to execute a batch.
    #[error("{store} batch failed: {msg}")]
    BackingStore {
        /// Name of the backing store.
        store: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A batch did not complete within the configured store timeout.
    #[error("{store} batch timed out after {timeout_ms}ms")]
    StoreTimeout {
        /// Name of the backing store.
        store: String,
        /// Timeout that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// Invalid or missing configuration; fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `extract` was called on a buffer with no entries.
    #[error("{granularity} buffer is empty")]
    EmptyWindow {
        /// Granularity of the empty buffer.
        granularity: Granularity,
    },

    /// A push plan was committed against a buffer that changed after planning.
    #[error("push plan is stale: buffer changed since it was planned")]
    StalePlan,

    /// The worker that owns a buffer has shut down.
    #[error("{granularity} buffer worker is closed")]
    WorkerClosed {
        /// Granularity of the closed worker.
        granularity: Granularity,
    },

    /// A payload could not be serialized for persistence.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),
}

impl QuoterollError {
    /// Helper: build an `UpstreamFetch` error tagged with the source name.
    pub fn upstream(source_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::UpstreamFetch {
            source_name: source_name.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `BackingStore` error tagged with the store name.
    pub fn store(store: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BackingStore {
            store: store.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `StoreTimeout` error.
    pub fn store_timeout(store: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::StoreTimeout {
            store: store.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Helper: build a `Config` error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true for failures of an external collaborator that may succeed
    /// on a later attempt. Configuration and buffer-state errors are not transient.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamFetch { .. } | Self::BackingStore { .. } | Self::StoreTimeout { .. }
        )
    }

    /// Returns true if this error originated from the backing store.
    #[must_use]
    pub const fn is_store_error(&self) -> bool {
        matches!(self, Self::BackingStore { .. } | Self::StoreTimeout { .. })
    }
}

impl From<serde_json::Error> for QuoterollError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
