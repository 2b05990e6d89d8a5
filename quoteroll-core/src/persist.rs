use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Granularity, Ohlcv, QuoterollError, Symbol};

/// Primary key of a persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    /// Symbol of the row.
    pub symbol: Symbol,
    /// Tier the row belongs to.
    pub granularity: Granularity,
    /// Window timestamp of the row.
    pub ts: DateTime<Utc>,
}

impl RowKey {
    /// Build a key.
    #[must_use]
    pub const fn new(symbol: Symbol, granularity: Granularity, ts: DateTime<Utc>) -> Self {
        Self {
            symbol,
            granularity,
            ts,
        }
    }
}

/// A single write against the backing store. Batches of these are applied atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistOp {
    /// Insert the row, or replace its payload if it exists.
    Upsert {
        /// Row key.
        key: RowKey,
        /// Serialized OHLCV record.
        payload: String,
    },
    /// Remove the row.
    Delete {
        /// Row key.
        key: RowKey,
    },
}

impl PersistOp {
    /// Key targeted by this operation.
    #[must_use]
    pub const fn key(&self) -> &RowKey {
        match self {
            Self::Upsert { key, .. } | Self::Delete { key } => key,
        }
    }

    /// True for deletes.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Serialize a reading into the opaque payload stored alongside its key.
///
/// # Errors
/// Returns `Serialization` if the record cannot be encoded.
pub fn encode_payload(ohlcv: &Ohlcv) -> Result<String, QuoterollError> {
    Ok(serde_json::to_string(ohlcv)?)
}

/// Decode a payload produced by [`encode_payload`].
///
/// # Errors
/// Returns `Serialization` if the payload is not a valid OHLCV record.
pub fn decode_payload(payload: &str) -> Result<Ohlcv, QuoterollError> {
    Ok(serde_json::from_str(payload)?)
}
