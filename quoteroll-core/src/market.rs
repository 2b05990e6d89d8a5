use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::QuoterollError;

/// Canonical ticker symbol: trimmed, upper-cased and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Build a symbol from user input.
    ///
    /// # Errors
    /// Returns `InvalidArg` if the input is blank or contains whitespace.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, QuoterollError> {
        let s = raw.as_ref().trim();
        if s.is_empty() {
            return Err(QuoterollError::InvalidArg("symbol is empty".to_string()));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(QuoterollError::InvalidArg(format!(
                "symbol contains whitespace: {s:?}"
            )));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    /// Parse a list of symbols, rejecting duplicates.
    ///
    /// # Errors
    /// Returns `InvalidArg` for a malformed or repeated symbol.
    pub fn parse_list<I, S>(raw: I) -> Result<Vec<Self>, QuoterollError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<Self> = Vec::new();
        for r in raw {
            let sym = Self::new(r)?;
            if out.contains(&sym) {
                return Err(QuoterollError::InvalidArg(format!("duplicate symbol {sym}")));
            }
            out.push(sym);
        }
        Ok(out)
    }

    /// Borrow the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = QuoterollError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

/// A price observed at an upstream time (epoch milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Observed price.
    pub price: Decimal,
    /// Upstream observation time in epoch milliseconds.
    pub time: i64,
}

/// One OHLCV reading for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ohlcv {
    /// First trade of the period.
    pub open: PricePoint,
    /// Last trade of the period.
    pub close: PricePoint,
    /// Highest price of the period.
    pub high: Decimal,
    /// Lowest price of the period.
    pub low: Decimal,
    /// Volume reported with the close.
    pub volume: u64,
}

impl Ohlcv {
    /// A reading where every price equals `price`, observed at `time`.
    #[must_use]
    pub const fn flat(price: Decimal, time: i64, volume: u64) -> Self {
        let point = PricePoint { price, time };
        Self {
            open: point,
            close: point,
            high: price,
            low: price,
            volume,
        }
    }
}

/// Per-symbol readings captured at one point in time.
///
/// A `BTreeMap` keeps symbol iteration deterministic, which in turn fixes the
/// order of the persistence operations derived from a snapshot.
pub type Snapshot = BTreeMap<Symbol, Ohlcv>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_is_normalized() {
        let s = Symbol::new("  jpm ").unwrap();
        assert_eq!(s.as_str(), "JPM");
        assert!(Symbol::new("   ").is_err());
        assert!(Symbol::new("B A").is_err());
    }

    #[test]
    fn parse_list_rejects_duplicates() {
        assert!(Symbol::parse_list(["BA", "ba"]).is_err());
        let list = Symbol::parse_list(["BA", "CRM"]).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn symbol_serde_validates() {
        let ok: Symbol = serde_json::from_str("\"vz\"").unwrap();
        assert_eq!(ok.as_str(), "VZ");
        assert!(serde_json::from_str::<Symbol>("\"\"").is_err());
    }
}
