use rust_decimal::Decimal;

use crate::Ohlcv;

/// Running high/low of a symbol since the last extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extrema {
    /// Highest high observed.
    pub high: Decimal,
    /// Lowest low observed.
    pub low: Decimal,
}

impl Extrema {
    /// Neutral element: any observation replaces both bounds.
    pub const NEUTRAL: Self = Self {
        high: Decimal::MIN,
        low: Decimal::MAX,
    };

    /// Fold a reading into the bounds.
    pub fn observe(&mut self, ohlcv: &Ohlcv) {
        self.high = self.high.max(ohlcv.high);
        self.low = self.low.min(ohlcv.low);
    }

    /// True while nothing has been observed.
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

impl Default for Extrema {
    fn default() -> Self {
        Self::NEUTRAL
    }
}
