use std::collections::BTreeSet;

use chrono::NaiveDate;
use quoteroll_core::TradingCalendar;

/// Calendar that is open exactly on the listed dates.
#[derive(Debug, Clone, Default)]
pub struct FixedCalendar {
    open: BTreeSet<NaiveDate>,
}

impl FixedCalendar {
    /// Open on every date in `days`.
    pub fn open_on(days: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            open: days.into_iter().collect(),
        }
    }

    /// Never open.
    #[must_use]
    pub const fn closed() -> Self {
        Self {
            open: BTreeSet::new(),
        }
    }
}

impl TradingCalendar for FixedCalendar {
    fn is_eligible_day(&self, date: NaiveDate) -> bool {
        self.open.contains(&date)
    }
}
