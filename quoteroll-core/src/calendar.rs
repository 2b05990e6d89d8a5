use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};

/// Decides whether the pipeline should be armed on a given exchange-local date.
pub trait TradingCalendar: Send + Sync {
    /// True when `date` is a trading day.
    fn is_eligible_day(&self, date: NaiveDate) -> bool;
}

/// Monday-to-Friday calendar with an explicit holiday list.
#[derive(Debug, Clone, Default)]
pub struct WeekdayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl WeekdayCalendar {
    /// Calendar with no holidays.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            holidays: BTreeSet::new(),
        }
    }

    /// Add holidays to the calendar.
    #[must_use]
    pub fn with_holidays(mut self, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(days);
        self
    }

    /// Holidays currently configured.
    pub fn holidays(&self) -> impl Iterator<Item = &NaiveDate> {
        self.holidays.iter()
    }
}

impl TradingCalendar for WeekdayCalendar {
    fn is_eligible_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekends_and_holidays_are_skipped() {
        let cal = WeekdayCalendar::new().with_holidays([d(2024, 7, 4)]);
        assert!(cal.is_eligible_day(d(2024, 7, 3)));
        assert!(!cal.is_eligible_day(d(2024, 7, 4)));
        assert!(!cal.is_eligible_day(d(2024, 7, 6)));
        assert!(!cal.is_eligible_day(d(2024, 7, 7)));
        assert!(cal.is_eligible_day(d(2024, 7, 8)));
    }
}
