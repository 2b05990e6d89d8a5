//! Configuration types shared by the buffer, the scheduler and the orchestrator.

use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{ConsistencyLevel, Granularity, QuoterollError};

/// Largest accepted `gap_fill_multiplier`. A single push can place up to
/// `multiplier - 1` synthetic slots.
pub const MAX_GAP_FILL_MULTIPLIER: u32 = 1_000;

/// Retention and cadence of one granularity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Spacing between consecutive entries of this tier.
    pub interval: Duration,
    /// Maximum number of entries retained in memory (and in the store).
    pub capacity: usize,
}

impl TierConfig {
    /// Defaults for a tier. Retention keeps roughly twice what the upstream
    /// makes available: two sessions of seconds, 120 sessions of minutes and
    /// about two years of hourly bars.
    #[must_use]
    pub const fn default_for(granularity: Granularity) -> Self {
        match granularity {
            Granularity::Fine => Self {
                interval: Duration::from_secs(1),
                capacity: 46_800,
            },
            Granularity::Medium => Self {
                interval: Duration::from_secs(60),
                capacity: 46_800,
            },
            Granularity::Coarse => Self {
                interval: Duration::from_secs(3_600),
                capacity: 3_400,
            },
        }
    }
}

/// Daily trading session the pipeline is armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Local wall-clock time at which the session starts.
    pub open: NaiveTime,
    /// Exchange timezone used to interpret `open`.
    pub timezone: Tz,
    /// How long the tickers keep firing once armed.
    pub duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            timezone: chrono_tz::America::New_York,
            duration: Duration::from_secs(23_400),
        }
    }
}

/// Exponential backoff configuration for retrying persistence batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Minimum backoff delay in milliseconds.
    pub min_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Exponential factor to increase delay after each failure (>= 1).
    pub factor: u32,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 100,
            max_backoff_ms: 5_000,
            factor: 2,
            jitter_percent: 20,
            max_attempts: 3,
        }
    }
}

/// Global configuration for a quoteroll deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoterollConfig {
    /// Fixed list of symbols fetched every fine tick.
    pub symbols: Vec<String>,
    /// Fine tier (fed by the upstream source).
    pub fine: TierConfig,
    /// Medium tier (rolled up from fine).
    pub medium: TierConfig,
    /// Coarse tier (rolled up from medium).
    pub coarse: TierConfig,
    /// Gaps shorter than `gap_fill_multiplier × interval` are backfilled;
    /// longer gaps are treated as the start of a new session.
    pub gap_fill_multiplier: u32,
    /// Number of trailing entries an extract spans.
    pub lookback: usize,
    /// Number of offset fine tickers sharing the fine buffer.
    pub fine_workers: usize,
    /// Daily session timing.
    pub session: SessionConfig,
    /// Consistency level requested for every persistence batch.
    pub consistency: ConsistencyLevel,
    /// Upper bound on a single batch execution; `None` disables it.
    pub store_timeout: Option<Duration>,
    /// Optional retry policy for failed batches.
    pub store_retry: Option<BackoffConfig>,
    /// Mailbox depth of each buffer worker.
    pub worker_queue: usize,
}

impl Default for QuoterollConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            fine: TierConfig::default_for(Granularity::Fine),
            medium: TierConfig::default_for(Granularity::Medium),
            coarse: TierConfig::default_for(Granularity::Coarse),
            gap_fill_multiplier: 10,
            lookback: 60,
            fine_workers: 2,
            session: SessionConfig::default(),
            consistency: ConsistencyLevel::Quorum,
            store_timeout: Some(Duration::from_secs(10)),
            store_retry: None,
            worker_queue: 64,
        }
    }
}

impl QuoterollConfig {
    /// Parse a configuration from JSON. Missing keys take their defaults.
    ///
    /// # Errors
    /// Returns `Config` if the document is malformed.
    pub fn from_json_str(s: &str) -> Result<Self, QuoterollError> {
        serde_json::from_str(s).map_err(|e| QuoterollError::config(e.to_string()))
    }

    /// Tier configuration for a granularity.
    #[must_use]
    pub const fn tier(&self, granularity: Granularity) -> &TierConfig {
        match granularity {
            Granularity::Fine => &self.fine,
            Granularity::Medium => &self.medium,
            Granularity::Coarse => &self.coarse,
        }
    }

    /// Check the configuration for values that would make the pipeline meaningless.
    ///
    /// # Errors
    /// Returns `Config` describing the first problem found.
    pub fn validate(&self) -> Result<(), QuoterollError> {
        if self.symbols.iter().all(|s| s.trim().is_empty()) {
            return Err(QuoterollError::config("symbol set is empty"));
        }
        for g in Granularity::ALL {
            let tier = self.tier(g);
            if tier.interval.is_zero() {
                return Err(QuoterollError::config(format!("{g} interval must be positive")));
            }
            if tier.capacity == 0 {
                return Err(QuoterollError::config(format!("{g} capacity must be positive")));
            }
        }
        if !is_multiple(self.medium.interval, self.fine.interval) {
            return Err(QuoterollError::config(
                "medium interval must be a multiple of the fine interval",
            ));
        }
        if !is_multiple(self.coarse.interval, self.medium.interval) {
            return Err(QuoterollError::config(
                "coarse interval must be a multiple of the medium interval",
            ));
        }
        if self.gap_fill_multiplier == 0 || self.gap_fill_multiplier > MAX_GAP_FILL_MULTIPLIER {
            return Err(QuoterollError::config(format!(
                "gap_fill_multiplier must be in 1..={MAX_GAP_FILL_MULTIPLIER}"
            )));
        }
        if self.lookback == 0 {
            return Err(QuoterollError::config("lookback must be positive"));
        }
        if self.fine_workers == 0 {
            return Err(QuoterollError::config("fine_workers must be positive"));
        }
        if self.session.duration.is_zero() {
            return Err(QuoterollError::config("session duration must be positive"));
        }
        if self.worker_queue == 0 {
            return Err(QuoterollError::config("worker_queue must be positive"));
        }
        if let Some(retry) = self.store_retry
            && (retry.max_attempts == 0 || retry.factor == 0 || retry.jitter_percent > 100)
        {
            return Err(QuoterollError::config(
                "store_retry needs max_attempts >= 1, factor >= 1 and jitter_percent <= 100",
            ));
        }
        Ok(())
    }
}

fn is_multiple(coarse: Duration, fine: Duration) -> bool {
    !fine.is_zero() && coarse.as_nanos() % fine.as_nanos() == 0
}
