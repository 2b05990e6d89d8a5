use std::time::Duration;

use quoteroll_core::BackoffConfig;
use rand::Rng;

/// Add up to `jitter_percent` of `base_ms` as random jitter.
#[must_use]
pub fn jitter_wait(base_ms: u64, jitter_percent: u32) -> u64 {
    let jitter_range = if jitter_percent == 0 {
        1
    } else {
        std::cmp::max(1, (base_ms.saturating_mul(u64::from(jitter_percent))) / 100)
    };
    let mut rng = rand::rng();
    base_ms + rng.random_range(0..jitter_range)
}

/// Delay before retry number `retry` (0-based): `min × factor^retry`, capped at
/// `max`, plus jitter.
#[must_use]
pub fn backoff_delay(cfg: &BackoffConfig, retry: u32) -> Duration {
    let factor = u64::from(cfg.factor.max(1));
    let mut base = cfg.min_backoff_ms;
    for _ in 0..retry {
        base = base.saturating_mul(factor);
        if base >= cfg.max_backoff_ms {
            break;
        }
    }
    let base = base.min(cfg.max_backoff_ms);
    Duration::from_millis(jitter_wait(base, u32::from(cfg.jitter_percent)))
}
