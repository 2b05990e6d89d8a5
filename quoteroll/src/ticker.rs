//! Fixed-rate scheduler whose firings stay aligned to `t0 + k × interval`
//! regardless of callback latency.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use quoteroll_core::QuoterollError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Schedule of a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerConfig {
    /// Spacing between firings.
    pub interval: Duration,
    /// How long after the first anchor the ticker keeps firing.
    pub run_for: Duration,
    /// Delay before the first anchor.
    pub start_delay: Duration,
    /// Wall-clock time matching the moment the ticker is spawned.
    pub origin: DateTime<Utc>,
}

impl TickerConfig {
    /// Schedule starting now with no start delay.
    #[must_use]
    pub fn new(interval: Duration, run_for: Duration) -> Self {
        Self {
            interval,
            run_for,
            start_delay: Duration::ZERO,
            origin: Utc::now(),
        }
    }

    /// Shift the first anchor by `delay`.
    #[must_use]
    pub const fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Wall-clock time the schedule is aligned to.
    #[must_use]
    pub const fn with_origin(mut self, origin: DateTime<Utc>) -> Self {
        self.origin = origin;
        self
    }

    /// Wall-clock time of slot `seq`: `origin + start_delay + seq × interval`.
    #[must_use]
    pub fn slot_time(&self, seq: u64) -> DateTime<Utc> {
        let offset = u32::try_from(seq)
            .ok()
            .and_then(|k| self.interval.checked_mul(k))
            .and_then(|d| d.checked_add(self.start_delay))
            .and_then(|d| TimeDelta::from_std(d).ok())
            .unwrap_or(TimeDelta::MAX);
        self.origin
            .checked_add_signed(offset)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// One firing of a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Slot index `k` (1-based). Slots skipped by an overrunning callback are not replayed.
    pub seq: u64,
    /// Wall-clock time of the slot, free of scheduling jitter.
    pub scheduled_at: DateTime<Utc>,
}

/// Summary of a ticker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickerReport {
    /// Callbacks invoked.
    pub fired: u64,
    /// Callbacks that returned an error.
    pub failed: u64,
    /// True if the run ended because of a stop request rather than its duration.
    pub cancelled: bool,
}

/// Drift-compensated repeating timer.
///
/// Each wait is `interval - (elapsed % interval)` measured from the first anchor,
/// so callback latency never accumulates into the schedule. The run ends when a
/// wake-up falls strictly after `anchor + run_for`.
#[derive(Debug, Clone)]
pub struct DriftCompensatedTicker {
    label: String,
    config: TickerConfig,
}

impl DriftCompensatedTicker {
    /// Create a ticker.
    ///
    /// # Errors
    /// Returns `Config` for a zero interval.
    pub fn new(label: impl Into<String>, config: TickerConfig) -> Result<Self, QuoterollError> {
        let label = label.into();
        if config.interval.is_zero() {
            return Err(QuoterollError::config(format!(
                "ticker {label}: interval must be positive"
            )));
        }
        Ok(Self { label, config })
    }

    /// Label used in logs and reports.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Schedule this ticker was built with.
    #[must_use]
    pub const fn config(&self) -> &TickerConfig {
        &self.config
    }

    /// Spawn the scheduling loop on the current Tokio runtime.
    ///
    /// The callback is awaited inline: a slow callback delays (and may skip)
    /// later slots of this ticker only. Errors are counted and logged, never
    /// retried.
    pub fn spawn<F, Fut>(self, callback: F) -> TickerHandle
    where
        F: FnMut(Tick) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), QuoterollError>> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let label = self.label.clone();
        let join = tokio::spawn(self.run(stop_rx, callback));
        TickerHandle {
            label,
            inner: Some(join),
            stop_tx: Some(stop_tx),
        }
    }

    async fn run<F, Fut>(self, mut stop: watch::Receiver<bool>, mut callback: F) -> TickerReport
    where
        F: FnMut(Tick) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), QuoterollError>> + Send + 'static,
    {
        let mut report = TickerReport::default();
        let cfg = self.config;

        if !cfg.start_delay.is_zero() {
            tokio::select! {
                biased;
                () = stop_requested(&mut stop) => {
                    report.cancelled = true;
                    return report;
                }
                () = tokio::time::sleep(cfg.start_delay) => {}
            }
        }

        let anchor = Instant::now();
        let stop_at = anchor + cfg.run_for;
        let interval_ns = cfg.interval.as_nanos();

        loop {
            let phase = anchor.elapsed().as_nanos() % interval_ns;
            let wait = Duration::from_nanos(u64::try_from(interval_ns - phase).unwrap_or(u64::MAX));
            tokio::select! {
                biased;
                () = stop_requested(&mut stop) => {
                    report.cancelled = true;
                    break;
                }
                () = tokio::time::sleep(wait) => {}
            }

            let now = Instant::now();
            if now > stop_at {
                break;
            }
            let seq = u64::try_from((now - anchor).as_nanos() / interval_ns).unwrap_or(u64::MAX);
            let tick = Tick {
                seq,
                scheduled_at: cfg.slot_time(seq),
            };

            report.fired += 1;
            if let Err(e) = callback(tick).await {
                report.failed += 1;
                #[cfg(feature = "tracing")]
                {
                    if e.is_transient() {
                        tracing::warn!(ticker = %self.label, seq, error = %e, "cycle failed");
                    } else {
                        tracing::error!(ticker = %self.label, seq, error = %e, "cycle failed");
                    }
                }
                #[cfg(not(feature = "tracing"))]
                let _ = e;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            ticker = %self.label,
            fired = report.fired,
            failed = report.failed,
            cancelled = report.cancelled,
            "ticker finished"
        );
        report
    }
}

// Resolves once a stop is requested or the handle is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Handle to a running ticker.
///
/// Dropping the handle requests a stop and aborts the task if it is still running.
pub struct TickerHandle {
    label: String,
    inner: Option<JoinHandle<TickerReport>>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl TickerHandle {
    /// Label of the ticker.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// True once the scheduling loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel future firings and wait for the loop to exit. A callback already
    /// in flight completes first.
    pub async fn stop(mut self) -> TickerReport {
        if let Some(tx) = self.stop_tx.take() {
            tx.send_replace(true);
        }
        self.wait().await
    }

    /// Wait for the ticker to finish its run.
    pub async fn join(mut self) -> TickerReport {
        self.wait().await
    }

    async fn wait(&mut self) -> TickerReport {
        match self.inner.take() {
            Some(join) => join.await.unwrap_or(TickerReport {
                cancelled: true,
                ..TickerReport::default()
            }),
            None => TickerReport::default(),
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            tx.send_replace(true);
        }
        if let Some(join) = self.inner.take()
            && !join.is_finished()
        {
            join.abort();
        }
    }
}
