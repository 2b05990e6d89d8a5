//! Session wiring: offset fine tickers feed the fine buffer, and rollup tickers
//! carry aggregates fine → medium → coarse.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use quoteroll_core::connector::{QuoteSource, tag_source_err};
use quoteroll_core::{Granularity, QuoterollConfig, QuoterollError, Symbol};

use crate::ticker::{DriftCompensatedTicker, Tick, TickerConfig, TickerHandle, TickerReport};
use crate::worker::BufferHandle;

/// The three buffers of a deployment together with the upstream source.
#[derive(Clone)]
pub struct RollupPipeline {
    source: Arc<dyn QuoteSource>,
    symbols: Arc<[Symbol]>,
    fine: BufferHandle,
    medium: BufferHandle,
    coarse: BufferHandle,
    config: Arc<QuoterollConfig>,
}

impl RollupPipeline {
    /// Wire a pipeline from its parts.
    ///
    /// # Errors
    /// Returns `Config` if a handle does not match its tier.
    pub fn new(
        source: Arc<dyn QuoteSource>,
        symbols: Vec<Symbol>,
        buffers: [BufferHandle; 3],
        config: QuoterollConfig,
    ) -> Result<Self, QuoterollError> {
        let [fine, medium, coarse] = buffers;
        for (handle, expected) in [&fine, &medium, &coarse].into_iter().zip(Granularity::ALL) {
            if handle.granularity() != expected {
                return Err(QuoterollError::config(format!(
                    "expected a {expected} buffer, got {}",
                    handle.granularity()
                )));
            }
        }
        Ok(Self {
            source,
            symbols: symbols.into(),
            fine,
            medium,
            coarse,
            config: Arc::new(config),
        })
    }

    /// Handle to the buffer of `granularity`.
    #[must_use]
    pub const fn buffer(&self, granularity: Granularity) -> &BufferHandle {
        match granularity {
            Granularity::Fine => &self.fine,
            Granularity::Medium => &self.medium,
            Granularity::Coarse => &self.coarse,
        }
    }

    /// Symbols fetched every fine cycle.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Fetch the symbol set and push it into the fine buffer at the tick's slot time.
    ///
    /// # Errors
    /// Returns the upstream or store error of this cycle.
    pub async fn fine_cycle(&self, tick: Tick) -> Result<(), QuoterollError> {
        let snapshot = self
            .source
            .fetch(&self.symbols)
            .await
            .map_err(|e| tag_source_err(self.source.name(), e))?;
        self.fine.push(snapshot, tick.scheduled_at).await.map(drop)
    }

    /// Extract from the buffer below `target` and push the aggregate into `target`.
    /// An empty source buffer skips the cycle.
    ///
    /// # Errors
    /// Returns `InvalidArg` for the fine tier, or the store error of the push.
    pub async fn rollup_cycle(&self, target: Granularity, tick: Tick) -> Result<(), QuoterollError> {
        let (from, to) = match target {
            Granularity::Fine => {
                return Err(QuoterollError::InvalidArg(
                    "the fine tier is fed by the quote source".to_string(),
                ));
            }
            Granularity::Medium => (&self.fine, &self.medium),
            Granularity::Coarse => (&self.medium, &self.coarse),
        };
        match from.extract().await {
            Ok(aggregate) => to.push(aggregate, tick.scheduled_at).await.map(drop),
            Err(QuoterollError::EmptyWindow { granularity }) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(from = %granularity, to = %target, "nothing to roll up");
                #[cfg(not(feature = "tracing"))]
                let _ = granularity;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Arm every ticker of a session aligned to `origin`.
    ///
    /// Spawns `fine_workers` fine tickers, each with period
    /// `fine_workers × fine interval` and worker `k` delayed by `k × fine interval`,
    /// plus one medium and one coarse rollup ticker. All share the session duration.
    ///
    /// # Errors
    /// Returns `Config` for a degenerate schedule.
    pub fn start_session(&self, origin: DateTime<Utc>) -> Result<SessionHandle, QuoterollError> {
        let cfg = &self.config;
        let run_for = cfg.session.duration;
        let workers = u32::try_from(cfg.fine_workers)
            .map_err(|_| QuoterollError::config("fine_workers is too large"))?;
        let fine_period = cfg
            .fine
            .interval
            .checked_mul(workers)
            .ok_or_else(|| QuoterollError::config("fine ticker period overflows"))?;

        let mut tickers = Vec::with_capacity(cfg.fine_workers + 2);
        for k in 0..workers {
            let schedule = TickerConfig::new(fine_period, run_for)
                .with_start_delay(cfg.fine.interval * k)
                .with_origin(origin);
            let ticker = DriftCompensatedTicker::new(format!("fine-{k}"), schedule)?;
            let me = self.clone();
            tickers.push(ticker.spawn(move |tick| {
                let me = me.clone();
                async move { me.fine_cycle(tick).await }
            }));
        }

        for target in [Granularity::Medium, Granularity::Coarse] {
            let schedule = TickerConfig::new(cfg.tier(target).interval, run_for).with_origin(origin);
            let ticker = DriftCompensatedTicker::new(target.to_string(), schedule)?;
            let me = self.clone();
            tickers.push(ticker.spawn(move |tick| {
                let me = me.clone();
                async move { me.rollup_cycle(target, tick).await }
            }));
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            %origin,
            run_for_s = run_for.as_secs(),
            tickers = tickers.len(),
            symbols = self.symbols.len(),
            "session armed"
        );
        Ok(SessionHandle { tickers })
    }
}

/// Reports of every ticker of a session, keyed by ticker label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Per-ticker reports.
    pub tickers: BTreeMap<String, TickerReport>,
}

impl SessionReport {
    /// Report of one ticker.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&TickerReport> {
        self.tickers.get(label)
    }

    /// Firings across all tickers whose label starts with `prefix`.
    #[must_use]
    pub fn fired(&self, prefix: &str) -> u64 {
        self.tickers
            .iter()
            .filter(|(label, _)| label.starts_with(prefix))
            .map(|(_, r)| r.fired)
            .sum()
    }

    /// Failed cycles across all tickers.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.tickers.values().map(|r| r.failed).sum()
    }
}

/// Handle to the tickers of a running session.
pub struct SessionHandle {
    tickers: Vec<TickerHandle>,
}

impl SessionHandle {
    /// Labels of the session's tickers.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.tickers.iter().map(TickerHandle::label).collect()
    }

    /// Cancel all future firings and wait for every ticker to exit.
    pub async fn stop(self) -> SessionReport {
        Self::collect(self.tickers, true).await
    }

    /// Wait for the session to run its course.
    pub async fn join(self) -> SessionReport {
        Self::collect(self.tickers, false).await
    }

    async fn collect(tickers: Vec<TickerHandle>, stop: bool) -> SessionReport {
        let labels: Vec<String> = tickers.iter().map(|t| t.label().to_string()).collect();
        let reports = join_all(tickers.into_iter().map(|t| async move {
            if stop { t.stop().await } else { t.join().await }
        }))
        .await;
        let report = SessionReport {
            tickers: labels.into_iter().zip(reports).collect(),
        };
        #[cfg(feature = "tracing")]
        tracing::info!(
            fired = report.tickers.values().map(|r| r.fired).sum::<u64>(),
            failed = report.failed(),
            "session finished"
        );
        report
    }
}
