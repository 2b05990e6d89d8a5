use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use quoteroll_core::connector::{BackingStore, QuoteSource};
use quoteroll_core::{
    Granularity, QuoterollConfig, QuoterollError, StoreMiddleware, Symbol, TimeSeriesBuffer,
    TradingCalendar, WeekdayCalendar,
};
use quoteroll_middleware::StoreBuilder;
use tokio::task::JoinHandle;

use crate::pipeline::{RollupPipeline, SessionHandle};
use crate::worker::{BufferStats, BufferWorker};

/// Application context: the pipeline, its workers and the trading calendar.
///
/// Built once at startup through [`Quoteroll::builder`] and torn down with
/// [`Quoteroll::shutdown`].
pub struct Quoteroll {
    pipeline: RollupPipeline,
    calendar: Arc<dyn TradingCalendar>,
    config: QuoterollConfig,
    workers: Vec<(Granularity, JoinHandle<BufferStats>)>,
}

/// Outcome of arming the pipeline for a calendar day.
pub enum DayOutcome {
    /// The calendar marks the day as non-trading; nothing was armed.
    Skipped {
        /// The skipped day.
        date: NaiveDate,
    },
    /// A session is running.
    Started(SessionHandle),
}

impl DayOutcome {
    /// The running session, if one was started.
    #[must_use]
    pub fn into_session(self) -> Option<SessionHandle> {
        match self {
            Self::Started(s) => Some(s),
            Self::Skipped { .. } => None,
        }
    }
}

/// Builder for constructing a [`Quoteroll`] application context.
pub struct QuoterollBuilder {
    source: Option<Arc<dyn QuoteSource>>,
    store: Option<Arc<dyn BackingStore>>,
    calendar: Option<Arc<dyn TradingCalendar>>,
    layers: Vec<Box<dyn StoreMiddleware>>,
    config: QuoterollConfig,
}

impl Default for QuoterollBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoterollBuilder {
    /// Create a builder with the default configuration and no collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: None,
            store: None,
            calendar: None,
            layers: Vec::new(),
            config: QuoterollConfig::default(),
        }
    }

    /// Upstream quote source feeding the fine tier.
    #[must_use]
    pub fn source(mut self, source: Arc<dyn QuoteSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Backing store receiving every batch.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Trading calendar gating [`Quoteroll::run_day`]. Defaults to weekdays.
    #[must_use]
    pub fn calendar(mut self, calendar: Arc<dyn TradingCalendar>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: QuoterollConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the symbol list.
    #[must_use]
    pub fn symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Add a store middleware outside the configured timeout/retry layers.
    #[must_use]
    pub fn store_layer(mut self, layer: Box<dyn StoreMiddleware>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Validate the configuration, wrap the store and spawn the buffer workers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns `Config` for an invalid configuration, a malformed symbol list, or
    /// a missing source or store.
    pub fn build(self) -> Result<Quoteroll, QuoterollError> {
        self.config.validate()?;
        let symbols = Symbol::parse_list(&self.config.symbols)
            .map_err(|e| QuoterollError::config(e.to_string()))?;
        let source = self
            .source
            .ok_or_else(|| QuoterollError::config("no quote source; set one via source(...)"))?;
        let raw = self
            .store
            .ok_or_else(|| QuoterollError::config("no backing store; set one via store(...)"))?;

        let mut stack = StoreBuilder::from_config(raw, &self.config);
        for layer in self.layers {
            stack = stack.layer(layer);
        }
        let store = stack.build();

        let mut handles = Vec::with_capacity(3);
        let mut workers = Vec::with_capacity(3);
        for g in Granularity::ALL {
            let buffer = TimeSeriesBuffer::from_config(&self.config, g)?;
            let (handle, join) = BufferWorker::spawn(
                buffer,
                Arc::clone(&store),
                self.config.consistency,
                self.config.worker_queue,
            );
            handles.push(handle);
            workers.push((g, join));
        }
        let buffers: [_; 3] = handles
            .try_into()
            .map_err(|_| QuoterollError::config("expected three buffer workers"))?;
        let pipeline = RollupPipeline::new(source, symbols, buffers, self.config.clone())?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            symbols = pipeline.symbols().len(),
            store = store.name(),
            consistency = ?self.config.consistency,
            "quoteroll ready"
        );

        Ok(Quoteroll {
            pipeline,
            calendar: self
                .calendar
                .unwrap_or_else(|| Arc::new(WeekdayCalendar::new())),
            config: self.config,
            workers,
        })
    }
}

impl Quoteroll {
    /// Start building a new application context.
    #[must_use]
    pub fn builder() -> QuoterollBuilder {
        QuoterollBuilder::new()
    }

    /// The pipeline driving the buffers.
    #[must_use]
    pub const fn pipeline(&self) -> &RollupPipeline {
        &self.pipeline
    }

    /// Validated configuration.
    #[must_use]
    pub const fn config(&self) -> &QuoterollConfig {
        &self.config
    }

    /// Wall-clock session open on `date` in the configured exchange timezone.
    /// `None` if the local open time does not exist on that date.
    #[must_use]
    pub fn session_open(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let session = &self.config.session;
        session
            .timezone
            .from_local_datetime(&date.and_time(session.open))
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Arm the pipeline for `date`: skipped on non-trading days; otherwise waits
    /// for the session open (or starts immediately if it has passed) and starts
    /// a session aligned to it.
    ///
    /// # Errors
    /// Returns `Config` if the session open cannot be resolved.
    pub async fn run_day(&self, date: NaiveDate) -> Result<DayOutcome, QuoterollError> {
        if !self.calendar.is_eligible_day(date) {
            return Ok(Self::skipped(date));
        }
        let open = self.session_open(date).ok_or_else(|| {
            QuoterollError::config(format!("session open does not exist on {date}"))
        })?;
        let origin = match (open - Utc::now()).to_std() {
            Ok(wait) => {
                tokio::time::sleep(wait).await;
                open
            }
            Err(_) => Utc::now(),
        };
        self.run_day_at(date, origin)
    }

    /// Arm the pipeline for `date` right away with an explicit wall-clock origin.
    ///
    /// # Errors
    /// Returns `Config` for a degenerate ticker schedule.
    pub fn run_day_at(
        &self,
        date: NaiveDate,
        origin: DateTime<Utc>,
    ) -> Result<DayOutcome, QuoterollError> {
        if !self.calendar.is_eligible_day(date) {
            return Ok(Self::skipped(date));
        }
        #[cfg(feature = "tracing")]
        tracing::info!(%date, %origin, "arming session");
        self.pipeline.start_session(origin).map(DayOutcome::Started)
    }

    fn skipped(date: NaiveDate) -> DayOutcome {
        #[cfg(feature = "tracing")]
        tracing::info!(%date, "not a trading day; skipping");
        DayOutcome::Skipped { date }
    }

    /// Close the buffer workers and wait for them to drain.
    ///
    /// Workers exit once every handle is gone, so stop running sessions first.
    pub async fn shutdown(self) -> Vec<(Granularity, BufferStats)> {
        let Self {
            pipeline, workers, ..
        } = self;
        drop(pipeline);
        let mut out = Vec::with_capacity(workers.len());
        for (g, join) in workers {
            out.push((g, join.await.unwrap_or_default()));
        }
        #[cfg(feature = "tracing")]
        tracing::info!("quoteroll shut down");
        out
    }
}
