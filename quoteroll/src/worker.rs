//! Per-buffer actor: serializes pushes and extracts and owns the store I/O for
//! one granularity.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use quoteroll_core::connector::{BackingStore, tag_store_err};
use quoteroll_core::{
    ConsistencyLevel, Granularity, PushOutcome, PushPlan, QuoterollError, Snapshot,
    TimeSeriesBuffer, WindowEntry,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Counters kept by a buffer worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Pushes committed.
    pub pushes: u64,
    /// Batches the store rejected; the matching pushes were not committed.
    pub failed_batches: u64,
    /// Persistence operations accepted by the store.
    pub ops_written: u64,
    /// Entries evicted for capacity.
    pub evicted: u64,
}

/// Read-only copy of the newest entries of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferView {
    /// Granularity of the buffer.
    pub granularity: Granularity,
    /// Number of entries held.
    pub len: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Newest entries, oldest first.
    pub entries: Vec<WindowEntry>,
}

enum Command {
    Push {
        snapshot: Snapshot,
        ts: DateTime<Utc>,
        reply: oneshot::Sender<Result<PushOutcome, QuoterollError>>,
    },
    Read(Query),
}

// Commands that never wait on the store.
enum Query {
    Extract {
        reply: oneshot::Sender<Result<Snapshot, QuoterollError>>,
    },
    View {
        last: usize,
        reply: oneshot::Sender<BufferView>,
    },
    Stats {
        reply: oneshot::Sender<BufferStats>,
    },
}

/// Cloneable handle to a buffer worker. Every clone talks to the same buffer.
#[derive(Clone)]
pub struct BufferHandle {
    granularity: Granularity,
    tx: mpsc::Sender<Command>,
}

impl BufferHandle {
    /// Granularity of the buffer behind this handle.
    #[must_use]
    pub const fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Push a snapshot. The batch is executed before the buffer changes; if
    /// the store rejects it the buffer is left untouched.
    ///
    /// # Errors
    /// Returns the store error, `Serialization`, or `WorkerClosed`.
    pub async fn push(
        &self,
        snapshot: Snapshot,
        ts: DateTime<Utc>,
    ) -> Result<PushOutcome, QuoterollError> {
        self.call(|reply| Command::Push {
            snapshot,
            ts,
            reply,
        })
        .await?
    }

    /// Roll up the trailing window and reset the running extrema.
    ///
    /// # Errors
    /// Returns `EmptyWindow` or `WorkerClosed`.
    pub async fn extract(&self) -> Result<Snapshot, QuoterollError> {
        self.call(|reply| Command::Read(Query::Extract { reply }))
            .await?
    }

    /// Copy of the newest `last` entries.
    ///
    /// # Errors
    /// Returns `WorkerClosed`.
    pub async fn view(&self, last: usize) -> Result<BufferView, QuoterollError> {
        self.call(|reply| Command::Read(Query::View { last, reply }))
            .await
    }

    /// Current counters.
    ///
    /// # Errors
    /// Returns `WorkerClosed`.
    pub async fn stats(&self) -> Result<BufferStats, QuoterollError> {
        self.call(|reply| Command::Read(Query::Stats { reply }))
            .await
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, QuoterollError> {
        let closed = || QuoterollError::WorkerClosed {
            granularity: self.granularity,
        };
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }
}

/// Task that owns a [`TimeSeriesBuffer`] and its store.
///
/// While a batch is in flight the worker keeps answering extracts, views and
/// stats; further pushes wait until the batch settles. The worker exits once
/// every [`BufferHandle`] has been dropped and returns its final [`BufferStats`].
pub struct BufferWorker {
    buffer: TimeSeriesBuffer,
    store: Arc<dyn BackingStore>,
    consistency: ConsistencyLevel,
    stats: BufferStats,
    rx: mpsc::Receiver<Command>,
}

impl BufferWorker {
    /// Spawn a worker on the current Tokio runtime with a mailbox of `queue` commands.
    pub fn spawn(
        buffer: TimeSeriesBuffer,
        store: Arc<dyn BackingStore>,
        consistency: ConsistencyLevel,
        queue: usize,
    ) -> (BufferHandle, JoinHandle<BufferStats>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let granularity = buffer.granularity();
        let worker = Self {
            buffer,
            store,
            consistency,
            stats: BufferStats::default(),
            rx,
        };
        let join = tokio::spawn(worker.run());
        (BufferHandle { granularity, tx }, join)
    }

    async fn run(mut self) -> BufferStats {
        let mut deferred = VecDeque::new();
        loop {
            let cmd = match deferred.pop_front() {
                Some(cmd) => cmd,
                None => match self.rx.recv().await {
                    Some(cmd) => cmd,
                    None => break,
                },
            };
            match cmd {
                Command::Push {
                    snapshot,
                    ts,
                    reply,
                } => {
                    let res = self.push(snapshot, ts, &mut deferred).await;
                    let _ = reply.send(res);
                }
                Command::Read(query) => self.serve(query),
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            granularity = %self.buffer.granularity(),
            pushes = self.stats.pushes,
            failed_batches = self.stats.failed_batches,
            "buffer worker stopped"
        );
        self.stats
    }

    fn serve(&mut self, query: Query) {
        match query {
            Query::Extract { reply } => {
                let _ = reply.send(self.buffer.extract());
            }
            Query::View { last, reply } => {
                let _ = reply.send(BufferView {
                    granularity: self.buffer.granularity(),
                    len: self.buffer.len(),
                    capacity: self.buffer.capacity(),
                    entries: self.buffer.tail(last),
                });
            }
            Query::Stats { reply } => {
                let _ = reply.send(self.stats);
            }
        }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "quoteroll::worker::push",
            skip(self, snapshot, deferred),
            fields(
                granularity = %self.buffer.granularity(),
                store = self.store.name(),
                ts = %ts,
            ),
        )
    )]
    async fn push(
        &mut self,
        snapshot: Snapshot,
        ts: DateTime<Utc>,
        deferred: &mut VecDeque<Command>,
    ) -> Result<PushOutcome, QuoterollError> {
        let plan = self.buffer.plan_push(snapshot, ts)?;
        let ops = plan.ops().len();
        if ops > 0
            && let Err(e) = self.execute(&plan, deferred).await
        {
            self.stats.failed_batches += 1;
            let e = tag_store_err(self.store.name(), e);
            #[cfg(feature = "tracing")]
            tracing::warn!(ops, error = %e, "batch rejected; buffer left unchanged");
            return Err(e);
        }
        let outcome = self.buffer.commit(plan)?;
        self.stats.pushes += 1;
        self.stats.ops_written += u64::try_from(ops).unwrap_or(u64::MAX);
        self.stats.evicted += u64::try_from(outcome.evicted.len()).unwrap_or(u64::MAX);
        Ok(outcome)
    }

    // Runs the batch while serving reads from the mailbox. Pushes received
    // meanwhile are queued in `deferred`; the plan's revision guards the commit.
    async fn execute(
        &mut self,
        plan: &PushPlan,
        deferred: &mut VecDeque<Command>,
    ) -> Result<(), QuoterollError> {
        let store = Arc::clone(&self.store);
        let mut batch = store.execute_batch(plan.ops(), self.consistency);
        let mut mailbox_open = true;
        loop {
            tokio::select! {
                biased;
                res = &mut batch => return res,
                cmd = self.rx.recv(), if mailbox_open => match cmd {
                    Some(Command::Read(query)) => self.serve(query),
                    Some(push) => deferred.push_back(push),
                    None => mailbox_open = false,
                },
            }
        }
    }
}
