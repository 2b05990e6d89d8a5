use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use quoteroll_core::connector::BackingStore;
use quoteroll_core::{ConsistencyLevel, Granularity, PersistOp, QuoterollError, RowKey, Symbol};

use crate::MockBehavior;

/// A batch the store accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBatch {
    /// Operations in submission order.
    pub ops: Vec<PersistOp>,
    /// Consistency level requested by the caller.
    pub consistency: ConsistencyLevel,
}

struct InternalState {
    rows: BTreeMap<RowKey, String>,
    accepted: Vec<RecordedBatch>,
    attempts: usize,
    script: VecDeque<MockBehavior<()>>,
    replication_factor: u32,
    live_replicas: u32,
}

impl Default for InternalState {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            accepted: Vec::new(),
            attempts: 0,
            script: VecDeque::new(),
            replication_factor: 3,
            live_replicas: 3,
        }
    }
}

/// Controller handle used by tests to drive and inspect a [`MemoryStore`].
#[derive(Clone)]
pub struct MemoryStoreController {
    state: Arc<Mutex<InternalState>>,
}

impl MemoryStoreController {
    /// Queue behaviors for the next calls, one per call. Once the queue is
    /// drained the store accepts batches again.
    pub async fn script(&self, behaviors: impl IntoIterator<Item = MockBehavior<()>>) {
        let mut guard = self.state.lock().await;
        guard.script.extend(behaviors);
    }

    /// Fail the next `n` batches with a store error.
    pub async fn fail_next(&self, n: usize) {
        let mut guard = self.state.lock().await;
        for _ in 0..n {
            guard.script.push_back(MockBehavior::Fail(QuoterollError::store(
                "memory",
                "scripted failure",
            )));
        }
    }

    /// Change how many of the replicas acknowledge writes.
    pub async fn set_live_replicas(&self, live: u32) {
        let mut guard = self.state.lock().await;
        guard.live_replicas = live.min(guard.replication_factor);
    }

    /// Snapshot of every stored row.
    pub async fn rows(&self) -> BTreeMap<RowKey, String> {
        self.state.lock().await.rows.clone()
    }

    /// Stored timestamps for one symbol and granularity, ascending.
    pub async fn timestamps(&self, symbol: &Symbol, granularity: Granularity) -> Vec<DateTime<Utc>> {
        let guard = self.state.lock().await;
        guard
            .rows
            .keys()
            .filter(|k| &k.symbol == symbol && k.granularity == granularity)
            .map(|k| k.ts)
            .collect()
    }

    /// Batches accepted so far, in order.
    pub async fn batches(&self) -> Vec<RecordedBatch> {
        self.state.lock().await.accepted.clone()
    }

    /// Number of `execute_batch` calls, accepted or not.
    pub async fn attempts(&self) -> usize {
        self.state.lock().await.attempts
    }
}

/// In-memory [`BackingStore`] keyed by `(symbol, granularity, timestamp)`.
///
/// Batches apply atomically: either every operation lands or none does.
/// A batch is rejected when the requested consistency level needs more
/// acknowledgements than there are live replicas.
pub struct MemoryStore {
    name: &'static str,
    state: Arc<Mutex<InternalState>>,
}

impl MemoryStore {
    /// Create a store with three healthy replicas and its controller.
    #[must_use]
    pub fn new_with_controller(name: &'static str) -> (Arc<dyn BackingStore>, MemoryStoreController) {
        Self::with_replication(name, 3)
    }

    /// Create a store with `replication_factor` healthy replicas and its controller.
    #[must_use]
    pub fn with_replication(
        name: &'static str,
        replication_factor: u32,
    ) -> (Arc<dyn BackingStore>, MemoryStoreController) {
        let state = Arc::new(Mutex::new(InternalState {
            replication_factor,
            live_replicas: replication_factor,
            ..InternalState::default()
        }));
        let controller = MemoryStoreController {
            state: Arc::clone(&state),
        };
        let me = Arc::new(Self { name, state });
        (me as Arc<dyn BackingStore>, controller)
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute_batch(
        &self,
        ops: &[PersistOp],
        consistency: ConsistencyLevel,
    ) -> Result<(), QuoterollError> {
        // Acquire behavior without holding the lock across the hang
        let behavior = {
            let mut guard = self.state.lock().await;
            guard.attempts += 1;
            guard.script.pop_front()
        };
        match behavior {
            Some(MockBehavior::Fail(e)) => return Err(e),
            Some(MockBehavior::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(MockBehavior::Delay(delay, ())) => tokio::time::sleep(delay).await,
            Some(MockBehavior::Return(())) | None => {}
        }

        let mut guard = self.state.lock().await;
        let needed = consistency.required_acks(guard.replication_factor);
        if needed > guard.live_replicas {
            return Err(QuoterollError::store(
                self.name,
                format!(
                    "not enough replicas for {consistency:?}: {needed} required, {} alive",
                    guard.live_replicas
                ),
            ));
        }
        for op in ops {
            match op {
                PersistOp::Upsert { key, payload } => {
                    guard.rows.insert(key.clone(), payload.clone());
                }
                PersistOp::Delete { key } => {
                    guard.rows.remove(key);
                }
            }
        }
        guard.accepted.push(RecordedBatch {
            ops: ops.to_vec(),
            consistency,
        });
        Ok(())
    }
}
