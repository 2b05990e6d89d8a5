use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

mod extrema;

pub use extrema::Extrema;

use crate::persist::encode_payload;
use crate::{
    Granularity, MAX_GAP_FILL_MULTIPLIER, Ohlcv, PersistOp, QuoterollConfig, QuoterollError,
    RowKey, Snapshot, Symbol, TierConfig,
};

/// A snapshot occupying one slot of the window.
///
/// Gap-filled slots share the same `Arc` as the reading they duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEntry {
    /// Slot timestamp.
    pub ts: DateTime<Utc>,
    /// Readings stored in the slot.
    pub snapshot: Arc<Snapshot>,
}

/// How a push was resolved against the corrected tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    /// The window was empty (below the insertion point) or the gap reached the
    /// threshold; one entry was placed at the pushed timestamp.
    Direct,
    /// The pushed timestamp resolved to an existing slot whose payload was replaced.
    Overwrite,
    /// `count` slots were placed one interval apart; all but the last are synthetic.
    Fill {
        /// Number of slots placed.
        count: usize,
    },
    /// The push landed less than one interval after an existing slot and was
    /// discarded without touching the window, the store or the extrema.
    Dropped,
}

/// Result of committing a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// How the push was resolved.
    pub kind: PushKind,
    /// Timestamps written by the push, ascending.
    pub placed: Vec<DateTime<Utc>>,
    /// Later entries that stayed above the insertion point (late arrival).
    pub reordered: usize,
    /// Timestamps evicted from the front of the window, oldest first.
    pub evicted: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
enum Placement {
    Skip,
    Overwrite {
        index: usize,
    },
    Insert {
        index: usize,
        timestamps: Vec<DateTime<Utc>>,
    },
}

/// A push resolved against a specific buffer revision, together with the
/// persistence operations that make the store match the committed window.
#[derive(Debug, Clone)]
#[must_use = "a push plan does nothing until committed"]
pub struct PushPlan {
    revision: u64,
    snapshot: Arc<Snapshot>,
    placement: Placement,
    kind: PushKind,
    reordered: usize,
    evicted: Vec<DateTime<Utc>>,
    ops: Vec<PersistOp>,
}

impl PushPlan {
    /// Operations to submit as one batch: upserts in window order, then deletes
    /// for evicted slots in eviction order.
    #[must_use]
    pub fn ops(&self) -> &[PersistOp] {
        &self.ops
    }

    /// How the push will be resolved.
    pub const fn kind(&self) -> PushKind {
        self.kind
    }

    /// Timestamps that committing this plan will evict.
    #[must_use]
    pub fn evicted(&self) -> &[DateTime<Utc>] {
        &self.evicted
    }

    fn take_ops(&mut self) -> Vec<PersistOp> {
        std::mem::take(&mut self.ops)
    }
}

/// Ordered, capacity-bounded window of multi-symbol snapshots for one granularity.
///
/// Invariants after every commit:
/// - timestamps are strictly ascending and unique;
/// - `len() <= capacity()`.
///
/// Extrema accumulate from pushes and reset to [`Extrema::NEUTRAL`] on every
/// [`extract`](Self::extract).
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    granularity: Granularity,
    interval_ms: i64,
    capacity: usize,
    gap_fill_multiplier: u32,
    lookback: usize,
    window: VecDeque<WindowEntry>,
    extrema: HashMap<Symbol, Extrema>,
    revision: u64,
}

impl TimeSeriesBuffer {
    /// Create an empty buffer.
    ///
    /// # Errors
    /// Returns `Config` when the interval is shorter than one millisecond, when
    /// capacity or lookback is zero, or when the multiplier is outside
    /// `1..=MAX_GAP_FILL_MULTIPLIER`.
    pub fn new(
        granularity: Granularity,
        tier: TierConfig,
        gap_fill_multiplier: u32,
        lookback: usize,
    ) -> Result<Self, QuoterollError> {
        let interval_ms = i64::try_from(tier.interval.as_millis())
            .map_err(|_| QuoterollError::config(format!("{granularity} interval is too large")))?;
        if interval_ms <= 0 {
            return Err(QuoterollError::config(format!(
                "{granularity} interval must be at least 1ms"
            )));
        }
        if tier.capacity == 0 {
            return Err(QuoterollError::config(format!(
                "{granularity} capacity must be positive"
            )));
        }
        if gap_fill_multiplier == 0 || gap_fill_multiplier > MAX_GAP_FILL_MULTIPLIER {
            return Err(QuoterollError::config(format!(
                "gap_fill_multiplier must be in 1..={MAX_GAP_FILL_MULTIPLIER}"
            )));
        }
        if lookback == 0 {
            return Err(QuoterollError::config("lookback must be positive"));
        }
        Ok(Self {
            granularity,
            interval_ms,
            capacity: tier.capacity,
            gap_fill_multiplier,
            lookback,
            window: VecDeque::new(),
            extrema: HashMap::new(),
            revision: 0,
        })
    }

    /// Create the buffer for `granularity` from a deployment configuration.
    ///
    /// # Errors
    /// See [`new`](Self::new).
    pub fn from_config(
        cfg: &QuoterollConfig,
        granularity: Granularity,
    ) -> Result<Self, QuoterollError> {
        Self::new(
            granularity,
            *cfg.tier(granularity),
            cfg.gap_fill_multiplier,
            cfg.lookback,
        )
    }

    /// Granularity this buffer holds.
    #[must_use]
    pub const fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Spacing between slots.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.unsigned_abs())
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of trailing entries spanned by an extract.
    #[must_use]
    pub const fn lookback(&self) -> usize {
        self.lookback
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// True when the window holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Monotonic counter bumped by every commit.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Timestamp of the newest entry.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.window.back().map(|e| e.ts)
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.window.iter()
    }

    /// All timestamps, oldest first.
    #[must_use]
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.window.iter().map(|e| e.ts).collect()
    }

    /// The entry at exactly `ts`, if present.
    #[must_use]
    pub fn get(&self, ts: DateTime<Utc>) -> Option<&WindowEntry> {
        self.window
            .binary_search_by(|e| e.ts.cmp(&ts))
            .ok()
            .map(|i| &self.window[i])
    }

    /// Clones of the newest `n` entries, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<WindowEntry> {
        let from = self.window.len().saturating_sub(n);
        self.window.range(from..).cloned().collect()
    }

    /// Current running extrema for `symbol`.
    #[must_use]
    pub fn extrema(&self, symbol: &Symbol) -> Extrema {
        self.extrema.get(symbol).copied().unwrap_or_default()
    }

    fn threshold_ms(&self) -> i64 {
        self.interval_ms
            .saturating_mul(i64::from(self.gap_fill_multiplier))
    }

    /// Resolve a push without mutating the buffer.
    ///
    /// Entries newer than `ts` are left in place above the insertion point and
    /// the push is resolved against the newest entry at or before `ts`:
    /// - none, or a gap of at least the threshold: one slot at `ts`;
    /// - same timestamp: overwrite that slot;
    /// - a gap shorter than one interval: nothing is placed;
    /// - otherwise: one slot per whole interval step, each holding `snapshot`.
    ///
    /// # Errors
    /// Returns `Serialization` if a reading cannot be encoded.
    pub fn plan_push(
        &self,
        snapshot: Snapshot,
        ts: DateTime<Utc>,
    ) -> Result<PushPlan, QuoterollError> {
        let split = self.window.partition_point(|e| e.ts <= ts);
        let reordered = self.window.len() - split;

        let (placement, kind) = match split.checked_sub(1) {
            None => (
                Placement::Insert {
                    index: 0,
                    timestamps: vec![ts],
                },
                PushKind::Direct,
            ),
            Some(anchor_idx) => {
                let anchor = self.window[anchor_idx].ts;
                let delta = (ts - anchor).num_milliseconds();
                if delta >= self.threshold_ms() {
                    (
                        Placement::Insert {
                            index: split,
                            timestamps: vec![ts],
                        },
                        PushKind::Direct,
                    )
                } else {
                    let steps = delta / self.interval_ms;
                    if delta == 0 {
                        (Placement::Overwrite { index: anchor_idx }, PushKind::Overwrite)
                    } else if steps == 0 {
                        (Placement::Skip, PushKind::Dropped)
                    } else {
                        let timestamps: Vec<DateTime<Utc>> = (1..=steps)
                            .map(|k| anchor + TimeDelta::milliseconds(k * self.interval_ms))
                            .collect();
                        let count = timestamps.len();
                        (
                            Placement::Insert {
                                index: split,
                                timestamps,
                            },
                            PushKind::Fill { count },
                        )
                    }
                }
            }
        };

        let snapshot = Arc::new(snapshot);
        let payloads = snapshot
            .iter()
            .map(|(sym, o)| Ok((sym, encode_payload(o)?)))
            .collect::<Result<Vec<_>, QuoterollError>>()?;

        let (insert_at, placed): (usize, Vec<DateTime<Utc>>) = match &placement {
            Placement::Skip => (self.window.len(), Vec::new()),
            Placement::Overwrite { index } => (self.window.len(), vec![self.window[*index].ts]),
            Placement::Insert { index, timestamps } => (*index, timestamps.clone()),
        };
        let inserted = match &placement {
            Placement::Skip | Placement::Overwrite { .. } => 0,
            Placement::Insert { timestamps, .. } => timestamps.len(),
        };

        let mut ops: Vec<PersistOp> = Vec::with_capacity(placed.len() * payloads.len());
        for t in &placed {
            for (sym, payload) in &payloads {
                ops.push(PersistOp::Upsert {
                    key: RowKey::new((*sym).clone(), self.granularity, *t),
                    payload: payload.clone(),
                });
            }
        }

        // Positions below refer to the window as it will look after insertion.
        let evict = (self.window.len() + inserted).saturating_sub(self.capacity);
        let mut evicted = Vec::with_capacity(evict);
        for pos in 0..evict {
            let (ets, esnap): (DateTime<Utc>, &Snapshot) = if pos < insert_at {
                let e = &self.window[pos];
                (e.ts, &*e.snapshot)
            } else if pos < insert_at + inserted {
                (placed[pos - insert_at], &*snapshot)
            } else {
                let e = &self.window[pos - inserted];
                (e.ts, &*e.snapshot)
            };
            for sym in esnap.keys() {
                ops.push(PersistOp::Delete {
                    key: RowKey::new(sym.clone(), self.granularity, ets),
                });
            }
            evicted.push(ets);
        }

        Ok(PushPlan {
            revision: self.revision,
            snapshot,
            placement,
            kind,
            reordered,
            evicted,
            ops,
        })
    }

    /// Apply a plan produced by [`plan_push`](Self::plan_push).
    ///
    /// # Errors
    /// Returns `StalePlan` if the buffer was committed to after the plan was made.
    pub fn commit(&mut self, plan: PushPlan) -> Result<PushOutcome, QuoterollError> {
        if plan.revision != self.revision {
            return Err(QuoterollError::StalePlan);
        }
        let PushPlan {
            snapshot,
            placement,
            kind,
            reordered,
            evicted,
            ..
        } = plan;

        let placed = match placement {
            Placement::Skip => {
                return Ok(PushOutcome {
                    kind,
                    placed: Vec::new(),
                    reordered,
                    evicted,
                });
            }
            Placement::Overwrite { index } => {
                let entry = self
                    .window
                    .get_mut(index)
                    .ok_or(QuoterollError::StalePlan)?;
                entry.snapshot = Arc::clone(&snapshot);
                vec![entry.ts]
            }
            Placement::Insert { index, timestamps } => {
                for (offset, ts) in timestamps.iter().enumerate() {
                    self.window.insert(
                        index + offset,
                        WindowEntry {
                            ts: *ts,
                            snapshot: Arc::clone(&snapshot),
                        },
                    );
                }
                timestamps
            }
        };
        // Synthetic duplicates carry the same reading; fold it once.
        self.observe(&snapshot);

        for _ in 0..evicted.len() {
            self.window.pop_front();
        }
        self.revision = self.revision.wrapping_add(1);

        #[cfg(feature = "tracing")]
        if !evicted.is_empty() {
            tracing::trace!(
                granularity = %self.granularity,
                evicted = evicted.len(),
                len = self.window.len(),
                "evicted oldest entries beyond capacity"
            );
        }

        Ok(PushOutcome {
            kind,
            placed,
            reordered,
            evicted,
        })
    }

    /// Plan and commit in one step, returning the batch the caller must persist.
    ///
    /// Prefer [`plan_push`](Self::plan_push) + [`commit`](Self::commit) when the
    /// batch should be accepted by the store before memory changes.
    ///
    /// # Errors
    /// Returns `Serialization` if a reading cannot be encoded.
    pub fn push(
        &mut self,
        snapshot: Snapshot,
        ts: DateTime<Utc>,
    ) -> Result<(Vec<PersistOp>, PushOutcome), QuoterollError> {
        let mut plan = self.plan_push(snapshot, ts)?;
        let ops = plan.take_ops();
        let outcome = self.commit(plan)?;
        Ok((ops, outcome))
    }

    /// Roll the trailing `lookback` entries up into one aggregate per symbol and
    /// reset the running extrema.
    ///
    /// Open comes from the entry `lookback` positions from the end (or the oldest
    /// entry when fewer are held), close and volume from the newest entry, and
    /// high/low from the extrema accumulated since the previous extract. A symbol
    /// with no accumulated extrema falls back to the extrema of the lookback
    /// slice. Symbols missing from the newest entry are skipped.
    ///
    /// # Errors
    /// Returns `EmptyWindow` when the buffer holds no entries.
    pub fn extract(&mut self) -> Result<Snapshot, QuoterollError> {
        let Some(close) = self.window.back() else {
            return Err(QuoterollError::EmptyWindow {
                granularity: self.granularity,
            });
        };
        let open_idx = self.window.len().saturating_sub(self.lookback);
        let open = &self.window[open_idx];

        let mut out = Snapshot::new();
        for (sym, o) in open.snapshot.iter() {
            let Some(c) = close.snapshot.get(sym) else {
                continue;
            };
            let ext = match self.extrema.get(sym) {
                Some(e) if !e.is_neutral() => *e,
                _ => self.slice_extrema(sym, open_idx),
            };
            out.insert(
                sym.clone(),
                Ohlcv {
                    open: o.open,
                    close: c.close,
                    high: ext.high,
                    low: ext.low,
                    volume: c.volume,
                },
            );
        }
        self.extrema.clear();
        Ok(out)
    }

    fn slice_extrema(&self, symbol: &Symbol, from: usize) -> Extrema {
        let mut ext = Extrema::NEUTRAL;
        for e in self.window.range(from..) {
            if let Some(o) = e.snapshot.get(symbol) {
                ext.observe(o);
            }
        }
        ext
    }

    fn observe(&mut self, snapshot: &Snapshot) {
        for (sym, o) in snapshot {
            self.extrema.entry(sym.clone()).or_default().observe(o);
        }
    }
}
