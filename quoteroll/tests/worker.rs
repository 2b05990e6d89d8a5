use std::time::Duration;

use chrono::{DateTime, Utc};
use quoteroll::{
    BufferWorker, ConsistencyLevel, Granularity, Ohlcv, QuoterollError, Snapshot, Symbol,
    TierConfig,
};
use quoteroll_core::TimeSeriesBuffer;
use quoteroll_mock::{MemoryStore, MockBehavior};
use rust_decimal::Decimal;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn snap(price: i64) -> Snapshot {
    let mut s = Snapshot::new();
    s.insert(
        Symbol::new("BA").unwrap(),
        Ohlcv::flat(Decimal::from(price), 0, 1),
    );
    s
}

fn fine_buffer(capacity: usize) -> TimeSeriesBuffer {
    TimeSeriesBuffer::new(
        Granularity::Fine,
        TierConfig {
            interval: Duration::from_secs(1),
            capacity,
        },
        10,
        60,
    )
    .unwrap()
}

#[tokio::test]
async fn rejected_batch_leaves_buffer_and_store_unchanged() {
    let (store, ctl) = MemoryStore::new_with_controller("mem");
    let (buf, _join) = BufferWorker::spawn(fine_buffer(10), store, ConsistencyLevel::Quorum, 8);

    buf.push(snap(1), at(100)).await.unwrap();
    ctl.fail_next(1).await;
    let err = buf.push(snap(2), at(103)).await.unwrap_err();
    assert!(err.is_store_error());

    let view = buf.view(10).await.unwrap();
    assert_eq!(view.len, 1);
    assert_eq!(view.entries[0].ts, at(100));
    assert_eq!(
        ctl.timestamps(&Symbol::new("BA").unwrap(), Granularity::Fine)
            .await,
        vec![at(100)]
    );

    let stats = buf.stats().await.unwrap();
    assert_eq!(stats.pushes, 1);
    assert_eq!(stats.failed_batches, 1);

    // the same push succeeds once the store recovers
    buf.push(snap(2), at(103)).await.unwrap();
    assert_eq!(buf.view(10).await.unwrap().len, 4);
}

#[tokio::test]
async fn evictions_reach_the_store() {
    let (store, ctl) = MemoryStore::new_with_controller("mem");
    let (buf, _join) = BufferWorker::spawn(fine_buffer(3), store, ConsistencyLevel::Quorum, 8);
    for t in 0..6 {
        buf.push(snap(1), at(t)).await.unwrap();
    }
    let stored = ctl
        .timestamps(&Symbol::new("BA").unwrap(), Granularity::Fine)
        .await;
    assert_eq!(stored, vec![at(3), at(4), at(5)]);
    let stats = buf.stats().await.unwrap();
    assert_eq!(stats.evicted, 3);
    assert_eq!(stats.ops_written, 9);
    assert!(
        ctl.batches()
            .await
            .iter()
            .all(|b| b.consistency == ConsistencyLevel::Quorum)
    );
}

#[tokio::test]
async fn concurrent_pushes_keep_the_window_ordered() {
    let (store, _ctl) = MemoryStore::new_with_controller("mem");
    let (buf, _join) = BufferWorker::spawn(fine_buffer(1_000), store, ConsistencyLevel::Quorum, 4);

    let mut tasks = Vec::new();
    for lane in 0..2i64 {
        let buf = buf.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..50i64 {
                buf.push(snap(i), at(1_000 + 2 * i + lane)).await.unwrap();
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    let view = buf.view(1_000).await.unwrap();
    let ts: Vec<_> = view.entries.iter().map(|e| e.ts).collect();
    assert!(ts.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ts.first(), Some(&at(1_000)));
    assert_eq!(ts.last(), Some(&at(1_099)));
}

#[tokio::test]
async fn empty_snapshot_commits_without_a_batch() {
    let (store, ctl) = MemoryStore::new_with_controller("mem");
    let (buf, _join) = BufferWorker::spawn(fine_buffer(10), store, ConsistencyLevel::One, 8);
    buf.push(Snapshot::new(), at(5)).await.unwrap();
    assert_eq!(ctl.attempts().await, 0);
    assert_eq!(buf.view(1).await.unwrap().len, 1);
}

#[tokio::test]
async fn extract_on_empty_buffer_reports_granularity() {
    let (store, _ctl) = MemoryStore::new_with_controller("mem");
    let (buf, _join) = BufferWorker::spawn(fine_buffer(10), store, ConsistencyLevel::Quorum, 8);
    assert_eq!(
        buf.extract().await,
        Err(QuoterollError::EmptyWindow {
            granularity: Granularity::Fine
        })
    );
}

#[tokio::test]
async fn closed_worker_is_reported() {
    let (store, _ctl) = MemoryStore::new_with_controller("mem");
    let (buf, join) = BufferWorker::spawn(fine_buffer(10), store, ConsistencyLevel::Quorum, 8);
    join.abort();
    let _ = join.await;
    assert_eq!(
        buf.push(snap(1), at(1)).await,
        Err(QuoterollError::WorkerClosed {
            granularity: Granularity::Fine
        })
    );
}

#[tokio::test]
async fn worker_returns_stats_when_handles_drop() {
    let (store, _ctl) = MemoryStore::new_with_controller("mem");
    let (buf, join) = BufferWorker::spawn(fine_buffer(10), store, ConsistencyLevel::Quorum, 8);
    buf.push(snap(1), at(1)).await.unwrap();
    drop(buf);
    let stats = join.await.unwrap();
    assert_eq!(stats.pushes, 1);
}

#[tokio::test(start_paused = true)]
async fn reads_are_served_while_a_batch_is_in_flight() {
    let (store, ctl) = MemoryStore::new_with_controller("mem");
    let (buf, _join) = BufferWorker::spawn(fine_buffer(10), store, ConsistencyLevel::Quorum, 8);
    buf.push(snap(1), at(100)).await.unwrap();
    ctl.script([MockBehavior::Delay(Duration::from_secs(30), ())]).await;

    let slow = tokio::spawn({
        let buf = buf.clone();
        async move { buf.push(snap(2), at(101)).await }
    });
    let queued = tokio::spawn({
        let buf = buf.clone();
        async move { buf.push(snap(3), at(102)).await }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    // the slow batch is still running; reads answer without waiting for it
    let view = tokio::time::timeout(Duration::from_secs(1), buf.view(10))
        .await
        .expect("view answered during the batch")
        .unwrap();
    assert_eq!(view.len, 1);
    let bar = tokio::time::timeout(Duration::from_secs(1), buf.extract())
        .await
        .expect("extract answered during the batch")
        .unwrap();
    assert_eq!(bar[&Symbol::new("BA").unwrap()].close.price, Decimal::from(1));
    assert_eq!(buf.stats().await.unwrap().pushes, 1);
    assert!(!queued.is_finished());

    slow.await.unwrap().unwrap();
    queued.await.unwrap().unwrap();
    let view = buf.view(10).await.unwrap();
    let ts: Vec<_> = view.entries.iter().map(|e| e.ts).collect();
    assert_eq!(ts, vec![at(100), at(101), at(102)]);
    assert_eq!(
        ctl.timestamps(&Symbol::new("BA").unwrap(), Granularity::Fine)
            .await,
        ts
    );
}
