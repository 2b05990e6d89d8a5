use std::time::Duration;

use quoteroll_core::{
    BackingStore, BackoffConfig, ConsistencyLevel, Granularity, PersistOp, QuoterollConfig,
    QuoterollError, RowKey, Symbol,
};
use quoteroll_middleware::{RetryingStore, StoreBuilder, TimeoutStore};
use quoteroll_mock::{MemoryStore, MockBehavior};

fn batch() -> Vec<PersistOp> {
    vec![PersistOp::Upsert {
        key: RowKey::new(
            Symbol::new("BA").unwrap(),
            Granularity::Fine,
            chrono::DateTime::from_timestamp(100, 0).unwrap(),
        ),
        payload: "{}".to_string(),
    }]
}

const fn quick_retry(max_attempts: u32) -> BackoffConfig {
    BackoffConfig {
        min_backoff_ms: 10,
        max_backoff_ms: 100,
        factor: 2,
        jitter_percent: 0,
        max_attempts,
    }
}

#[tokio::test(start_paused = true)]
async fn hanging_store_times_out() {
    let (raw, ctl) = MemoryStore::new_with_controller("mem");
    ctl.script([MockBehavior::Hang]).await;
    let store = TimeoutStore::new(raw, Duration::from_millis(250));

    let err = store
        .execute_batch(&batch(), ConsistencyLevel::Quorum)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        QuoterollError::StoreTimeout {
            store: "mem".into(),
            timeout_ms: 250
        }
    );
    assert!(ctl.rows().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_recovers_from_transient_failures() {
    let (raw, ctl) = MemoryStore::new_with_controller("mem");
    ctl.fail_next(2).await;
    let store = RetryingStore::new(raw, quick_retry(3));

    store
        .execute_batch(&batch(), ConsistencyLevel::Quorum)
        .await
        .unwrap();
    assert_eq!(ctl.attempts().await, 3);
    assert_eq!(ctl.rows().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_gives_up_after_max_attempts() {
    let (raw, ctl) = MemoryStore::new_with_controller("mem");
    ctl.fail_next(5).await;
    let store = RetryingStore::new(raw, quick_retry(2));

    let err = store
        .execute_batch(&batch(), ConsistencyLevel::Quorum)
        .await
        .unwrap_err();
    assert!(err.is_store_error());
    assert_eq!(ctl.attempts().await, 2);
}

#[tokio::test(start_paused = true)]
async fn non_store_errors_are_not_retried() {
    let (raw, ctl) = MemoryStore::new_with_controller("mem");
    ctl.script([MockBehavior::Fail(QuoterollError::Serialization("bad".into()))])
        .await;
    let store = RetryingStore::new(raw, quick_retry(5));

    assert!(
        store
            .execute_batch(&batch(), ConsistencyLevel::Quorum)
            .await
            .is_err()
    );
    assert_eq!(ctl.attempts().await, 1);
}

#[tokio::test(start_paused = true)]
async fn config_stack_bounds_each_attempt() {
    let (raw, ctl) = MemoryStore::new_with_controller("mem");
    ctl.script([MockBehavior::Hang]).await;
    let cfg = QuoterollConfig {
        store_timeout: Some(Duration::from_millis(100)),
        store_retry: Some(quick_retry(3)),
        ..QuoterollConfig::default()
    };
    let builder = StoreBuilder::from_config(raw, &cfg);
    let names: Vec<_> = builder.describe().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["RetryingStore", "TimeoutStore", "RawStore"]);

    let store = builder.build();
    store
        .execute_batch(&batch(), ConsistencyLevel::Quorum)
        .await
        .unwrap();
    assert_eq!(ctl.attempts().await, 2);
}

#[test]
fn layers_are_replaced_not_duplicated() {
    let (raw, _ctl) = MemoryStore::new_with_controller("mem");
    let b = StoreBuilder::new(raw)
        .with_timeout(Duration::from_secs(1))
        .with_timeout(Duration::from_secs(2));
    let described = b.describe();
    assert_eq!(described.len(), 2);
    assert_eq!(described[0].1["timeout_ms"], 2_000);
}
