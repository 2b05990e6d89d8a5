use std::time::Duration;

use chrono::{NaiveDate, Timelike};
use quoteroll::{Quoteroll, QuoterollConfig, QuoterollError, SessionConfig, TierConfig};
use quoteroll_mock::{MemoryStore, MockSource};

fn config() -> QuoterollConfig {
    QuoterollConfig {
        symbols: vec!["BA".into(), "CRM".into()],
        ..QuoterollConfig::default()
    }
}

#[tokio::test]
async fn missing_collaborators_are_config_errors() {
    let (store, _) = MemoryStore::new_with_controller("mem");
    let res = Quoteroll::builder().store(store).config(config()).build();
    assert!(matches!(res, Err(QuoterollError::Config(msg)) if msg.contains("source")));

    let (source, _) = MockSource::new_with_controller("mock");
    let res = Quoteroll::builder().source(source).config(config()).build();
    assert!(matches!(res, Err(QuoterollError::Config(msg)) if msg.contains("store")));
}

#[tokio::test]
async fn invalid_configuration_prevents_startup() {
    let (source, source_ctl) = MockSource::new_with_controller("mock");
    let (store, _) = MemoryStore::new_with_controller("mem");

    let res = Quoteroll::builder()
        .source(source.clone())
        .store(store.clone())
        .build();
    tokio_test::assert_err!(res.map(drop));

    let res = Quoteroll::builder()
        .source(source.clone())
        .store(store.clone())
        .symbols(["BA", "ba"])
        .build();
    assert!(matches!(res, Err(QuoterollError::Config(_))));

    let mut cfg = config();
    cfg.medium = TierConfig {
        interval: Duration::from_secs(70),
        capacity: 10,
    };
    let res = Quoteroll::builder()
        .source(source)
        .store(store)
        .config(cfg)
        .build();
    assert!(matches!(res, Err(QuoterollError::Config(_))));
    assert_eq!(source_ctl.fetches().await, 0);
}

#[tokio::test]
async fn session_open_uses_exchange_timezone() {
    let (source, _) = MockSource::new_with_controller("mock");
    let (store, _) = MemoryStore::new_with_controller("mem");
    let app = tokio_test::assert_ok!(
        Quoteroll::builder()
            .source(source.clone())
            .store(store.clone())
            .config(config())
            .build()
    );
    // EDT in July, EST in January
    let summer = app
        .session_open(NaiveDate::from_ymd_opt(2024, 7, 3).unwrap())
        .unwrap();
    assert_eq!(summer.hour(), 13);
    assert_eq!(summer.minute(), 30);
    let winter = app
        .session_open(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
        .unwrap();
    assert_eq!(winter.hour(), 14);

    let mut cfg = config();
    cfg.session = SessionConfig {
        timezone: chrono_tz::Europe::London,
        ..SessionConfig::default()
    };
    let london = Quoteroll::builder()
        .source(source)
        .store(store)
        .config(cfg)
        .build()
        .unwrap();
    let open = london
        .session_open(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
        .unwrap();
    assert_eq!(open.hour(), 9);
}

#[test]
fn config_loads_from_json() {
    let cfg = QuoterollConfig::from_json_str(
        r#"{ "symbols": ["BA", "VZ"], "lookback": 30, "consistency": "LocalQuorum" }"#,
    )
    .unwrap();
    assert_eq!(cfg.lookback, 30);
    assert_eq!(cfg.fine_workers, 2);
    assert!(cfg.validate().is_ok());
}
