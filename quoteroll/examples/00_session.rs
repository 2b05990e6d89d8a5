use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quoteroll::{Granularity, Quoteroll, QuoterollConfig, TierConfig};
use quoteroll_mock::{FixedCalendar, MemoryStore, MockSource};
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Suggested: RUST_LOG=info,quoteroll=debug (build with --features tracing)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .try_init();

    // A compressed day: 100ms / 1s / 2s tiers over 4 seconds
    let mut cfg = QuoterollConfig {
        symbols: ["BA", "CRM", "CVS", "DIS", "MS", "JPM", "WMT", "V", "VMW", "VZ"]
            .map(String::from)
            .to_vec(),
        fine: TierConfig {
            interval: Duration::from_millis(100),
            capacity: 200,
        },
        medium: TierConfig {
            interval: Duration::from_secs(1),
            capacity: 200,
        },
        coarse: TierConfig {
            interval: Duration::from_secs(2),
            capacity: 20,
        },
        lookback: 10,
        store_timeout: Some(Duration::from_millis(500)),
        ..QuoterollConfig::default()
    };
    cfg.session.duration = Duration::from_secs(4);

    let (source, _source_ctl) = MockSource::new_with_controller("mock");
    let (store, store_ctl) = MemoryStore::new_with_controller("memory");
    let today = Utc::now().date_naive();

    let app = Quoteroll::builder()
        .source(source)
        .store(store)
        .calendar(Arc::new(FixedCalendar::open_on([today])))
        .config(cfg)
        .build()?;

    if let Some(session) = app.run_day_at(today, Utc::now())?.into_session() {
        let report = session.join().await;
        for (label, r) in &report.tickers {
            println!("{label:>8}: fired {:>3}, failed {}", r.fired, r.failed);
        }
    }

    for g in Granularity::ALL {
        let view = app.pipeline().buffer(g).view(3).await?;
        println!("{g}: {} entries", view.len);
        for entry in &view.entries {
            if let Some(bar) = entry.snapshot.values().next() {
                println!(
                    "  {} open {} high {} low {} close {}",
                    entry.ts, bar.open.price, bar.high, bar.low, bar.close.price
                );
            }
        }
    }
    println!("store rows: {}", store_ctl.rows().await.len());

    for (g, stats) in app.shutdown().await {
        println!("{g}: {stats:?}");
    }
    Ok(())
}
