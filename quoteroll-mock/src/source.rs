use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use quoteroll_core::connector::QuoteSource;
use quoteroll_core::{Ohlcv, PricePoint, QuoterollError, Snapshot, Symbol};

use crate::MockBehavior;

#[derive(Default)]
struct InternalState {
    script: VecDeque<MockBehavior<Snapshot>>,
    fetches: u64,
    requests: Vec<Vec<Symbol>>,
}

/// Controller handle used by tests to drive and inspect a [`MockSource`].
#[derive(Clone)]
pub struct MockSourceController {
    state: Arc<Mutex<InternalState>>,
}

impl MockSourceController {
    /// Queue behaviors for the next fetches, one per call. Once the queue is
    /// drained the source falls back to its generated price walk.
    pub async fn script(&self, behaviors: impl IntoIterator<Item = MockBehavior<Snapshot>>) {
        let mut guard = self.state.lock().await;
        guard.script.extend(behaviors);
    }

    /// Number of fetches served so far, including failed ones.
    pub async fn fetches(&self) -> u64 {
        self.state.lock().await.fetches
    }

    /// Symbols requested by each fetch, in call order.
    pub async fn requests(&self) -> Vec<Vec<Symbol>> {
        self.state.lock().await.requests.clone()
    }
}

/// Quote source that serves a deterministic walk: fetch `n` returns, for each
/// requested symbol, a flat bar priced `100 + (symbol index) + (n mod 7)/4`
/// stamped at `n` seconds with volume `n × 100`.
pub struct MockSource {
    name: &'static str,
    state: Arc<Mutex<InternalState>>,
}

impl MockSource {
    /// Create a new mock source and its controller.
    #[must_use]
    pub fn new_with_controller(name: &'static str) -> (Arc<dyn QuoteSource>, MockSourceController) {
        let state = Arc::new(Mutex::new(InternalState::default()));
        let controller = MockSourceController {
            state: Arc::clone(&state),
        };
        let me = Arc::new(Self { name, state });
        (me as Arc<dyn QuoteSource>, controller)
    }

    fn walk(n: u64, symbols: &[Symbol]) -> Snapshot {
        let step = Decimal::new(i64::try_from(n % 7).unwrap_or(0) * 25, 2);
        let time = i64::try_from(n).unwrap_or(i64::MAX).saturating_mul(1_000);
        symbols
            .iter()
            .zip(0i64..)
            .map(|(sym, i)| {
                let price = Decimal::from(100 + i) + step;
                let mut bar = Ohlcv::flat(price, time, n.saturating_mul(100));
                bar.open = PricePoint {
                    price: price - Decimal::new(10, 2),
                    time,
                };
                bar.low = bar.open.price;
                (sym.clone(), bar)
            })
            .collect()
    }
}

#[async_trait]
impl QuoteSource for MockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, symbols: &[Symbol]) -> Result<Snapshot, QuoterollError> {
        let (behavior, n) = {
            let mut guard = self.state.lock().await;
            guard.fetches += 1;
            guard.requests.push(symbols.to_vec());
            (guard.script.pop_front(), guard.fetches)
        };
        match behavior {
            Some(MockBehavior::Return(snapshot)) => Ok(snapshot),
            Some(MockBehavior::Delay(delay, snapshot)) => {
                tokio::time::sleep(delay).await;
                Ok(snapshot)
            }
            Some(MockBehavior::Fail(e)) => Err(e),
            Some(MockBehavior::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Ok(Self::walk(n, symbols)),
        }
    }
}
