use std::time::Duration;

use chrono::{DateTime, Utc};
use quoteroll_core::persist::decode_payload;
use quoteroll_core::{
    Granularity, Ohlcv, PersistOp, PushKind, Snapshot, Symbol, TierConfig, TimeSeriesBuffer,
};
use rust_decimal::Decimal;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

fn snap(prices: &[(&str, i64)]) -> Snapshot {
    prices
        .iter()
        .map(|(s, p)| (sym(s), Ohlcv::flat(Decimal::from(*p), 0, 100)))
        .collect()
}

fn fine(capacity: usize) -> TimeSeriesBuffer {
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

fn upserts_at(ops: &[PersistOp]) -> Vec<DateTime<Utc>> {
    ops.iter()
        .filter(|op| !op.is_delete())
        .map(|op| op.key().ts)
        .collect()
}

fn deletes_at(ops: &[PersistOp]) -> Vec<(String, DateTime<Utc>)> {
    ops.iter()
        .filter(|op| op.is_delete())
        .map(|op| (op.key().symbol.to_string(), op.key().ts))
        .collect()
}

#[test]
fn evict_then_late_overwrite_keeps_order() {
    let mut buf = fine(5);
    for t in 100..=104 {
        let (ops, outcome) = buf.push(snap(&[("BA", 10)]), at(t)).unwrap();
        assert!(outcome.evicted.is_empty());
        assert_eq!(upserts_at(&ops), vec![at(t)]);
    }
    assert_eq!(buf.timestamps(), (100..=104).map(at).collect::<Vec<_>>());

    let (ops, outcome) = buf.push(snap(&[("BA", 11)]), at(105)).unwrap();
    assert_eq!(outcome.evicted, vec![at(100)]);
    assert_eq!(deletes_at(&ops), vec![("BA".to_string(), at(100))]);
    assert_eq!(buf.timestamps(), (101..=105).map(at).collect::<Vec<_>>());

    let (ops, outcome) = buf.push(snap(&[("BA", 99)]), at(103)).unwrap();
    assert_eq!(outcome.kind, PushKind::Overwrite);
    assert_eq!(outcome.reordered, 2);
    assert!(outcome.evicted.is_empty());
    assert_eq!(ops.len(), 1);
    let PersistOp::Upsert { key, payload } = &ops[0] else {
        panic!("expected upsert");
    };
    assert_eq!(key.ts, at(103));
    assert_eq!(decode_payload(payload).unwrap().close.price, Decimal::from(99));

    assert_eq!(buf.timestamps(), (101..=105).map(at).collect::<Vec<_>>());
    let replaced = buf.get(at(103)).unwrap();
    assert_eq!(replaced.snapshot[&sym("BA")].close.price, Decimal::from(99));
    assert_eq!(
        buf.get(at(105)).unwrap().snapshot[&sym("BA")].close.price,
        Decimal::from(11)
    );
    assert_eq!(buf.extrema(&sym("BA")).high, Decimal::from(99));
}

#[test]
fn spaced_pushes_fill_to_capacity_without_gaps() {
    let mut buf = fine(7);
    for (n, t) in (1..=20).zip(1_000..) {
        buf.push(snap(&[("BA", 10)]), at(t)).unwrap();
        assert_eq!(buf.len(), n.min(7));
    }
    let ts = buf.timestamps();
    assert!(ts.windows(2).all(|w| (w[1] - w[0]).num_seconds() == 1));
}

#[test]
fn late_push_round_trips() {
    let mut buf = fine(10);
    for t in 100..=104 {
        buf.push(snap(&[("BA", t)]), at(t)).unwrap();
    }
    let before: Vec<_> = buf.entries().cloned().collect();
    let original = (*buf.get(at(102)).unwrap().snapshot).clone();

    buf.push(snap(&[("BA", -1)]), at(102)).unwrap();
    assert_ne!(buf.entries().cloned().collect::<Vec<_>>(), before);

    buf.push(original, at(102)).unwrap();
    assert_eq!(buf.entries().cloned().collect::<Vec<_>>(), before);
}

#[test]
fn short_gap_is_backfilled_with_duplicates() {
    for k in 1..=9 {
        let mut buf = fine(100);
        buf.push(snap(&[("BA", 10), ("JPM", 20)]), at(100)).unwrap();
        let (ops, outcome) = buf
            .push(snap(&[("BA", 12), ("JPM", 18)]), at(100 + k))
            .unwrap();

        let k_usize = usize::try_from(k).unwrap();
        assert_eq!(outcome.kind, PushKind::Fill { count: k_usize });
        assert_eq!(buf.len(), 1 + k_usize);
        assert_eq!(ops.len(), 2 * k_usize);
        assert_eq!(
            buf.timestamps(),
            (100..=100 + k).map(at).collect::<Vec<_>>()
        );
        for e in buf.entries().skip(1) {
            assert_eq!(e.snapshot[&sym("BA")].close.price, Decimal::from(12));
        }
        let ba = buf.extrema(&sym("BA"));
        assert_eq!((ba.high, ba.low), (Decimal::from(12), Decimal::from(10)));
    }
}

#[test]
fn long_gap_appends_single_entry() {
    for k in [10, 11, 500] {
        let mut buf = fine(100);
        buf.push(snap(&[("BA", 10)]), at(100)).unwrap();
        let (ops, outcome) = buf.push(snap(&[("BA", 10)]), at(100 + k)).unwrap();
        assert_eq!(outcome.kind, PushKind::Direct);
        assert_eq!(ops.len(), 1);
        assert_eq!(buf.timestamps(), vec![at(100), at(100 + k)]);
    }
}

#[test]
fn late_arrival_between_entries_backfills_below_newer_tail() {
    let mut buf = fine(100);
    buf.push(snap(&[("BA", 1)]), at(100)).unwrap();
    buf.push(snap(&[("BA", 2)]), at(105)).unwrap();
    buf.push(snap(&[("BA", 3)]), at(200)).unwrap();
    assert_eq!(buf.len(), 7);

    let (_, outcome) = buf.push(snap(&[("BA", 4)]), at(108)).unwrap();
    assert_eq!(outcome.kind, PushKind::Fill { count: 3 });
    assert_eq!(outcome.reordered, 1);
    let ts = buf.timestamps();
    assert!(ts.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ts.last(), Some(&at(200)));
    assert!(ts.contains(&at(106)) && ts.contains(&at(108)));
}

#[test]
fn arrival_older_than_window_is_inserted_first() {
    let mut buf = fine(100);
    buf.push(snap(&[("BA", 1)]), at(100)).unwrap();
    buf.push(snap(&[("BA", 2)]), at(101)).unwrap();
    let (ops, outcome) = buf.push(snap(&[("BA", 0)]), at(50)).unwrap();
    assert_eq!(outcome.kind, PushKind::Direct);
    assert_eq!(outcome.reordered, 2);
    assert_eq!(upserts_at(&ops), vec![at(50)]);
    assert_eq!(buf.timestamps(), vec![at(50), at(100), at(101)]);
}

#[test]
fn eviction_emits_one_delete_per_symbol_and_timestamp() {
    let mut buf = fine(3);
    for t in 0..3 {
        buf.push(snap(&[("BA", 1), ("CRM", 2)]), at(t)).unwrap();
    }
    let (ops, outcome) = buf.push(snap(&[("BA", 1), ("CRM", 2)]), at(5)).unwrap();
    assert_eq!(outcome.kind, PushKind::Fill { count: 3 });
    assert_eq!(outcome.evicted, vec![at(0), at(1), at(2)]);
    assert_eq!(buf.len(), 3);
    assert_eq!(deletes_at(&ops).len(), 6);
    // upserts precede deletes
    let first_delete = ops.iter().position(PersistOp::is_delete).unwrap();
    assert!(ops[first_delete..].iter().all(PersistOp::is_delete));
}

#[test]
fn fill_larger_than_capacity_deletes_its_own_slots() {
    let mut buf = fine(2);
    buf.push(snap(&[("BA", 1)]), at(0)).unwrap();
    let (ops, outcome) = buf.push(snap(&[("BA", 2)]), at(4)).unwrap();
    assert_eq!(outcome.placed, vec![at(1), at(2), at(3), at(4)]);
    assert_eq!(outcome.evicted, vec![at(0), at(1), at(2)]);
    assert_eq!(buf.timestamps(), vec![at(3), at(4)]);
    assert_eq!(upserts_at(&ops).len(), 4);
    assert_eq!(deletes_at(&ops).len(), 3);
}

#[test]
fn push_inside_the_same_interval_is_dropped() {
    let mut buf = TimeSeriesBuffer::new(
        Granularity::Medium,
        TierConfig {
            interval: Duration::from_secs(60),
            capacity: 10,
        },
        10,
        60,
    )
    .unwrap();
    buf.push(snap(&[("BA", 10)]), at(0)).unwrap();
    buf.extract().unwrap();

    let (ops, outcome) = buf.push(snap(&[("BA", 99)]), at(59)).unwrap();
    assert_eq!(outcome.kind, PushKind::Dropped);
    assert!(ops.is_empty());
    assert_eq!(buf.timestamps(), vec![at(0)]);
    let slot = &buf.get(at(0)).unwrap().snapshot[&sym("BA")];
    assert_eq!(slot.close.price, Decimal::from(10));
    assert!(buf.extrema(&sym("BA")).is_neutral());

    // one full interval later the reading lands normally
    let (ops, outcome) = buf.push(snap(&[("BA", 99)]), at(60)).unwrap();
    assert_eq!(outcome.kind, PushKind::Fill { count: 1 });
    assert_eq!(upserts_at(&ops), vec![at(60)]);
    assert_eq!(buf.extrema(&sym("BA")).high, Decimal::from(99));
}
