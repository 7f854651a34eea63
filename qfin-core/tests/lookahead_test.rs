//! Look-ahead contamination tests.
//!
//! Invariant: nothing visible at tick t may depend on data from tick t+1 or
//! later.
//!
//! Two checks:
//! 1. Price and indicator snapshots at tick t never expose more than t+1 values.
//! 2. Every built-in indicator computed on a truncated feed (ticks 0..100)
//!    matches the same indicator computed on the full feed (ticks 0..200).

use std::sync::Arc;

use qfin_core::feed::synthetic;
use qfin_core::indicators::{IndicatorOverrides, SnapshotEntry};
use qfin_core::{IndicatorEngine, MarketData, Measurement, PriceFeed, TickWindow};

const INSTRUMENTS: [&str; 3] = ["AAA", "BBB", "CCC"];

fn truncated(data: &MarketData, len: usize) -> MarketData {
    let series = data
        .instruments()
        .iter()
        .map(|i| {
            let s = data.series(i).unwrap();
            let cut = |v: &Vec<f64>| v[..len].to_vec();
            let truncated = qfin_core::feed::InstrumentSeries {
                open: cut(&s.open),
                high: cut(&s.high),
                low: cut(&s.low),
                close: cut(&s.close),
                volume: cut(&s.volume),
            };
            (i.clone(), truncated)
        })
        .collect();
    MarketData::new(data.dates()[..len].to_vec(), series).unwrap()
}

fn cached_engine(feed: Arc<dyn PriceFeed>) -> IndicatorEngine {
    let mut engine = IndicatorEngine::with_builtins(feed).unwrap();
    let overrides = IndicatorOverrides::from([
        ("sma".to_string(), qfin_core::Params::new().with("period", 10)),
        ("rsi".to_string(), qfin_core::Params::new().with("period", 7)),
    ]);
    engine.update_params(&overrides).unwrap();
    engine
}

fn assert_same(a: f64, b: f64, context: &str) {
    if a.is_nan() || b.is_nan() {
        assert!(a.is_nan() && b.is_nan(), "{context}: {a} vs {b}");
    } else {
        assert!((a - b).abs() < 1e-12, "{context}: {a} vs {b}");
    }
}

#[test]
fn price_snapshots_never_extend_past_tick() {
    let feed: Arc<dyn PriceFeed> = Arc::new(synthetic(&INSTRUMENTS, 60, 3).unwrap());
    for snap in feed.stream(TickWindow::full(feed.len())) {
        for inst in INSTRUMENTS {
            for m in Measurement::ALL {
                let window = snap.history(inst, m).unwrap();
                assert_eq!(window.len(), snap.tick() + 1);
            }
            assert_eq!(
                snap.close(inst),
                snap.history(inst, Measurement::Close).unwrap().last().copied()
            );
        }
    }
}

#[test]
fn indicator_snapshots_never_extend_past_tick() {
    let feed: Arc<dyn PriceFeed> = Arc::new(synthetic(&INSTRUMENTS, 60, 4).unwrap());
    let engine = cached_engine(feed.clone());
    let resolved = engine.resolve(&IndicatorOverrides::new()).unwrap();
    let view = engine.view(&resolved).unwrap();

    for snap in view.stream_all() {
        let names: Vec<&str> = snap.output_names().collect();
        assert!(!names.is_empty());
        for name in names {
            match snap.get(name).unwrap() {
                SnapshotEntry::PerInstrument(w) => {
                    for (_, values) in w.iter() {
                        assert_eq!(values.len(), snap.tick() + 1);
                    }
                }
                SnapshotEntry::Joint(values) => assert_eq!(values.len(), snap.tick() + 1),
            }
        }
    }
}

#[test]
fn builtins_do_not_leak_future_data() {
    let full_data = synthetic(&INSTRUMENTS, 200, 11).unwrap();
    let short_data = truncated(&full_data, 100);

    let full = cached_engine(Arc::new(full_data));
    let short = cached_engine(Arc::new(short_data));

    let resolved = full.resolve(&IndicatorOverrides::new()).unwrap();
    assert_eq!(resolved, short.resolve(&IndicatorOverrides::new()).unwrap());

    let full_view = full.view(&resolved).unwrap();
    let short_view = short.view(&resolved).unwrap();
    let full_snap = full_view.at(99);
    let short_snap = short_view.at(99);

    for name in full_snap.output_names() {
        match (full_snap.get(name).unwrap(), short_snap.get(name).unwrap()) {
            (SnapshotEntry::PerInstrument(a), SnapshotEntry::PerInstrument(b)) => {
                for inst in INSTRUMENTS {
                    let (a, b) = (a.get(inst).unwrap(), b.get(inst).unwrap());
                    assert_eq!(a.len(), 100);
                    for t in 0..100 {
                        assert_same(a[t], b[t], &format!("{name}/{inst} tick {t}"));
                    }
                }
            }
            (SnapshotEntry::Joint(a), SnapshotEntry::Joint(b)) => {
                for t in 0..100 {
                    assert_same(a[t], b[t], &format!("{name} tick {t}"));
                }
            }
            _ => panic!("classification differs for {name}"),
        }
    }
}

#[test]
fn cached_arrays_cover_every_tick() {
    let feed: Arc<dyn PriceFeed> = Arc::new(synthetic(&INSTRUMENTS, 40, 5).unwrap());
    let engine = cached_engine(feed);
    let resolved = engine.resolve(&IndicatorOverrides::new()).unwrap();
    let view = engine.view(&resolved).unwrap();
    let last = view.at(39);
    for name in last.output_names() {
        match last.get(name).unwrap() {
            SnapshotEntry::PerInstrument(w) => assert_eq!(w.iter().count(), INSTRUMENTS.len()),
            SnapshotEntry::Joint(values) => assert_eq!(values.len(), 40),
        }
    }
}
