//! Criterion benchmarks for qfin hot paths.
//!
//! Benchmarks:
//! 1. Indicator cache population (cold engine, every built-in)
//! 2. Grid enumeration with warm and cold caches
//! 3. Ledger tick loop (advance + orders + wrap-up)
//! 4. Standalone indicator kernels

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use qfin_core::feed::synthetic;
use qfin_core::indicators::{bollinger, ema, rsi, sma};
use qfin_core::{
    IndicatorEngine, IndicatorOverrides, IndicatorRanges, LedgerConfig, ParamRanges, ParamSpec,
    PortfolioLedger, PriceFeed, TickWindow,
};

// ── Helpers ──────────────────────────────────────────────────────────

const INSTRUMENTS: [&str; 4] = ["AAA", "BBB", "CCC", "DDD"];

fn make_feed(ticks: usize) -> Arc<dyn PriceFeed> {
    Arc::new(synthetic(&INSTRUMENTS, ticks, 42).unwrap())
}

fn period_ranges(periods: &[i64]) -> IndicatorRanges {
    IndicatorRanges::from([(
        "sma".to_string(),
        ParamRanges::from([(
            "period".to_string(),
            ParamSpec::candidates(periods.iter().copied()),
        )]),
    )])
}

// ── 1. Cache population ──────────────────────────────────────────────

fn bench_cache_population(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_population");
    for ticks in [252, 2520] {
        let feed = make_feed(ticks);
        group.bench_with_input(BenchmarkId::from_parameter(ticks), &feed, |b, feed| {
            b.iter(|| {
                let mut engine = IndicatorEngine::with_builtins(feed.clone()).unwrap();
                engine.update_params(&IndicatorOverrides::new()).unwrap();
                black_box(engine.cached_blocks())
            })
        });
    }
    group.finish();
}

// ── 2. Grid enumeration ──────────────────────────────────────────────

fn bench_grid(c: &mut Criterion) {
    let feed = make_feed(1260);
    let ranges = period_ranges(&[5, 10, 20, 50, 100]);

    c.bench_function("grid_cold", |b| {
        b.iter(|| {
            let mut engine = IndicatorEngine::with_builtins(feed.clone()).unwrap();
            black_box(engine.enumerate_grid(&ranges).unwrap().len())
        })
    });

    let mut warm = IndicatorEngine::with_builtins(feed.clone()).unwrap();
    warm.enumerate_grid(&ranges).unwrap();
    c.bench_function("grid_warm", |b| {
        b.iter(|| black_box(warm.enumerate_grid(&ranges).unwrap().len()))
    });
}

// ── 3. Ledger tick loop ──────────────────────────────────────────────

fn bench_ledger(c: &mut Criterion) {
    let feed = make_feed(2520);
    let instruments: Vec<String> = INSTRUMENTS.iter().map(|s| s.to_string()).collect();

    c.bench_function("ledger_2520_ticks", |b| {
        b.iter(|| {
            let mut ledger =
                PortfolioLedger::new(&instruments, LedgerConfig::new(0.001, 100.0)).unwrap();
            for snap in feed.stream(TickWindow::full(feed.len())) {
                ledger.advance(&snap).unwrap();
                let t = snap.tick();
                for (i, inst) in INSTRUMENTS.iter().enumerate() {
                    if (t + i) % 7 == 0 {
                        ledger.order(inst, 5.0).unwrap();
                    } else if (t + i) % 11 == 0 {
                        ledger.order(inst, -8.0).unwrap();
                    }
                }
            }
            black_box(ledger.wrap_up().unwrap().total_realized())
        })
    });
}

// ── 4. Indicator kernels ─────────────────────────────────────────────

fn bench_kernels(c: &mut Criterion) {
    let feed = make_feed(2520);
    let close = feed.series("AAA").unwrap().close.clone();

    let mut group = c.benchmark_group("kernels");
    group.bench_function("sma_50", |b| b.iter(|| sma::sma(black_box(&close), 50)));
    group.bench_function("ema_50", |b| b.iter(|| ema::ema(black_box(&close), 50)));
    group.bench_function("rsi_14", |b| b.iter(|| rsi::rsi(black_box(&close), 14)));
    group.bench_function("bollinger_20", |b| {
        b.iter(|| bollinger::bands(black_box(&close), 20, 2.0))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_cache_population,
    bench_grid,
    bench_ledger,
    bench_kernels
);
criterion_main!(benches);
