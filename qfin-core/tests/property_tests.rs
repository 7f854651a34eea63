//! Property tests for ledger and parameter invariants.
//!
//! Uses proptest to verify:
//! 1. Position limit: |delta| never exceeds the limit, and rejected orders
//!    leave the ledger untouched
//! 2. Wrap-up: every position ends flat and per-trade realized P&L sums to
//!    the ledger total
//! 3. Fees: fees paid always equal fee rate times traded notional
//! 4. Grid size: expansion yields the product of distinct candidate counts

use proptest::prelude::*;
use std::sync::Arc;

use qfin_core::feed::synthetic;
use qfin_core::params::expand_grid;
use qfin_core::{LedgerConfig, ParamRanges, ParamSpec, Params, PortfolioLedger, PriceFeed, TickWindow};

const INSTRUMENTS: [&str; 2] = ["AAA", "BBB"];

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_orders(ticks: usize) -> impl Strategy<Value = Vec<(usize, usize, f64)>> {
    prop::collection::vec(
        (0..ticks, 0..INSTRUMENTS.len(), -15.0..15.0_f64),
        0..40,
    )
    .prop_map(|mut orders| {
        orders.sort_by_key(|(tick, _, _)| *tick);
        orders
    })
}

fn arb_fee() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), 0.0..0.01_f64]
}

fn instruments() -> Vec<String> {
    INSTRUMENTS.iter().map(|s| s.to_string()).collect()
}

/// Replay `orders` over a synthetic feed, checking the limit after every call.
fn replay(
    seed: u64,
    fee: f64,
    limit: f64,
    orders: &[(usize, usize, f64)],
) -> Result<PortfolioLedger, TestCaseError> {
    const TICKS: usize = 30;
    let feed: Arc<dyn PriceFeed> = Arc::new(synthetic(&INSTRUMENTS, TICKS, seed).unwrap());
    let mut ledger = PortfolioLedger::new(&instruments(), LedgerConfig::new(fee, limit)).unwrap();

    let mut pending = orders.iter().peekable();
    for snap in feed.stream(TickWindow::full(TICKS)) {
        ledger.advance(&snap).unwrap();
        while let Some((_, idx, qty)) = pending.next_if(|(t, _, _)| *t == snap.tick()) {
            let inst = INSTRUMENTS[*idx];
            let before_delta = ledger.delta(inst);
            let before_fees = ledger.fees_paid(inst);
            let before_trades = ledger.trades().len();

            let filled = ledger.order(inst, *qty).unwrap();
            if filled {
                prop_assert_eq!(ledger.trades().len(), before_trades + 1);
            } else {
                prop_assert_eq!(ledger.delta(inst), before_delta);
                prop_assert_eq!(ledger.fees_paid(inst), before_fees);
                prop_assert_eq!(ledger.trades().len(), before_trades);
            }
            for i in INSTRUMENTS {
                prop_assert!(ledger.delta(i).abs() <= limit + 1e-9);
            }
        }
    }
    Ok(ledger)
}

// ── 1. Position Limit ────────────────────────────────────────────────

proptest! {
    /// No order sequence can push a position past its limit.
    #[test]
    fn limit_is_never_breached(
        seed in 0..1000_u64,
        fee in arb_fee(),
        limit in 1.0..20.0_f64,
        orders in arb_orders(30),
    ) {
        replay(seed, fee, limit, &orders)?;
    }
}

// ── 2. Wrap-up ───────────────────────────────────────────────────────

proptest! {
    /// After wrap-up every instrument is flat and trades reconcile with
    /// the realized totals.
    #[test]
    fn wrap_up_flattens_and_reconciles(
        seed in 0..1000_u64,
        fee in arb_fee(),
        orders in arb_orders(30),
    ) {
        let mut ledger = replay(seed, fee, 10.0, &orders)?;
        let out = ledger.wrap_up().unwrap();

        for inst in INSTRUMENTS {
            prop_assert_eq!(ledger.delta(inst), 0.0);
            let summed: f64 = out
                .trades
                .iter()
                .filter(|t| t.instrument == inst)
                .map(|t| t.realized)
                .sum();
            prop_assert!((summed - out.realized[inst]).abs() < 1e-6);
            prop_assert_eq!(out.values[inst].len(), 30);
        }
        prop_assert!(ledger.is_closed());
    }
}

// ── 3. Fees ──────────────────────────────────────────────────────────

proptest! {
    /// Fees paid equal the fee rate on every executed notional.
    #[test]
    fn fees_match_traded_notional(
        seed in 0..1000_u64,
        fee in 0.0..0.01_f64,
        orders in arb_orders(30),
    ) {
        let mut ledger = replay(seed, fee, 10.0, &orders)?;
        let out = ledger.wrap_up().unwrap();

        for inst in INSTRUMENTS {
            let notional: f64 = out
                .trades
                .iter()
                .filter(|t| t.instrument == inst)
                .map(|t| t.notional())
                .sum();
            prop_assert!((out.fees_paid[inst] - fee * notional).abs() < 1e-6);
        }
    }

    /// With a zero fee, round trips realize exactly the price difference.
    #[test]
    fn fee_free_round_trip_is_price_difference(
        seed in 0..1000_u64,
        qty in 0.5..10.0_f64,
        exit in 1..30_usize,
    ) {
        let feed: Arc<dyn PriceFeed> = Arc::new(synthetic(&INSTRUMENTS, 30, seed).unwrap());
        let mut ledger = PortfolioLedger::new(&instruments(), LedgerConfig::new(0.0, 10.0)).unwrap();
        ledger.advance(&feed.snapshot(0)).unwrap();
        prop_assert!(ledger.order("AAA", qty).unwrap());
        ledger.advance(&feed.snapshot(exit)).unwrap();
        prop_assert!(ledger.flatten("AAA").unwrap());

        let close = feed.column("AAA", qfin_core::Measurement::Close).unwrap();
        let expected = qty * (close[exit] - close[0]);
        prop_assert!((ledger.realized("AAA") - expected).abs() < 1e-6);
    }
}

// ── 4. Grid Size ─────────────────────────────────────────────────────

proptest! {
    /// The grid has one binding per combination of distinct candidates.
    #[test]
    fn grid_size_is_product_of_distinct_counts(
        a in prop::collection::vec(1..6_i64, 1..5),
        b in prop::collection::vec(1..4_i64, 1..4),
    ) {
        let base = Params::new().with("a", 0).with("b", 0).with("c", 1.5);
        let ranges = ParamRanges::from([
            ("a".to_string(), ParamSpec::candidates(a.clone())),
            ("b".to_string(), ParamSpec::candidates(b.clone())),
        ]);
        let grid = expand_grid(&base, &ranges).unwrap();

        let distinct = |v: &Vec<i64>| {
            let mut v = v.clone();
            v.sort_unstable();
            v.dedup();
            v.len()
        };
        prop_assert_eq!(grid.len(), distinct(&a) * distinct(&b));
        for binding in &grid {
            prop_assert_eq!(binding.f64("c").unwrap(), 1.5);
        }
    }
}
