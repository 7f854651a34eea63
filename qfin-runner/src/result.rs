//! Result aggregation: per-fold statistics, cross-fold means, ranked sweeps.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use qfin_core::{
    Instrument, LedgerOutput, ParamValue, Params, ResolvedIndicators, TickWindow, TradeRecord,
};

use crate::metrics::{max_drawdown, mean, population_std, PerformanceMetrics};

/// Key of the all-instrument row in statistics tables.
pub const AGGREGATE: &str = "net";

/// Short content hash of a strategy binding plus indicator binding.
pub fn run_fingerprint(strategy: &str, params: &Params, indicators: &ResolvedIndicators) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(strategy.as_bytes());
    hasher.update(b"\0");
    hasher.update(params.canonical().as_bytes());
    hasher.update(b"\0");
    hasher.update(indicators.canonical().as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

// ─── Trade statistics ───────────────────────────────────────────────

/// Trade counts and P&L for one instrument or for all of them.
///
/// `longs` and `shorts` count closing trades by the side of the position
/// they closed: a sell that reduces a holding closes a long, a buy that
/// covers a short closes a short.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStats {
    pub trades: usize,
    pub longs: usize,
    pub shorts: usize,
    pub closing_trades: usize,
    /// Realized P&L before fees.
    pub gross_pnl: f64,
    pub fees: f64,
    /// Realized P&L after fees.
    pub net_pnl: f64,
    pub mean_per_close: f64,
    pub std_per_close: f64,
    pub long_mean: f64,
    pub long_std: f64,
    pub short_mean: f64,
    pub short_std: f64,
}

impl TradeStats {
    pub fn from_trades<'a>(trades: impl IntoIterator<Item = &'a TradeRecord>) -> Self {
        let mut stats = TradeStats::default();
        let mut long_closes = Vec::new();
        let mut short_closes = Vec::new();
        for t in trades {
            stats.trades += 1;
            if t.is_closing() {
                // a buy covers a short, a sell unwinds a long
                if t.is_buy() {
                    short_closes.push(t.realized);
                } else {
                    long_closes.push(t.realized);
                }
            }
            stats.fees += t.fee;
            stats.net_pnl += t.realized;
        }
        stats.longs = long_closes.len();
        stats.shorts = short_closes.len();
        stats.closing_trades = stats.longs + stats.shorts;
        stats.gross_pnl = stats.net_pnl + stats.fees;
        stats.long_mean = mean(&long_closes);
        stats.long_std = population_std(&long_closes);
        stats.short_mean = mean(&short_closes);
        stats.short_std = population_std(&short_closes);

        let closes: Vec<f64> = long_closes.into_iter().chain(short_closes).collect();
        stats.mean_per_close = mean(&closes);
        stats.std_per_close = population_std(&closes);
        stats
    }
}

/// `TradeStats` averaged elementwise across folds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSummary {
    pub trades: f64,
    pub longs: f64,
    pub shorts: f64,
    pub closing_trades: f64,
    pub gross_pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
    pub mean_per_close: f64,
    pub std_per_close: f64,
    pub long_mean: f64,
    pub long_std: f64,
    pub short_mean: f64,
    pub short_std: f64,
}

impl StatsSummary {
    pub fn average<'a>(rows: impl IntoIterator<Item = &'a TradeStats>) -> Self {
        let mut sum = StatsSummary::default();
        let mut n = 0usize;
        for r in rows {
            n += 1;
            sum.trades += r.trades as f64;
            sum.longs += r.longs as f64;
            sum.shorts += r.shorts as f64;
            sum.closing_trades += r.closing_trades as f64;
            sum.gross_pnl += r.gross_pnl;
            sum.fees += r.fees;
            sum.net_pnl += r.net_pnl;
            sum.mean_per_close += r.mean_per_close;
            sum.std_per_close += r.std_per_close;
            sum.long_mean += r.long_mean;
            sum.long_std += r.long_std;
            sum.short_mean += r.short_mean;
            sum.short_std += r.short_std;
        }
        if n == 0 {
            return sum;
        }
        let k = n as f64;
        StatsSummary {
            trades: sum.trades / k,
            longs: sum.longs / k,
            shorts: sum.shorts / k,
            closing_trades: sum.closing_trades / k,
            gross_pnl: sum.gross_pnl / k,
            fees: sum.fees / k,
            net_pnl: sum.net_pnl / k,
            mean_per_close: sum.mean_per_close / k,
            std_per_close: sum.std_per_close / k,
            long_mean: sum.long_mean / k,
            long_std: sum.long_std / k,
            short_mean: sum.short_mean / k,
            short_std: sum.short_std / k,
        }
    }
}

// ─── SingleRunResult ────────────────────────────────────────────────

/// Outcome of one fold: one strategy instance over one window.
#[derive(Debug, Clone, Serialize)]
pub struct SingleRunResult {
    pub fold: usize,
    pub window: TickWindow,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub starting_capital: f64,
    /// Total realized P&L over starting capital.
    pub roi: f64,
    pub metrics: PerformanceMetrics,
    /// Capital plus mark-to-market value per tick, then the settled value.
    pub equity_curve: Vec<f64>,
    pub per_instrument: BTreeMap<Instrument, TradeStats>,
    pub aggregate: TradeStats,
    pub trades: Vec<TradeRecord>,
    pub values: BTreeMap<Instrument, Vec<f64>>,
    pub payload: Option<serde_json::Value>,
}

impl SingleRunResult {
    pub fn from_ledger(
        fold: usize,
        window: TickWindow,
        dates: (Option<NaiveDateTime>, Option<NaiveDateTime>),
        starting_capital: f64,
        output: LedgerOutput,
        payload: Option<serde_json::Value>,
    ) -> Self {
        let realized = output.total_realized();
        let mut equity_curve = output.equity_curve(starting_capital);
        equity_curve.push(starting_capital + realized);

        let per_instrument = output
            .values
            .keys()
            .map(|inst| {
                let stats = TradeStats::from_trades(output.trades.iter().filter(|t| &t.instrument == inst));
                (inst.clone(), stats)
            })
            .collect();

        Self {
            fold,
            window,
            start: dates.0,
            end: dates.1,
            starting_capital,
            roi: realized / starting_capital,
            metrics: PerformanceMetrics::compute(&equity_curve, &output.trades),
            aggregate: TradeStats::from_trades(&output.trades),
            per_instrument,
            equity_curve,
            trades: output.trades,
            values: output.values,
            payload,
        }
    }

    pub fn max_drawdown(&self) -> f64 {
        max_drawdown(&self.equity_curve)
    }

    /// Per-instrument rows plus the aggregate row under `AGGREGATE`.
    pub fn statistics(&self) -> BTreeMap<String, &TradeStats> {
        let mut rows: BTreeMap<String, &TradeStats> =
            self.per_instrument.iter().map(|(k, v)| (k.clone(), v)).collect();
        rows.insert(AGGREGATE.to_string(), &self.aggregate);
        rows
    }

    fn date_range(&self) -> String {
        let fmt = |d: Option<NaiveDateTime>| d.map_or_else(|| "?".to_string(), |d| d.date().to_string());
        format!("{} -> {}", fmt(self.start), fmt(self.end))
    }
}

// ─── MultiRunResult ─────────────────────────────────────────────────

/// Every fold of one (strategy binding, indicator binding) pair.
#[derive(Debug, Clone, Serialize)]
pub struct MultiRunResult {
    pub run_id: String,
    pub strategy: String,
    pub strategy_params: Params,
    pub indicator_params: ResolvedIndicators,
    pub seed: u64,
    pub folds: Vec<SingleRunResult>,
    pub roi_mean: f64,
    /// Population standard deviation of fold ROIs.
    pub roi_std: f64,
}

impl MultiRunResult {
    pub fn new(
        strategy: &str,
        strategy_params: Params,
        indicator_params: ResolvedIndicators,
        seed: u64,
        folds: Vec<SingleRunResult>,
    ) -> Self {
        let rois: Vec<f64> = folds.iter().map(|f| f.roi).collect();
        Self {
            run_id: run_fingerprint(strategy, &strategy_params, &indicator_params),
            strategy: strategy.to_string(),
            roi_mean: mean(&rois),
            roi_std: population_std(&rois),
            strategy_params,
            indicator_params,
            seed,
            folds,
        }
    }

    pub fn rois(&self) -> Vec<f64> {
        self.folds.iter().map(|f| f.roi).collect()
    }

    /// Fold statistics averaged elementwise per row.
    pub fn statistics(&self) -> BTreeMap<String, StatsSummary> {
        let mut rows: BTreeMap<String, Vec<&TradeStats>> = BTreeMap::new();
        for fold in &self.folds {
            for (name, stats) in fold.statistics() {
                rows.entry(name).or_default().push(stats);
            }
        }
        rows.into_iter()
            .map(|(name, stats)| (name, StatsSummary::average(stats)))
            .collect()
    }
}

impl fmt::Display for MultiRunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} [{}]", self.strategy, self.strategy_params, self.run_id)?;
        for (name, params) in self.indicator_params.iter() {
            writeln!(f, "  {name}: {params}")?;
        }
        writeln!(f, "mean ROI {:.4} (std {:.4}, seed {})", self.roi_mean, self.roi_std, self.seed)?;
        for fold in &self.folds {
            writeln!(
                f,
                "  fold {} {} {}: roi {:.4}, max dd {:.4}, trades {}",
                fold.fold,
                fold.window,
                fold.date_range(),
                fold.roi,
                fold.max_drawdown(),
                fold.aggregate.trades
            )?;
        }
        writeln!(
            f,
            "{:<10} {:>8} {:>12} {:>10} {:>7} {:>10} {:>10} {:>7} {:>10} {:>10} {:>10} {:>10}",
            "", "trades", "net_pnl", "fees",
            "longs", "long_mean", "long_std",
            "shorts", "short_mean", "short_std",
            "mean", "std"
        )?;
        for (name, s) in self.statistics() {
            writeln!(
                f,
                "{:<10} {:>8.1} {:>12.4} {:>10.4} {:>7.1} {:>10.4} {:>10.4} {:>7.1} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                name, s.trades, s.net_pnl, s.fees,
                s.longs, s.long_mean, s.long_std,
                s.shorts, s.short_mean, s.short_std,
                s.mean_per_close, s.std_per_close
            )?;
        }
        Ok(())
    }
}

// ─── SweepResult ────────────────────────────────────────────────────

/// A sweep entry that failed; the rest of the sweep is unaffected.
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub strategy_params: Params,
    pub indicator_params: ResolvedIndicators,
    pub error: String,
}

/// Every successful pair ranked by mean ROI, best first.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub seed: u64,
    pub windows: Vec<TickWindow>,
    pub runs: Vec<MultiRunResult>,
    pub failures: Vec<RunFailure>,
}

impl SweepResult {
    /// Ranks `runs` by mean ROI; ties keep grid order.
    pub fn new(
        seed: u64,
        windows: Vec<TickWindow>,
        mut runs: Vec<MultiRunResult>,
        failures: Vec<RunFailure>,
    ) -> Self {
        runs.sort_by(|a, b| b.roi_mean.total_cmp(&a.roi_mean));
        Self {
            seed,
            windows,
            runs,
            failures,
        }
    }

    pub fn best(&self) -> Option<&MultiRunResult> {
        self.runs.first()
    }

    pub fn top_n(&self, n: usize) -> &[MultiRunResult] {
        &self.runs[..n.min(self.runs.len())]
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Distinct values tried per strategy parameter, in first-seen order.
    pub fn strategy_values(&self) -> BTreeMap<String, Vec<ParamValue>> {
        let mut out: BTreeMap<String, Vec<ParamValue>> = BTreeMap::new();
        for run in &self.runs {
            collect_values(&mut out, &run.strategy_params);
        }
        out
    }

    /// Distinct values tried per indicator parameter.
    pub fn indicator_values(&self) -> BTreeMap<String, BTreeMap<String, Vec<ParamValue>>> {
        let mut out: BTreeMap<String, BTreeMap<String, Vec<ParamValue>>> = BTreeMap::new();
        for run in &self.runs {
            for (name, params) in run.indicator_params.iter() {
                collect_values(out.entry(name.clone()).or_default(), params);
            }
        }
        out
    }
}

fn collect_values(out: &mut BTreeMap<String, Vec<ParamValue>>, params: &Params) {
    for (name, value) in params.iter() {
        let seen = out.entry(name.clone()).or_default();
        if !seen.contains(value) {
            seen.push(value.clone());
        }
    }
}

impl fmt::Display for SweepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} runs over {} windows (seed {}), {} failed",
            self.runs.len(),
            self.windows.len(),
            self.seed,
            self.failures.len()
        )?;
        for (rank, run) in self.runs.iter().enumerate() {
            writeln!(
                f,
                "{:>4}. roi {:>9.4} ± {:.4}  {}  {}",
                rank + 1,
                run.roi_mean,
                run.roi_std,
                run.strategy_params,
                run.run_id
            )?;
        }
        for failure in &self.failures {
            writeln!(f, "  failed {}: {}", failure.strategy_params, failure.error)?;
        }
        Ok(())
    }
}
