//! Performance metrics: pure functions over an equity curve or a trade log.
//!
//! No dependencies on the backtester, the feed, or the indicator engine.

use serde::{Deserialize, Serialize};
use qfin_core::TradeRecord;

/// Curve and trade metrics for a single fold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub closing_trades: usize,
}

impl PerformanceMetrics {
    pub fn compute(equity_curve: &[f64], trades: &[TradeRecord]) -> Self {
        Self {
            total_return: total_return(equity_curve),
            sharpe: sharpe_ratio(equity_curve, 0.0),
            sortino: sortino_ratio(equity_curve, 0.0),
            max_drawdown: max_drawdown(equity_curve),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            closing_trades: trades.iter().filter(|t| t.is_closing()).count(),
        }
    }
}

// ─── Curve metrics ──────────────────────────────────────────────────

/// (final - initial) / initial; 0.0 for short or non-positive curves.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&initial), Some(&last)) if equity_curve.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Annualized Sharpe ratio of per-tick returns, assuming 252 ticks a year.
///
/// Returns 0.0 with fewer than two returns or zero variance.
pub fn sharpe_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let returns = tick_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let per_tick_rf = risk_free_rate / 252.0;
    let excess: Vec<f64> = returns.iter().map(|r| r - per_tick_rf).collect();
    let std = sample_std(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    (mean(&excess) / std) * 252.0_f64.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
pub fn sortino_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let returns = tick_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let per_tick_rf = risk_free_rate / 252.0;
    let excess: Vec<f64> = returns.iter().map(|r| r - per_tick_rf).collect();

    let downside: f64 = excess.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    let downside_std = (downside / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    (mean(&excess) / downside_std) * 252.0_f64.sqrt()
}

/// Maximum drawdown as a negative fraction of the running peak.
///
/// Returns 0.0 for constant or monotonically increasing curves.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

// ─── Trade metrics ──────────────────────────────────────────────────

/// Fraction of closing trades with positive realized P&L.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    let closing: Vec<f64> = closing_pnl(trades).collect();
    if closing.is_empty() {
        return 0.0;
    }
    closing.iter().filter(|p| **p > 0.0).count() as f64 / closing.len() as f64
}

/// Gross profits / gross losses over closing trades, capped at 100.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    let (profit, loss) = closing_pnl(trades).fold((0.0, 0.0), |(p, l), pnl| {
        if pnl > 0.0 {
            (p + pnl, l)
        } else {
            (p, l - pnl)
        }
    });
    if loss < 1e-10 {
        return if profit > 0.0 { 100.0 } else { 0.0 };
    }
    (profit / loss).min(100.0)
}

fn closing_pnl(trades: &[TradeRecord]) -> impl Iterator<Item = f64> + '_ {
    trades.iter().filter(|t| t.is_closing()).map(|t| t.realized)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple returns between consecutive curve points.
pub fn tick_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divide by N).
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub(crate) fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
