//! qfin runner: backtest orchestration, cross-validation, sweeps, results.
//!
//! This crate builds on `qfin-core` to provide:
//! - The strategy callback interface and a few demo strategies
//! - Window selection (explicit starts or seeded sampling)
//! - Single runs over many folds and two-phase parameter sweeps
//! - Per-fold, cross-fold and sweep result aggregation
//! - TOML configuration

pub mod backtester;
pub mod config;
pub mod metrics;
pub mod result;
pub mod strategies;
pub mod strategy;
pub mod window;

pub use backtester::{Backtester, BacktesterConfig, RunError};
pub use config::{BacktestConfig, ConfigFileError};
pub use metrics::PerformanceMetrics;
pub use result::{MultiRunResult, RunFailure, SingleRunResult, StatsSummary, SweepResult, TradeStats};
pub use strategy::{FnFactory, RunContext, Strategy, StrategyFactory};
pub use window::{select_windows, Days};
