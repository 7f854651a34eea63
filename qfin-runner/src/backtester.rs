//! Backtester: window selection, the tick loop, and two-phase sweeps.
//!
//! Every fold owns a fresh strategy, a fresh ledger, and independent cursors
//! over the shared price feed and indicator cache. Sweeps first populate the
//! cache through `&mut IndicatorEngine`, then evaluate every pair against
//! `&IndicatorEngine`, optionally on the rayon pool.

use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use qfin_core::indicators::IndicatorView;
use qfin_core::params::expand_grid;
use qfin_core::rng::SeedHierarchy;
use qfin_core::{
    ConfigError, IndicatorEngine, IndicatorOverrides, IndicatorRanges, Instrument, LedgerConfig,
    ParamRanges, Params, PortfolioLedger, PriceFeed, RangeError, ResolvedIndicators, StateError,
    TickWindow,
};

use crate::result::{run_fingerprint, MultiRunResult, RunFailure, SingleRunResult, SweepResult};
use crate::strategy::{RunContext, StrategyFactory};
use crate::window::{select_windows, Days};

/// Errors from a run or a sweep.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Core(#[from] qfin_core::Error),

    #[error("strategy failed in fold {fold} over {window}: {source}")]
    Strategy {
        fold: usize,
        window: TickWindow,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        RunError::Core(e.into())
    }
}

impl From<RangeError> for RunError {
    fn from(e: RangeError) -> Self {
        RunError::Core(e.into())
    }
}

impl From<StateError> for RunError {
    fn from(e: StateError) -> Self {
        RunError::Core(e.into())
    }
}

/// Run-level settings shared by every fold.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktesterConfig {
    pub days: Days,
    pub starting_capital: f64,
    pub fee: f64,
    /// Absolute position limit for instruments without an override.
    pub position_limit: f64,
    pub limits: BTreeMap<Instrument, f64>,
    /// Evaluate sweep entries on the rayon pool.
    pub parallel: bool,
}

impl Default for BacktesterConfig {
    fn default() -> Self {
        Self {
            days: Days::All,
            starting_capital: 1000.0,
            fee: 0.001,
            position_limit: 100.0,
            limits: BTreeMap::new(),
            parallel: true,
        }
    }
}

impl BacktesterConfig {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            fee: self.fee,
            default_limit: self.position_limit,
            limits: self.limits.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.starting_capital.is_finite() && self.starting_capital > 0.0) {
            return Err(ConfigError::InvalidCapital(self.starting_capital));
        }
        self.days.validate()?;
        self.ledger_config().validate()
    }
}

pub struct Backtester {
    engine: IndicatorEngine,
    strategy: Arc<dyn StrategyFactory>,
    strategy_params: Params,
    config: BacktesterConfig,
}

impl Backtester {
    pub fn new(
        engine: IndicatorEngine,
        strategy: Arc<dyn StrategyFactory>,
        config: BacktesterConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let instruments = engine.feed().instruments();
        if let Some(unknown) = config.limits.keys().find(|k| !instruments.contains(k)) {
            return Err(ConfigError::UnknownInstrument(unknown.clone()));
        }
        let strategy_params = strategy.schema().defaults();
        info!(
            strategy = strategy.name(),
            instruments = instruments.len(),
            ticks = engine.feed().len(),
            "backtester ready"
        );
        Ok(Self {
            engine,
            strategy,
            strategy_params,
            config,
        })
    }

    /// Backtester over `feed` with the built-in indicator library.
    pub fn with_builtins(
        feed: Arc<dyn PriceFeed>,
        strategy: Arc<dyn StrategyFactory>,
        config: BacktesterConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(IndicatorEngine::with_builtins(feed)?, strategy, config)
    }

    pub fn engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    /// Mutable engine access, e.g. to register extra indicators.
    pub fn engine_mut(&mut self) -> &mut IndicatorEngine {
        &mut self.engine
    }

    pub fn config(&self) -> &BacktesterConfig {
        &self.config
    }

    pub fn strategy_params(&self) -> &Params {
        &self.strategy_params
    }

    // ── Baseline setters ──

    pub fn set_strategy_params(&mut self, partial: &Params) -> Result<(), ConfigError> {
        self.strategy_params = self.resolve_strategy(partial)?;
        Ok(())
    }

    pub fn set_indicator_params(&mut self, partial: &IndicatorOverrides) -> Result<(), ConfigError> {
        self.engine.update_params(partial)
    }

    pub fn set_days(&mut self, days: Days) -> Result<(), ConfigError> {
        self.config.days = days.validate()?;
        Ok(())
    }

    pub fn set_starting_capital(&mut self, capital: f64) -> Result<(), ConfigError> {
        if !(capital.is_finite() && capital > 0.0) {
            return Err(ConfigError::InvalidCapital(capital));
        }
        self.config.starting_capital = capital;
        Ok(())
    }

    // ── Runs ──

    /// Windows for the configured `days`; see [`select_windows`].
    pub fn select_windows(
        &self,
        starts: &[NaiveDate],
        cv: usize,
        seed: u64,
    ) -> Result<Vec<TickWindow>, RunError> {
        Ok(select_windows(
            self.engine.feed().as_ref(),
            self.config.days,
            starts,
            cv,
            seed,
        )?)
    }

    /// Run one parameter pair over `cv` sampled windows.
    pub fn run(
        &mut self,
        strategy_params: &Params,
        indicator_params: &IndicatorOverrides,
        cv: usize,
        seed: Option<u64>,
    ) -> Result<MultiRunResult, RunError> {
        self.run_from(strategy_params, indicator_params, &[], cv, seed)
    }

    /// Run one parameter pair over one window per start date.
    pub fn run_at(
        &mut self,
        strategy_params: &Params,
        indicator_params: &IndicatorOverrides,
        starts: &[NaiveDate],
        seed: Option<u64>,
    ) -> Result<MultiRunResult, RunError> {
        self.run_from(strategy_params, indicator_params, starts, 1, seed)
    }

    fn run_from(
        &mut self,
        strategy_params: &Params,
        indicator_params: &IndicatorOverrides,
        starts: &[NaiveDate],
        cv: usize,
        seed: Option<u64>,
    ) -> Result<MultiRunResult, RunError> {
        let seed = seed.unwrap_or_else(rand::random);
        let params = self.resolve_strategy(strategy_params)?;
        let resolved = self.engine.resolve(indicator_params)?;
        let windows = self.select_windows(starts, cv, seed)?;
        self.engine.ensure_cached(&resolved)?;

        info!(
            strategy = self.strategy.name(),
            params = %params,
            folds = windows.len(),
            seed,
            "run started"
        );
        let result = self.evaluate(&params, &resolved, &windows, seed)?;
        info!(
            run_id = %result.run_id,
            roi_mean = result.roi_mean,
            roi_std = result.roi_std,
            "run finished"
        );
        Ok(result)
    }

    /// Evaluate every (strategy × indicator) combination over one shared
    /// set of windows, ranked by mean ROI.
    ///
    /// Configuration errors, including every strategy binding rejected by
    /// `StrategyFactory::validate`, abort before the cache is touched. A
    /// strategy that fails while trading is recorded in
    /// `SweepResult::failures` and the sweep continues; any other error
    /// aborts the sweep.
    pub fn grid_search(
        &mut self,
        strategy_ranges: &ParamRanges,
        indicator_ranges: &IndicatorRanges,
        cv: usize,
        seed: Option<u64>,
    ) -> Result<SweepResult, RunError> {
        let seed = seed.unwrap_or_else(rand::random);
        let schema = self.strategy.schema();
        schema.check_names(self.strategy.name(), strategy_ranges.keys().map(String::as_str))?;
        self.engine.validate_ranges(indicator_ranges)?;
        let strategy_grid = expand_grid(&self.strategy_params, strategy_ranges)?;
        for params in &strategy_grid {
            self.strategy.validate(params)?;
        }
        let windows = self.select_windows(&[], cv, seed)?;

        // write phase
        let indicator_grid = self.engine.enumerate_grid(indicator_ranges)?;

        let pairs: Vec<(&Params, &ResolvedIndicators)> = strategy_grid
            .iter()
            .flat_map(|s| indicator_grid.iter().map(move |i| (s, i)))
            .collect();
        info!(
            strategy = self.strategy.name(),
            strategy_bindings = strategy_grid.len(),
            indicator_bindings = indicator_grid.len(),
            pairs = pairs.len(),
            folds = windows.len(),
            parallel = self.config.parallel,
            seed,
            "sweep started"
        );

        // fan-out phase: the engine is only borrowed shared from here on
        let this = &*self;
        let evaluate = |(params, resolved): &(&Params, &ResolvedIndicators)| {
            match this.evaluate(params, resolved, &windows, seed) {
                Ok(run) => Ok(Ok(run)),
                Err(e @ RunError::Strategy { .. }) => Ok(Err(RunFailure {
                    strategy_params: (*params).clone(),
                    indicator_params: (*resolved).clone(),
                    error: e.to_string(),
                })),
                Err(fatal) => Err(fatal),
            }
        };
        let outcomes: Vec<Result<MultiRunResult, RunFailure>> = if this.config.parallel {
            pairs.par_iter().map(evaluate).collect::<Result<_, RunError>>()?
        } else {
            pairs.iter().map(evaluate).collect::<Result<_, RunError>>()?
        };

        let mut runs = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(run) => runs.push(run),
                Err(failure) => {
                    warn!(
                        params = %failure.strategy_params,
                        error = %failure.error,
                        "sweep entry failed"
                    );
                    failures.push(failure);
                }
            }
        }

        let sweep = SweepResult::new(seed, windows, runs, failures);
        info!(
            runs = sweep.runs.len(),
            failed = sweep.failures.len(),
            best_roi = sweep.best().map(|r| r.roi_mean),
            "sweep finished"
        );
        Ok(sweep)
    }

    /// All folds of one pair against the cached indicators.
    pub fn evaluate(
        &self,
        params: &Params,
        resolved: &ResolvedIndicators,
        windows: &[TickWindow],
        seed: u64,
    ) -> Result<MultiRunResult, RunError> {
        let view = self.engine.view(resolved)?;
        let seeds = SeedHierarchy::new(seed);
        let run_id = run_fingerprint(self.strategy.name(), params, resolved);

        let folds = windows
            .iter()
            .enumerate()
            .map(|(fold, window)| {
                let ctx = RunContext {
                    seed: seeds.fold_seed(&run_id, fold),
                    fold,
                    window: *window,
                    instruments: self.engine.feed().instruments().to_vec(),
                };
                self.run_fold(&view, params, ctx)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MultiRunResult::new(
            self.strategy.name(),
            params.clone(),
            resolved.clone(),
            seed,
            folds,
        ))
    }

    fn run_fold(
        &self,
        view: &IndicatorView<'_>,
        params: &Params,
        ctx: RunContext,
    ) -> Result<SingleRunResult, RunError> {
        let feed = self.engine.feed();
        let window = ctx.window;
        let mut strategy = self.strategy.build(params, &ctx)?;
        let mut ledger = PortfolioLedger::new(&ctx.instruments, self.config.ledger_config())?;

        let prices = feed.stream(window);
        let indicators = view.stream(window);
        for (price, indicator) in prices.zip(indicators) {
            ledger.advance(&price)?;
            strategy
                .on_tick(&price, &indicator, &mut ledger)
                .map_err(|source| RunError::Strategy {
                    fold: ctx.fold,
                    window,
                    source: source.into(),
                })?;
        }

        let output = ledger.wrap_up()?;
        let payload = strategy.on_finish();
        let dates = (
            feed.date_at(window.start),
            window.end.checked_sub(1).and_then(|t| feed.date_at(t)),
        );
        let result = SingleRunResult::from_ledger(
            ctx.fold,
            window,
            dates,
            self.config.starting_capital,
            output,
            payload,
        );
        debug!(
            fold = ctx.fold,
            window = %window,
            roi = result.roi,
            trades = result.trades.len(),
            "fold finished"
        );
        Ok(result)
    }

    fn resolve_strategy(&self, partial: &Params) -> Result<Params, ConfigError> {
        let params = self
            .strategy
            .schema()
            .resolve(self.strategy.name(), &self.strategy_params, partial)?;
        self.strategy.validate(&params)?;
        Ok(params)
    }
}

impl std::fmt::Debug for Backtester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backtester")
            .field("strategy", &self.strategy.name())
            .field("strategy_params", &self.strategy_params)
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish()
    }
}
