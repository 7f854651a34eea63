//! Strategy interface: the black-box callback driven once per tick.
//!
//! A `StrategyFactory` declares the parameter schema and builds a fresh
//! `Strategy` for every fold. The built strategy only sees growing-window
//! snapshots and the fold's own ledger.

use std::sync::Arc;

use qfin_core::{
    ConfigError, IndicatorSnapshot, Instrument, ParamSchema, Params, PortfolioLedger,
    PriceSnapshot, TickWindow,
};

/// Per-fold context handed to `StrategyFactory::build`.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Deterministic seed for any randomness inside the strategy.
    pub seed: u64,
    pub fold: usize,
    pub window: TickWindow,
    pub instruments: Vec<Instrument>,
}

/// Per-tick trading logic for one fold.
pub trait Strategy {
    /// Called after the ledger has advanced to `prices.tick()`.
    fn on_tick(
        &mut self,
        prices: &PriceSnapshot<'_>,
        indicators: &IndicatorSnapshot<'_>,
        ledger: &mut PortfolioLedger,
    ) -> anyhow::Result<()>;

    /// Called once after wrap-up. The payload is stored in the fold result.
    fn on_finish(&mut self) -> Option<serde_json::Value> {
        None
    }
}

/// Builds strategies and declares their parameters.
pub trait StrategyFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Declared parameters with their defaults.
    fn schema(&self) -> ParamSchema;

    /// Check a complete binding without building anything. Runs and sweeps
    /// call this for every binding before touching the indicator cache.
    fn validate(&self, _params: &Params) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Build a strategy from a complete binding.
    fn build(&self, params: &Params, ctx: &RunContext) -> Result<Box<dyn Strategy>, ConfigError>;
}

/// Factory from a name, a schema and a closure.
pub struct FnFactory<F> {
    name: String,
    schema: ParamSchema,
    build: F,
}

impl<F> FnFactory<F>
where
    F: Fn(&Params, &RunContext) -> Result<Box<dyn Strategy>, ConfigError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, schema: ParamSchema, build: F) -> Self {
        Self {
            name: name.into(),
            schema,
            build,
        }
    }

    pub fn shared(self) -> Arc<dyn StrategyFactory>
    where
        F: 'static,
    {
        Arc::new(self)
    }
}

impl<F> StrategyFactory for FnFactory<F>
where
    F: Fn(&Params, &RunContext) -> Result<Box<dyn Strategy>, ConfigError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ParamSchema {
        self.schema.clone()
    }

    fn build(&self, params: &Params, ctx: &RunContext) -> Result<Box<dyn Strategy>, ConfigError> {
        (self.build)(params, ctx)
    }
}

impl<F> std::fmt::Debug for FnFactory<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFactory")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}
