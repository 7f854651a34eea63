//! Indicator registry, memoizing engine, and the built-in library.
//!
//! Indicators are registered explicitly as descriptors (name, parameter
//! schema, compute function) and classified as per-instrument or
//! cross-instrument. The engine caches one immutable block per
//! (name, canonical params) and hands out growing-window views that slice the
//! cached arrays.

pub mod bollinger;
pub mod cache;
pub mod ema;
pub mod engine;
pub mod rsi;
pub mod sma;
pub mod view;
pub mod volume;

pub use cache::{CacheKey, IndicatorBlock, IndicatorCache, OutputSeries};
pub use engine::{IndicatorEngine, IndicatorOverrides, IndicatorRanges, ResolvedIndicators};
pub use view::{IndicatorSnapshot, IndicatorStream, IndicatorView, InstrumentWindows, SnapshotEntry};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::feed::{FeedFrame, InstrumentSeries};
use crate::params::{ParamSchema, Params};

/// Named output arrays produced by one indicator invocation.
pub type IndicatorOutputs = BTreeMap<String, Vec<f64>>;

pub type PerInstrumentFn =
    Arc<dyn Fn(&InstrumentSeries, &Params) -> Result<IndicatorOutputs, ConfigError> + Send + Sync>;

pub type CrossInstrumentFn =
    Arc<dyn Fn(&FeedFrame<'_>, &Params) -> Result<IndicatorOutputs, ConfigError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Invoked once per instrument with that instrument's series.
    PerInstrument,
    /// Invoked once with every instrument's series.
    CrossInstrument,
}

#[derive(Clone)]
pub enum IndicatorCompute {
    PerInstrument(PerInstrumentFn),
    CrossInstrument(CrossInstrumentFn),
}

impl IndicatorCompute {
    pub fn classification(&self) -> Classification {
        match self {
            IndicatorCompute::PerInstrument(_) => Classification::PerInstrument,
            IndicatorCompute::CrossInstrument(_) => Classification::CrossInstrument,
        }
    }
}

/// A registered indicator.
#[derive(Clone)]
pub struct IndicatorDescriptor {
    name: String,
    schema: ParamSchema,
    compute: IndicatorCompute,
}

impl IndicatorDescriptor {
    pub fn per_instrument<F>(name: impl Into<String>, schema: ParamSchema, f: F) -> Self
    where
        F: Fn(&InstrumentSeries, &Params) -> Result<IndicatorOutputs, ConfigError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            schema,
            compute: IndicatorCompute::PerInstrument(Arc::new(f)),
        }
    }

    pub fn cross_instrument<F>(name: impl Into<String>, schema: ParamSchema, f: F) -> Self
    where
        F: Fn(&FeedFrame<'_>, &Params) -> Result<IndicatorOutputs, ConfigError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            schema,
            compute: IndicatorCompute::CrossInstrument(Arc::new(f)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    pub fn compute(&self) -> &IndicatorCompute {
        &self.compute
    }

    pub fn classification(&self) -> Classification {
        self.compute.classification()
    }
}

impl fmt::Debug for IndicatorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndicatorDescriptor")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("classification", &self.classification())
            .finish()
    }
}

/// Name → descriptor map.
#[derive(Debug, Clone, Default)]
pub struct IndicatorRegistry {
    descriptors: BTreeMap<String, IndicatorDescriptor>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(true)` when newly added and `Ok(false)` when an identical
    /// schema was already registered (the existing function is kept).
    pub fn register(&mut self, descriptor: IndicatorDescriptor) -> Result<bool, ConfigError> {
        if let Some(existing) = self.descriptors.get(descriptor.name()) {
            if existing.schema() == descriptor.schema()
                && existing.classification() == descriptor.classification()
            {
                return Ok(false);
            }
            return Err(ConfigError::SchemaConflict(descriptor.name().to_string()));
        }
        self.descriptors.insert(descriptor.name().to_string(), descriptor);
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Option<&IndicatorDescriptor> {
        self.descriptors.get(name)
    }

    pub fn lookup(&self, name: &str) -> Result<&IndicatorDescriptor, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::UnknownIndicator(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndicatorDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// The built-in library.
pub fn builtins() -> Vec<IndicatorDescriptor> {
    vec![
        sma::descriptor(),
        ema::descriptor(),
        bollinger::descriptor(),
        rsi::descriptor(),
        volume::descriptor(),
    ]
}

/// Read a window length that must be at least 1.
pub(crate) fn period_param(params: &Params, name: &str) -> Result<usize, ConfigError> {
    let period = params.usize(name)?;
    if period == 0 {
        return Err(ConfigError::InvalidParam {
            param: name.to_string(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(period)
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
