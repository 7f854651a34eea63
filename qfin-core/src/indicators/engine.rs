//! IndicatorEngine: resolves bindings, populates the cache, and builds views.
//!
//! Mutation (`register`, `update_params`, `ensure_cached`, `enumerate_grid`)
//! needs `&mut self`; views borrow `&self`. A sweep therefore writes every
//! cache entry first and only then fans out over shared views.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::cache::{CacheKey, IndicatorBlock, IndicatorCache, OutputSeries};
use super::view::IndicatorView;
use super::{builtins, IndicatorCompute, IndicatorDescriptor, IndicatorOutputs, IndicatorRegistry};
use crate::error::{ConfigError, Error, StateError};
use crate::feed::{FeedFrame, PriceFeed};
use crate::params::{cartesian, expand_grid, ParamRanges, Params};

/// Partial overrides per indicator name.
pub type IndicatorOverrides = BTreeMap<String, Params>;

/// Candidate ranges per indicator name.
pub type IndicatorRanges = BTreeMap<String, ParamRanges>;

/// Complete bindings for every registered indicator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedIndicators(BTreeMap<String, Params>);

impl ResolvedIndicators {
    pub fn get(&self, indicator: &str) -> Option<&Params> {
        self.0.get(indicator)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Params)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(|(name, params)| format!("{name}{}", params.canonical()))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl FromIterator<(String, Params)> for ResolvedIndicators {
    fn from_iter<I: IntoIterator<Item = (String, Params)>>(iter: I) -> Self {
        ResolvedIndicators(iter.into_iter().collect())
    }
}

pub struct IndicatorEngine {
    feed: Arc<dyn PriceFeed>,
    registry: IndicatorRegistry,
    baseline: BTreeMap<String, Params>,
    cache: IndicatorCache,
    computations: usize,
}

impl IndicatorEngine {
    pub fn new(feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            feed,
            registry: IndicatorRegistry::new(),
            baseline: BTreeMap::new(),
            cache: IndicatorCache::new(),
            computations: 0,
        }
    }

    /// Engine with the built-in library registered.
    pub fn with_builtins(feed: Arc<dyn PriceFeed>) -> Result<Self, ConfigError> {
        let mut engine = Self::new(feed);
        for descriptor in builtins() {
            engine.register(descriptor)?;
        }
        Ok(engine)
    }

    pub fn feed(&self) -> &Arc<dyn PriceFeed> {
        &self.feed
    }

    pub fn registry(&self) -> &IndicatorRegistry {
        &self.registry
    }

    /// Current baseline binding per indicator.
    pub fn params(&self) -> &BTreeMap<String, Params> {
        &self.baseline
    }

    /// Number of blocks computed so far (cache misses).
    pub fn computations(&self) -> usize {
        self.computations
    }

    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }

    pub fn is_cached(&self, indicator: &str, params: &Params) -> bool {
        self.cache.contains(&CacheKey::new(indicator, params))
    }

    pub fn register(&mut self, descriptor: IndicatorDescriptor) -> Result<(), ConfigError> {
        let name = descriptor.name().to_string();
        let defaults = descriptor.schema().defaults();
        if self.registry.register(descriptor)? {
            debug!(indicator = %name, "registered indicator");
            self.baseline.insert(name, defaults);
        }
        Ok(())
    }

    /// Fill `partial` from the baseline for every registered indicator.
    pub fn resolve(&self, partial: &IndicatorOverrides) -> Result<ResolvedIndicators, ConfigError> {
        self.check_overrides(partial)?;
        Ok(self
            .baseline
            .iter()
            .map(|(name, base)| {
                let params = match partial.get(name) {
                    Some(overrides) => base.merged(overrides),
                    None => base.clone(),
                };
                (name.clone(), params)
            })
            .collect())
    }

    /// Replace the baseline with `partial` applied on top of it.
    pub fn update_params(&mut self, partial: &IndicatorOverrides) -> Result<(), ConfigError> {
        let resolved = self.resolve(partial)?;
        self.ensure_cached(&resolved)?;
        self.baseline = resolved.0;
        Ok(())
    }

    /// Compute every block in `resolved` that is not cached yet.
    pub fn ensure_cached(&mut self, resolved: &ResolvedIndicators) -> Result<(), ConfigError> {
        for (name, params) in resolved.iter() {
            let key = CacheKey::new(name, params);
            if self.cache.contains(&key) {
                debug!(indicator = %name, key = %key.fingerprint(), "indicator cache hit");
                continue;
            }
            let descriptor = self.registry.lookup(name)?;
            descriptor
                .schema()
                .check_names(name, params.keys())?;
            let block = self.compute_block(descriptor, params)?;
            self.computations += 1;
            info!(
                indicator = %name,
                params = %params,
                key = %key.fingerprint(),
                outputs = block.outputs().len(),
                "computed indicator"
            );
            self.cache.insert(key, block);
        }
        Ok(())
    }

    /// Reject unknown indicator or parameter names in `ranges`.
    pub fn validate_ranges(&self, ranges: &IndicatorRanges) -> Result<(), ConfigError> {
        for (name, params) in ranges {
            let descriptor = self.registry.lookup(name)?;
            descriptor
                .schema()
                .check_names(name, params.keys().map(String::as_str))?;
        }
        Ok(())
    }

    /// Every binding in the cross product of `ranges`, cached.
    ///
    /// Within an indicator the product runs over its parameters; across
    /// indicators it runs over the per-indicator lists. Unranged parameters
    /// and indicators keep their baseline.
    pub fn enumerate_grid(&mut self, ranges: &IndicatorRanges) -> Result<Vec<ResolvedIndicators>, ConfigError> {
        self.validate_ranges(ranges)?;

        let mut axes: Vec<(String, Vec<Params>)> = Vec::with_capacity(self.baseline.len());
        for (name, base) in &self.baseline {
            let bindings = match ranges.get(name) {
                Some(r) => expand_grid(base, r)?,
                None => vec![base.clone()],
            };
            axes.push((name.clone(), bindings));
        }

        let grid: Vec<ResolvedIndicators> = cartesian(&axes).into_iter().map(ResolvedIndicators).collect();

        let before = self.computations;
        for resolved in &grid {
            self.ensure_cached(resolved)?;
        }
        info!(
            combinations = grid.len(),
            computed = self.computations - before,
            cached = self.cache.len(),
            "enumerated indicator grid"
        );
        Ok(grid)
    }

    /// Growing-window view over the cached blocks of `resolved`.
    pub fn view(&self, resolved: &ResolvedIndicators) -> Result<IndicatorView<'_>, Error> {
        let mut outputs: BTreeMap<&str, &OutputSeries> = BTreeMap::new();
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for (name, params) in resolved.iter() {
            let key = CacheKey::new(name, params);
            let block = self.cache.get(&key).ok_or_else(|| StateError::NotCached {
                indicator: name.clone(),
                params: params.canonical(),
            })?;
            for (output, series) in block.outputs() {
                if let Some(first) = owners.insert(output.as_str(), name.as_str()) {
                    return Err(ConfigError::DuplicateOutput {
                        output: output.clone(),
                        first: first.to_string(),
                        second: name.clone(),
                    }
                    .into());
                }
                outputs.insert(output.as_str(), series);
            }
        }
        Ok(IndicatorView::new(outputs, self.feed.len()))
    }

    fn check_overrides(&self, partial: &IndicatorOverrides) -> Result<(), ConfigError> {
        for (name, params) in partial {
            let descriptor = self.registry.lookup(name)?;
            descriptor.schema().check_names(name, params.keys())?;
        }
        Ok(())
    }

    fn compute_block(&self, descriptor: &IndicatorDescriptor, params: &Params) -> Result<IndicatorBlock, ConfigError> {
        let name = descriptor.name();
        let len = self.feed.len();
        let instruments = self.feed.instruments();

        let check_len = |output: &str, values: &[f64]| {
            if values.len() == len {
                Ok(())
            } else {
                Err(ConfigError::OutputLength {
                    indicator: name.to_string(),
                    output: output.to_string(),
                    expected: len,
                    actual: values.len(),
                })
            }
        };

        let mut outputs = BTreeMap::new();
        match descriptor.compute() {
            IndicatorCompute::PerInstrument(f) => {
                let mut per_output: BTreeMap<String, BTreeMap<String, Vec<f64>>> = BTreeMap::new();
                for instrument in instruments {
                    let series = self
                        .feed
                        .series(instrument)
                        .ok_or_else(|| ConfigError::UnknownInstrument(instrument.clone()))?;
                    let produced: IndicatorOutputs = f(series, params)?;
                    for (output, values) in produced {
                        check_len(&output, &values)?;
                        per_output
                            .entry(output)
                            .or_default()
                            .insert(instrument.clone(), values);
                    }
                }
                for (output, by_instrument) in per_output {
                    if let Some(missing) = instruments.iter().find(|i| !by_instrument.contains_key(*i)) {
                        return Err(ConfigError::MissingOutput {
                            indicator: name.to_string(),
                            output,
                            instrument: missing.clone(),
                        });
                    }
                    outputs.insert(output, OutputSeries::PerInstrument(by_instrument));
                }
            }
            IndicatorCompute::CrossInstrument(f) => {
                let frame: FeedFrame<'_> = instruments
                    .iter()
                    .filter_map(|i| self.feed.series(i).map(|s| (i.as_str(), s)))
                    .collect();
                for (output, values) in f(&frame, params)? {
                    check_len(&output, &values)?;
                    outputs.insert(output, OutputSeries::Joint(values));
                }
            }
        }
        Ok(IndicatorBlock::new(outputs))
    }
}

impl std::fmt::Debug for IndicatorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorEngine")
            .field("indicators", &self.registry.names().collect::<BTreeSet<_>>())
            .field("cached_blocks", &self.cache.len())
            .field("computations", &self.computations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MarketData;
    use crate::params::{ParamSchema, ParamSpec};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn feed() -> Arc<dyn PriceFeed> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Arc::new(
            MarketData::from_closes(
                start,
                [
                    ("AAA", (1..=10).map(f64::from).collect::<Vec<_>>()),
                    ("BBB", (11..=20).map(f64::from).collect::<Vec<_>>()),
                ],
            )
            .unwrap(),
        )
    }

    fn counting(name: &str, counter: Arc<AtomicUsize>) -> IndicatorDescriptor {
        let output = format!("{name}_out");
        IndicatorDescriptor::per_instrument(
            name,
            ParamSchema::new().param("a", 1).param("b", 2),
            move |series, params| {
                counter.fetch_add(1, Ordering::SeqCst);
                let a = params.f64("a")?;
                Ok(IndicatorOutputs::from([(
                    output.clone(),
                    series.close.iter().map(|c| c * a).collect(),
                )]))
            },
        )
    }

    #[test]
    fn resolve_fills_defaults_for_every_indicator() {
        let engine = IndicatorEngine::with_builtins(feed()).unwrap();
        let partial = IndicatorOverrides::from([("sma".to_string(), Params::new().with("period", 3))]);
        let resolved = engine.resolve(&partial).unwrap();
        assert_eq!(resolved.len(), 5);
        assert_eq!(resolved.get("sma").unwrap().usize("period").unwrap(), 3);
        assert_eq!(resolved.get("rsi").unwrap().usize("period").unwrap(), 14);
    }

    #[test]
    fn resolve_rejects_unknown_names() {
        let engine = IndicatorEngine::with_builtins(feed()).unwrap();
        let unknown = IndicatorOverrides::from([("macd".to_string(), Params::new())]);
        assert_eq!(
            engine.resolve(&unknown).unwrap_err(),
            ConfigError::UnknownIndicator("macd".into())
        );
        let bad_param = IndicatorOverrides::from([("sma".to_string(), Params::new().with("window", 3))]);
        assert!(matches!(
            engine.resolve(&bad_param).unwrap_err(),
            ConfigError::UnknownParameter { .. }
        ));
    }

    #[test]
    fn reordered_bindings_compute_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut engine = IndicatorEngine::new(feed());
        engine.register(counting("f", counter.clone())).unwrap();

        let first: ResolvedIndicators =
            [("f".to_string(), Params::new().with("a", 1).with("b", 2))].into_iter().collect();
        let second: ResolvedIndicators =
            [("f".to_string(), Params::new().with("b", 2).with("a", 1))].into_iter().collect();
        engine.ensure_cached(&first).unwrap();
        engine.ensure_cached(&second).unwrap();

        // one call per instrument, one block
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(engine.computations(), 1);

        let v1 = engine.view(&first).unwrap();
        let v2 = engine.view(&second).unwrap();
        let a = v1.at(9).per_instrument("f_out", "AAA").unwrap();
        let b = v2.at(9).per_instrument("f_out", "AAA").unwrap();
        assert!(std::ptr::eq(a.as_ptr(), b.as_ptr()));
    }

    #[test]
    fn view_before_caching_is_state_error() {
        let engine = IndicatorEngine::with_builtins(feed()).unwrap();
        let resolved = engine.resolve(&IndicatorOverrides::new()).unwrap();
        assert!(matches!(
            engine.view(&resolved),
            Err(Error::State(StateError::NotCached { .. }))
        ));
    }

    #[test]
    fn update_params_moves_baseline() {
        let mut engine = IndicatorEngine::with_builtins(feed()).unwrap();
        let partial = IndicatorOverrides::from([("ema".to_string(), Params::new().with("period", 4))]);
        engine.update_params(&partial).unwrap();
        assert_eq!(engine.params()["ema"].usize("period").unwrap(), 4);
        let resolved = engine.resolve(&IndicatorOverrides::new()).unwrap();
        assert_eq!(resolved.get("ema").unwrap().usize("period").unwrap(), 4);
        assert!(engine.view(&resolved).is_ok());
    }

    #[test]
    fn grid_size_is_product_of_candidates() {
        let mut engine = IndicatorEngine::with_builtins(feed()).unwrap();
        let ranges = IndicatorRanges::from([
            (
                "bollinger".to_string(),
                ParamRanges::from([
                    ("lookback".to_string(), ParamSpec::candidates([3, 5])),
                    ("n_std".to_string(), ParamSpec::candidates([1.0, 2.0, 3.0])),
                ]),
            ),
            (
                "sma".to_string(),
                ParamRanges::from([("period".to_string(), ParamSpec::candidates([2, 4]))]),
            ),
        ]);
        let grid = engine.enumerate_grid(&ranges).unwrap();
        assert_eq!(grid.len(), 12);
        let distinct: BTreeSet<String> = grid.iter().map(ResolvedIndicators::canonical).collect();
        assert_eq!(distinct.len(), 12);
        for resolved in &grid {
            assert!(engine.view(resolved).is_ok());
        }
        // 6 bollinger + 2 sma + ema + rsi + volume_sum
        assert_eq!(engine.computations(), 11);
    }

    #[test]
    fn grid_without_ranges_is_the_baseline() {
        let mut engine = IndicatorEngine::with_builtins(feed()).unwrap();
        let grid = engine.enumerate_grid(&IndicatorRanges::new()).unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid[0], engine.resolve(&IndicatorOverrides::new()).unwrap());
    }

    #[test]
    fn grid_rejects_unknown_before_computing() {
        let mut engine = IndicatorEngine::with_builtins(feed()).unwrap();
        let ranges = IndicatorRanges::from([
            (
                "sma".to_string(),
                ParamRanges::from([("period".to_string(), ParamSpec::candidates([2, 3]))]),
            ),
            (
                "rsi".to_string(),
                ParamRanges::from([("bogus".to_string(), ParamSpec::value(1))]),
            ),
        ]);
        assert!(engine.enumerate_grid(&ranges).is_err());
        assert_eq!(engine.computations(), 0);
    }

    #[test]
    fn duplicate_output_names_rejected() {
        let mut engine = IndicatorEngine::new(feed());
        engine.register(counting("f", Arc::new(AtomicUsize::new(0)))).unwrap();
        let clash = IndicatorDescriptor::per_instrument("g", ParamSchema::new(), |series, _| {
            Ok(IndicatorOutputs::from([("f_out".to_string(), series.close.clone())]))
        });
        engine.register(clash).unwrap();
        let resolved = engine.resolve(&IndicatorOverrides::new()).unwrap();
        engine.ensure_cached(&resolved).unwrap();
        assert!(matches!(
            engine.view(&resolved),
            Err(Error::Config(ConfigError::DuplicateOutput { .. }))
        ));
    }

    #[test]
    fn wrong_output_length_rejected() {
        let mut engine = IndicatorEngine::new(feed());
        engine
            .register(IndicatorDescriptor::per_instrument("short", ParamSchema::new(), |_, _| {
                Ok(IndicatorOutputs::from([("short".to_string(), vec![1.0])]))
            }))
            .unwrap();
        let resolved = engine.resolve(&IndicatorOverrides::new()).unwrap();
        assert!(matches!(
            engine.ensure_cached(&resolved),
            Err(ConfigError::OutputLength { expected: 10, actual: 1, .. })
        ));
        assert_eq!(engine.cached_blocks(), 0);
    }

    #[test]
    fn cross_instrument_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let mut engine = IndicatorEngine::new(feed());
        engine
            .register(IndicatorDescriptor::cross_instrument(
                "spread",
                ParamSchema::new(),
                move |frame, _| {
                    c.fetch_add(1, Ordering::SeqCst);
                    let a = &frame["AAA"].close;
                    let b = &frame["BBB"].close;
                    Ok(IndicatorOutputs::from([(
                        "spread".to_string(),
                        a.iter().zip(b).map(|(x, y)| y - x).collect(),
                    )]))
                },
            ))
            .unwrap();
        let resolved = engine.resolve(&IndicatorOverrides::new()).unwrap();
        engine.ensure_cached(&resolved).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let view = engine.view(&resolved).unwrap();
        assert_eq!(view.at(3).joint("spread").unwrap(), &[10.0, 10.0, 10.0, 10.0]);
    }
}
