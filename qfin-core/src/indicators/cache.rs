//! Memo cache of computed indicator blocks.
//!
//! Blocks are immutable once inserted and handed out as `Arc`s; a key is
//! computed at most once per cache.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::domain::Instrument;
use crate::params::Params;

/// (indicator name, canonical params).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    indicator: String,
    canonical: String,
}

impl CacheKey {
    pub fn new(indicator: &str, params: &Params) -> Self {
        Self {
            indicator: indicator.to_string(),
            canonical: params.canonical(),
        }
    }

    pub fn indicator(&self) -> &str {
        &self.indicator
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Short BLAKE3 digest of the key.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.indicator.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.canonical.as_bytes());
        hasher.finalize().to_hex()[..16].to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.indicator, self.canonical)
    }
}

/// One output of a block, aligned to the full tick range.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSeries {
    PerInstrument(BTreeMap<Instrument, Vec<f64>>),
    Joint(Vec<f64>),
}

/// Every output of one (indicator, params) computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorBlock {
    outputs: BTreeMap<String, OutputSeries>,
}

impl IndicatorBlock {
    pub fn new(outputs: BTreeMap<String, OutputSeries>) -> Self {
        Self { outputs }
    }

    pub fn get(&self, output: &str) -> Option<&OutputSeries> {
        self.outputs.get(output)
    }

    pub fn outputs(&self) -> &BTreeMap<String, OutputSeries> {
        &self.outputs
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct IndicatorCache {
    blocks: HashMap<CacheKey, Arc<IndicatorBlock>>,
}

impl IndicatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&Arc<IndicatorBlock>> {
        self.blocks.get(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.blocks.contains_key(key)
    }

    /// Insert unless present; the first block written for a key wins.
    pub fn insert(&mut self, key: CacheKey, block: IndicatorBlock) -> Arc<IndicatorBlock> {
        Arc::clone(self.blocks.entry(key).or_insert_with(|| Arc::new(block)))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_param_order() {
        let a = CacheKey::new("f", &Params::new().with("a", 1).with("b", 2));
        let b = CacheKey::new("f", &Params::new().with("b", 2).with("a", 1));
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn key_distinguishes_indicator() {
        let p = Params::new().with("period", 5);
        assert_ne!(CacheKey::new("sma", &p), CacheKey::new("ema", &p));
        assert_ne!(
            CacheKey::new("sma", &p).fingerprint(),
            CacheKey::new("ema", &p).fingerprint()
        );
    }

    #[test]
    fn first_insert_wins() {
        let mut cache = IndicatorCache::new();
        let key = CacheKey::new("f", &Params::new());
        let first = cache.insert(
            key.clone(),
            IndicatorBlock::new(BTreeMap::from([("x".to_string(), OutputSeries::Joint(vec![1.0]))])),
        );
        let second = cache.insert(key.clone(), IndicatorBlock::default());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key).unwrap().get("x").is_some());
    }
}
