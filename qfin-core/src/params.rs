//! Parameter bindings, schemas and grid expansion.
//!
//! A `Params` is an ordered (`BTreeMap`) binding from parameter name to value,
//! so its canonical JSON form is independent of insertion order. That form is
//! what cache keys and run fingerprints hash.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigError;

// ─── ParamValue ──────────────────────────────────────────────────────

/// A single parameter value.
///
/// Untagged so TOML/JSON scalars deserialize directly. `Int` and `Float` are
/// distinct: `1` and `1.0` are different bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "float",
            ParamValue::Text(_) => "string",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x:?}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

// ─── Params ──────────────────────────────────────────────────────────

/// A parameter binding for one indicator or one strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` on top of `self`.
    pub fn merged(&self, other: &Params) -> Params {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    fn require(&self, name: &str) -> Result<&ParamValue, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::MissingParameter(name.to_string()))
    }

    fn type_error(name: &str, expected: &'static str, value: &ParamValue) -> ConfigError {
        ConfigError::ParamType {
            param: name.to_string(),
            expected,
            actual: format!("{} {}", value.type_name(), value),
        }
    }

    pub fn f64(&self, name: &str) -> Result<f64, ConfigError> {
        let v = self.require(name)?;
        v.as_f64().ok_or_else(|| Self::type_error(name, "number", v))
    }

    pub fn i64(&self, name: &str) -> Result<i64, ConfigError> {
        let v = self.require(name)?;
        v.as_i64().ok_or_else(|| Self::type_error(name, "integer", v))
    }

    pub fn usize(&self, name: &str) -> Result<usize, ConfigError> {
        let v = self.require(name)?;
        v.as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| Self::type_error(name, "non-negative integer", v))
    }

    pub fn bool(&self, name: &str) -> Result<bool, ConfigError> {
        let v = self.require(name)?;
        v.as_bool().ok_or_else(|| Self::type_error(name, "bool", v))
    }

    pub fn str(&self, name: &str) -> Result<&str, ConfigError> {
        let v = self.require(name)?;
        v.as_str().ok_or_else(|| Self::type_error(name, "string", v))
    }

    /// Canonical JSON form (keys sorted by the underlying `BTreeMap`).
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| format!("{:?}", self.0))
    }

    /// Short BLAKE3 digest of the canonical form, for logs.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(self.canonical().as_bytes());
        hash.to_hex()[..16].to_string()
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ─── ParamSchema ─────────────────────────────────────────────────────

/// One declared parameter and its default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub default: ParamValue,
}

/// Ordered list of declared parameters for an indicator or strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    decls: Vec<ParamDecl>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        let name = name.into();
        let default = default.into();
        match self.decls.iter_mut().find(|d| d.name == name) {
            Some(existing) => existing.default = default,
            None => self.decls.push(ParamDecl { name, default }),
        }
        self
    }

    pub fn decls(&self) -> &[ParamDecl] {
        &self.decls
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decls.iter().any(|d| d.name == name)
    }

    pub fn defaults(&self) -> Params {
        self.decls
            .iter()
            .map(|d| (d.name.clone(), d.default.clone()))
            .collect()
    }

    /// Reject any name the schema does not declare.
    pub fn check_names<'a>(
        &self,
        owner: &str,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        for name in names {
            if !self.contains(name) {
                return Err(ConfigError::UnknownParameter {
                    owner: owner.to_string(),
                    param: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Complete `overrides` from `base`, which must be a full binding for
    /// this schema.
    pub fn resolve(&self, owner: &str, base: &Params, overrides: &Params) -> Result<Params, ConfigError> {
        self.check_names(owner, overrides.keys())?;
        Ok(base.merged(overrides))
    }
}

// ─── Ranges and grids ────────────────────────────────────────────────

/// A parameter given either as one value or as a list of candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamSpec {
    Candidates(Vec<ParamValue>),
    Value(ParamValue),
}

impl ParamSpec {
    pub fn value(v: impl Into<ParamValue>) -> Self {
        ParamSpec::Value(v.into())
    }

    pub fn candidates<V: Into<ParamValue>>(values: impl IntoIterator<Item = V>) -> Self {
        ParamSpec::Candidates(values.into_iter().map(Into::into).collect())
    }

    /// Candidate values with duplicates removed, first occurrence kept.
    pub fn values(&self) -> Vec<ParamValue> {
        match self {
            ParamSpec::Value(v) => vec![v.clone()],
            ParamSpec::Candidates(vs) => {
                let mut out: Vec<ParamValue> = Vec::with_capacity(vs.len());
                for v in vs {
                    if !out.contains(v) {
                        out.push(v.clone());
                    }
                }
                out
            }
        }
    }

    /// The value when exactly one is given.
    pub fn single(&self) -> Option<&ParamValue> {
        match self {
            ParamSpec::Value(v) => Some(v),
            ParamSpec::Candidates(vs) if vs.len() == 1 => vs.first(),
            ParamSpec::Candidates(_) => None,
        }
    }
}

impl From<ParamValue> for ParamSpec {
    fn from(v: ParamValue) -> Self {
        ParamSpec::Value(v)
    }
}

/// Candidate sets for the parameters of one indicator or strategy.
pub type ParamRanges = BTreeMap<String, ParamSpec>;

/// Collapse ranges into a binding, rejecting multi-candidate entries.
pub fn scalar_params(ranges: &ParamRanges) -> Result<Params, ConfigError> {
    ranges
        .iter()
        .map(|(name, spec)| {
            spec.single()
                .cloned()
                .map(|v| (name.clone(), v))
                .ok_or_else(|| ConfigError::UnexpectedCandidates(name.clone()))
        })
        .collect()
}

/// Cartesian product over ordered axes. Zero axes yield one empty map.
pub fn cartesian<K: Ord + Clone, V: Clone>(axes: &[(K, Vec<V>)]) -> Vec<BTreeMap<K, V>> {
    let mut combos = vec![BTreeMap::new()];
    for (key, values) in axes {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut c = combo.clone();
                c.insert(key.clone(), value.clone());
                next.push(c);
            }
        }
        combos = next;
    }
    combos
}

/// Expand `ranges` over the complete binding `base`.
///
/// Parameters absent from `ranges` keep their `base` value. The number of
/// bindings is the product of the distinct candidate counts.
pub fn expand_grid(base: &Params, ranges: &ParamRanges) -> Result<Vec<Params>, ConfigError> {
    let mut axes: Vec<(String, Vec<ParamValue>)> = Vec::with_capacity(base.len());
    for (name, default) in base.iter() {
        let values = match ranges.get(name) {
            Some(spec) => spec.values(),
            None => vec![default.clone()],
        };
        if values.is_empty() {
            return Err(ConfigError::EmptyCandidates(name.clone()));
        }
        axes.push((name.clone(), values));
    }
    // Names outside the base binding still vary (schema checks happen upstream).
    for (name, spec) in ranges {
        if !base.contains(name) {
            let values = spec.values();
            if values.is_empty() {
                return Err(ConfigError::EmptyCandidates(name.clone()));
            }
            axes.push((name.clone(), values));
        }
    }
    Ok(cartesian(&axes).into_iter().map(Params).collect())
}
