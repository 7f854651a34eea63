//! TOML backtest configuration.
//!
//! ```toml
//! [data]
//! instruments = ["AAA", "BBB"]
//! csv_dir = "data"                      # or: synthetic = { ticks = 500, seed = 7 }
//!
//! [backtest]
//! strategy = "bollinger_reversion"
//! days = 60                             # or "all"
//! cash = 1000.0
//! fee = 0.001
//! position_limit = 100.0
//! limits = { AAA = 50.0 }
//! cv = 3
//! seed = 42
//! parallel = true
//!
//! [strategy_params]
//! quantity = [5.0, 10.0]
//!
//! [indicator_params.bollinger]
//! lookback = [10, 20]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use qfin_core::feed::{load_csv_dir, synthetic};
use qfin_core::params::scalar_params;
use qfin_core::{ConfigError, IndicatorOverrides, IndicatorRanges, Instrument, ParamRanges, Params, PriceFeed};

use crate::backtester::{Backtester, BacktesterConfig};
use crate::strategies;
use crate::window::Days;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] qfin_core::Error),
}

impl From<ConfigError> for ConfigFileError {
    fn from(e: ConfigError) -> Self {
        ConfigFileError::Core(e.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktestConfig {
    pub data: DataSection,
    #[serde(default)]
    pub backtest: BacktestSection,
    #[serde(default)]
    pub strategy_params: ParamRanges,
    #[serde(default)]
    pub indicator_params: IndicatorRanges,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSection {
    pub instruments: Vec<Instrument>,
    /// Directory of `<SYMBOL>.csv` files, relative to the config file.
    pub csv_dir: Option<PathBuf>,
    pub synthetic: Option<SyntheticSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyntheticSection {
    pub ticks: usize,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BacktestSection {
    pub strategy: String,
    pub days: Days,
    pub cash: f64,
    pub fee: f64,
    pub position_limit: f64,
    pub limits: BTreeMap<Instrument, f64>,
    pub cv: usize,
    pub seed: Option<u64>,
    pub parallel: bool,
}

impl Default for BacktestSection {
    fn default() -> Self {
        let defaults = BacktesterConfig::default();
        Self {
            strategy: strategies::bollinger_reversion::NAME.to_string(),
            days: defaults.days,
            cash: defaults.starting_capital,
            fee: defaults.fee,
            position_limit: defaults.position_limit,
            limits: BTreeMap::new(),
            cv: 1,
            seed: None,
            parallel: defaults.parallel,
        }
    }
}

impl BacktestConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        let config: BacktestConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Structural checks that need no data.
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        if self.data.instruments.is_empty() {
            return Err(ConfigFileError::Invalid("data.instruments is empty".into()));
        }
        match (&self.data.csv_dir, &self.data.synthetic) {
            (Some(_), Some(_)) => {
                return Err(ConfigFileError::Invalid(
                    "set only one of data.csv_dir and data.synthetic".into(),
                ))
            }
            (None, None) => {
                return Err(ConfigFileError::Invalid(
                    "set one of data.csv_dir or data.synthetic".into(),
                ))
            }
            _ => {}
        }
        if self.backtest.cv == 0 {
            return Err(ConfigError::InvalidFolds.into());
        }
        strategies::builtin(&self.backtest.strategy)?;
        self.backtester_config().validate()?;
        Ok(())
    }

    /// Load the configured feed; `base_dir` anchors a relative `csv_dir`.
    pub fn load_feed(&self, base_dir: &Path) -> Result<Arc<dyn PriceFeed>, ConfigFileError> {
        let data = match (&self.data.csv_dir, &self.data.synthetic) {
            (Some(dir), _) => {
                let dir = if dir.is_absolute() {
                    dir.clone()
                } else {
                    base_dir.join(dir)
                };
                load_csv_dir(&dir, &self.data.instruments).map_err(qfin_core::Error::from)?
            }
            (None, Some(s)) => {
                let symbols: Vec<&str> = self.data.instruments.iter().map(String::as_str).collect();
                synthetic(&symbols, s.ticks, s.seed)?
            }
            (None, None) => {
                return Err(ConfigFileError::Invalid("no data source configured".into()))
            }
        };
        info!(
            instruments = data.instruments().len(),
            ticks = data.len(),
            "loaded feed"
        );
        Ok(Arc::new(data))
    }

    pub fn backtester_config(&self) -> BacktesterConfig {
        BacktesterConfig {
            days: self.backtest.days,
            starting_capital: self.backtest.cash,
            fee: self.backtest.fee,
            position_limit: self.backtest.position_limit,
            limits: self.backtest.limits.clone(),
            parallel: self.backtest.parallel,
        }
    }

    /// Strategy parameters as a single binding; rejects candidate lists.
    pub fn strategy_overrides(&self) -> Result<Params, ConfigError> {
        scalar_params(&self.strategy_params)
    }

    /// Indicator parameters as single bindings; rejects candidate lists.
    pub fn indicator_overrides(&self) -> Result<IndicatorOverrides, ConfigError> {
        self.indicator_params
            .iter()
            .map(|(name, ranges)| Ok((name.clone(), scalar_params(ranges)?)))
            .collect()
    }

    /// Backtester over `feed` with the configured strategy.
    pub fn build_backtester(&self, feed: Arc<dyn PriceFeed>) -> Result<Backtester, ConfigFileError> {
        let strategy = strategies::builtin(&self.backtest.strategy)?;
        Ok(Backtester::with_builtins(feed, strategy, self.backtester_config())?)
    }
}
