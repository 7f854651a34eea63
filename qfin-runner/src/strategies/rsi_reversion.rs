//! RSI mean reversion: long below `oversold`, short above `overbought`,
//! holding in between.

use qfin_core::indicators::rsi;
use qfin_core::{ConfigError, IndicatorSnapshot, ParamSchema, Params, PortfolioLedger, PriceSnapshot};

use super::{positive_quantity, rebalance, Counters};
use crate::strategy::{RunContext, Strategy, StrategyFactory};

pub const NAME: &str = "rsi_reversion";

#[derive(Debug, Clone, Copy, Default)]
pub struct RsiReversion;

impl StrategyFactory for RsiReversion {
    fn name(&self) -> &str {
        NAME
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .param("quantity", 10.0)
            .param("oversold", 30.0)
            .param("overbought", 70.0)
    }

    fn validate(&self, params: &Params) -> Result<(), ConfigError> {
        Thresholds::from_params(params).map(drop)
    }

    fn build(&self, params: &Params, _ctx: &RunContext) -> Result<Box<dyn Strategy>, ConfigError> {
        let Thresholds {
            quantity,
            oversold,
            overbought,
        } = Thresholds::from_params(params)?;
        Ok(Box::new(Trader {
            quantity,
            oversold,
            overbought,
            counters: Counters::default(),
        }))
    }
}

struct Thresholds {
    quantity: f64,
    oversold: f64,
    overbought: f64,
}

impl Thresholds {
    fn from_params(params: &Params) -> Result<Self, ConfigError> {
        let quantity = positive_quantity(params)?;
        let oversold = params.f64("oversold")?;
        let overbought = params.f64("overbought")?;
        if !(0.0..=100.0).contains(&oversold) || !(oversold..=100.0).contains(&overbought) {
            return Err(ConfigError::InvalidParam {
                param: "overbought".into(),
                reason: format!("need 0 <= oversold <= overbought <= 100, got {oversold} and {overbought}"),
            });
        }
        Ok(Self {
            quantity,
            oversold,
            overbought,
        })
    }
}

struct Trader {
    quantity: f64,
    oversold: f64,
    overbought: f64,
    counters: Counters,
}

impl Strategy for Trader {
    fn on_tick(
        &mut self,
        prices: &PriceSnapshot<'_>,
        indicators: &IndicatorSnapshot<'_>,
        ledger: &mut PortfolioLedger,
    ) -> anyhow::Result<()> {
        for instrument in prices.instruments() {
            let Some(value) = indicators.current(rsi::NAME, instrument).filter(|v| v.is_finite()) else {
                continue;
            };
            let target = if value < self.oversold {
                self.quantity
            } else if value > self.overbought {
                -self.quantity
            } else {
                continue;
            };
            if target != ledger.delta(instrument) {
                let filled = rebalance(ledger, instrument, target)?;
                self.counters.record(filled);
            }
        }
        Ok(())
    }

    fn on_finish(&mut self) -> Option<serde_json::Value> {
        self.counters.payload()
    }
}
