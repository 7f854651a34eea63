//! Mean reversion on Bollinger bands.
//!
//! Long `quantity` when the close drops below the lower band, short when it
//! rises above the upper band, flat once the close crosses back over the
//! middle band.

use anyhow::Context;

use qfin_core::indicators::bollinger::{LOWER, MIDDLE, UPPER};
use qfin_core::{ConfigError, IndicatorSnapshot, ParamSchema, Params, PortfolioLedger, PriceSnapshot};

use super::{positive_quantity, rebalance, Counters};
use crate::strategy::{RunContext, Strategy, StrategyFactory};

pub const NAME: &str = "bollinger_reversion";

#[derive(Debug, Clone, Copy, Default)]
pub struct BollingerReversion;

impl StrategyFactory for BollingerReversion {
    fn name(&self) -> &str {
        NAME
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new().param("quantity", 10.0)
    }

    fn validate(&self, params: &Params) -> Result<(), ConfigError> {
        positive_quantity(params).map(drop)
    }

    fn build(&self, params: &Params, _ctx: &RunContext) -> Result<Box<dyn Strategy>, ConfigError> {
        Ok(Box::new(Trader {
            quantity: positive_quantity(params)?,
            counters: Counters::default(),
        }))
    }
}

struct Trader {
    quantity: f64,
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
            let Some(close) = prices.close(instrument).filter(|c| c.is_finite()) else {
                continue;
            };
            let band = |name: &str| indicators.current(name, instrument).filter(|v| v.is_finite());
            let (Some(lower), Some(middle), Some(upper)) = (band(LOWER), band(MIDDLE), band(UPPER)) else {
                continue;
            };

            let delta = ledger.delta(instrument);
            let target = if close < lower {
                self.quantity
            } else if close > upper {
                -self.quantity
            } else if (delta > 0.0 && close >= middle) || (delta < 0.0 && close <= middle) {
                0.0
            } else {
                delta
            };
            if target != delta {
                let filled = rebalance(ledger, instrument, target)
                    .with_context(|| format!("rebalancing {instrument} at tick {}", prices.tick()))?;
                self.counters.record(filled);
            }
        }
        Ok(())
    }

    fn on_finish(&mut self) -> Option<serde_json::Value> {
        self.counters.payload()
    }
}
