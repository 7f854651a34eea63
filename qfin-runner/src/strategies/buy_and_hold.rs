//! Buy `quantity` of every instrument on the first tick and hold until
//! wrap-up.

use qfin_core::{ConfigError, IndicatorSnapshot, ParamSchema, Params, PortfolioLedger, PriceSnapshot};

use super::{positive_quantity, Counters};
use crate::strategy::{RunContext, Strategy, StrategyFactory};

pub const NAME: &str = "buy_and_hold";

#[derive(Debug, Clone, Copy, Default)]
pub struct BuyAndHold;

impl StrategyFactory for BuyAndHold {
    fn name(&self) -> &str {
        NAME
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new().param("quantity", 1.0)
    }

    fn validate(&self, params: &Params) -> Result<(), ConfigError> {
        positive_quantity(params).map(drop)
    }

    fn build(&self, params: &Params, _ctx: &RunContext) -> Result<Box<dyn Strategy>, ConfigError> {
        Ok(Box::new(Holder {
            quantity: positive_quantity(params)?,
            bought: false,
            counters: Counters::default(),
        }))
    }
}

struct Holder {
    quantity: f64,
    bought: bool,
    counters: Counters,
}

impl Strategy for Holder {
    fn on_tick(
        &mut self,
        prices: &PriceSnapshot<'_>,
        _indicators: &IndicatorSnapshot<'_>,
        ledger: &mut PortfolioLedger,
    ) -> anyhow::Result<()> {
        if self.bought {
            return Ok(());
        }
        for instrument in prices.instruments() {
            let filled = ledger.order(instrument, self.quantity)?;
            self.counters.record(filled);
        }
        self.bought = true;
        Ok(())
    }

    fn on_finish(&mut self) -> Option<serde_json::Value> {
        self.counters.payload()
    }
}
