//! Built-in demo strategies, looked up by name from configuration.

pub mod bollinger_reversion;
pub mod buy_and_hold;
pub mod rsi_reversion;

use std::sync::Arc;

use qfin_core::ledger::QUANTITY_EPSILON;
use qfin_core::{ConfigError, Params, PortfolioLedger};

use crate::strategy::StrategyFactory;

pub use bollinger_reversion::BollingerReversion;
pub use buy_and_hold::BuyAndHold;
pub use rsi_reversion::RsiReversion;

/// Names accepted by [`builtin`].
pub const NAMES: [&str; 3] = [
    bollinger_reversion::NAME,
    rsi_reversion::NAME,
    buy_and_hold::NAME,
];

pub fn builtin(name: &str) -> Result<Arc<dyn StrategyFactory>, ConfigError> {
    match name {
        bollinger_reversion::NAME => Ok(Arc::new(BollingerReversion)),
        rsi_reversion::NAME => Ok(Arc::new(RsiReversion)),
        buy_and_hold::NAME => Ok(Arc::new(BuyAndHold)),
        other => Err(ConfigError::UnknownStrategy(other.to_string())),
    }
}

/// The `quantity` parameter, which must be finite and positive.
pub(crate) fn positive_quantity(params: &Params) -> Result<f64, ConfigError> {
    let quantity = params.f64("quantity")?;
    if !(quantity.is_finite() && quantity > 0.0) {
        return Err(ConfigError::InvalidParam {
            param: "quantity".into(),
            reason: format!("must be positive, got {quantity}"),
        });
    }
    Ok(quantity)
}

/// Order the difference between `target` and the current position.
///
/// Returns whether an order was filled; a limit rejection is `Ok(false)`.
pub(crate) fn rebalance(
    ledger: &mut PortfolioLedger,
    instrument: &str,
    target: f64,
) -> Result<bool, qfin_core::Error> {
    let diff = target - ledger.delta(instrument);
    if diff.abs() <= QUANTITY_EPSILON {
        return Ok(false);
    }
    ledger.order(instrument, diff)
}

/// Fill counters reported as the strategy payload.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub(crate) struct Counters {
    pub filled: usize,
    pub rejected: usize,
}

impl Counters {
    pub fn record(&mut self, filled: bool) {
        if filled {
            self.filled += 1;
        } else {
            self.rejected += 1;
        }
    }

    pub fn payload(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_resolves() {
        for name in NAMES {
            assert_eq!(builtin(name).unwrap().name(), name);
        }
        assert_eq!(
            builtin("nope").err(),
            Some(ConfigError::UnknownStrategy("nope".into()))
        );
    }

    #[test]
    fn every_builtin_rejects_bad_quantity() {
        for name in NAMES {
            let factory = builtin(name).unwrap();
            let defaults = factory.schema().defaults();
            factory.validate(&defaults).unwrap();
            for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
                let params = defaults.clone().with("quantity", bad);
                assert!(
                    matches!(factory.validate(&params), Err(ConfigError::InvalidParam { .. })),
                    "{name} accepted quantity {bad}"
                );
            }
            let text = defaults.clone().with("quantity", "ten");
            assert!(matches!(factory.validate(&text), Err(ConfigError::ParamType { .. })));
        }
    }

    #[test]
    fn rsi_thresholds_must_be_ordered() {
        let factory = builtin(rsi_reversion::NAME).unwrap();
        let params = factory.schema().defaults().with("oversold", 90.0);
        assert!(matches!(
            factory.validate(&params),
            Err(ConfigError::InvalidParam { .. })
        ));
    }
}
