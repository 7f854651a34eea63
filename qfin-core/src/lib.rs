//! qfin core: price feed, memoized indicator engine, and the position ledger.
//!
//! This crate contains the backtest execution primitives:
//! - Aligned OHLCV feeds with growing-window (no-lookahead) snapshots
//! - An indicator registry and a cache keyed by canonical parameters
//! - Parameter schemas and grid expansion
//! - A lot-based ledger with position limits and fee-aware realized P&L
//! - Deterministic seed derivation

pub mod domain;
pub mod error;
pub mod feed;
pub mod indicators;
pub mod ledger;
pub mod params;
pub mod rng;

pub use domain::{Instrument, Measurement, TickWindow, TradeRecord};
pub use error::{ConfigError, Error, RangeError, StateError};
pub use feed::{MarketData, PriceFeed, PriceSnapshot, PriceStream};
pub use indicators::{
    IndicatorDescriptor, IndicatorEngine, IndicatorOverrides, IndicatorRanges, IndicatorSnapshot,
    IndicatorView, ResolvedIndicators,
};
pub use ledger::{LedgerConfig, LedgerOutput, PortfolioLedger, Side, Sizing};
pub use params::{ParamRanges, ParamSchema, ParamSpec, ParamValue, Params};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a parallel sweep shares or returns is
    /// Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<MarketData>();
        require_sync::<MarketData>();
        require_send::<IndicatorEngine>();
        require_sync::<IndicatorEngine>();
        require_send::<IndicatorView<'static>>();
        require_sync::<IndicatorView<'static>>();
        require_send::<IndicatorSnapshot<'static>>();
        require_sync::<IndicatorSnapshot<'static>>();
        require_send::<ResolvedIndicators>();
        require_sync::<ResolvedIndicators>();
        require_send::<PortfolioLedger>();
        require_sync::<PortfolioLedger>();
        require_send::<LedgerOutput>();
        require_sync::<LedgerOutput>();
        require_send::<Params>();
        require_sync::<Params>();
        require_send::<Error>();
        require_sync::<Error>();
        require_send::<rng::SeedHierarchy>();
        require_sync::<rng::SeedHierarchy>();
    }

    /// Architecture contract: indicator functions only see price series and
    /// their own parameters, never the ledger.
    #[test]
    fn indicator_functions_cannot_see_the_ledger() {
        fn _check(
            f: &indicators::PerInstrumentFn,
            series: &feed::InstrumentSeries,
            params: &Params,
        ) -> Result<indicators::IndicatorOutputs, ConfigError> {
            f(series, params)
        }
    }
}
