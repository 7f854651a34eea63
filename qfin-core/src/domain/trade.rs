//! TradeRecord: one immutable log entry per accepted order.

use serde::{Deserialize, Serialize};

use super::Instrument;

/// Ledger log entry appended on every accepted order call.
///
/// `quantity` is signed (positive = bought, negative = sold). `closed_quantity`
/// is the part of the order that consumed existing lots; only that part
/// contributes to `realized`, which is already net of both legs' fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub tick: usize,
    pub instrument: Instrument,
    pub quantity: f64,
    pub price: f64,
    pub fee: f64,
    pub closed_quantity: f64,
    pub realized: f64,
}

impl TradeRecord {
    pub fn is_buy(&self) -> bool {
        self.quantity > 0.0
    }

    /// True if the order reduced an existing position.
    pub fn is_closing(&self) -> bool {
        self.closed_quantity > 0.0
    }

    pub fn notional(&self) -> f64 {
        self.quantity.abs() * self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_and_direction() {
        let trade = TradeRecord {
            tick: 4,
            instrument: "AAPL".into(),
            quantity: -2.0,
            price: 50.0,
            fee: 0.1,
            closed_quantity: 2.0,
            realized: 9.8,
        };
        assert!(!trade.is_buy());
        assert!(trade.is_closing());
        assert!((trade.notional() - 100.0).abs() < 1e-12);
    }
}
