use serde::Serialize;
use std::collections::VecDeque;

use super::lot::Lot;
use super::QUANTITY_EPSILON;

/// Per-instrument position: open lots in entry order plus running totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Position {
    pub(crate) delta: f64,
    pub(crate) fees_paid: f64,
    pub(crate) realized: f64,
    pub(crate) lots: VecDeque<Lot>,
}

impl Position {
    /// Net signed quantity.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn fees_paid(&self) -> f64 {
        self.fees_paid
    }

    /// Realized P&L, net of the fees of every closed fraction.
    pub fn realized(&self) -> f64 {
        self.realized
    }

    pub fn lots(&self) -> &VecDeque<Lot> {
        &self.lots
    }

    pub fn is_flat(&self) -> bool {
        self.delta.abs() <= QUANTITY_EPSILON
    }

    /// Realized plus open-lot P&L at `price`.
    pub fn value_at(&self, price: f64) -> f64 {
        self.realized + self.lots.iter().map(|l| l.unrealized(price)).sum::<f64>()
    }

    pub(crate) fn recompute_delta(&mut self) {
        let delta: f64 = self.lots.iter().map(|l| l.quantity).sum();
        self.delta = if delta.abs() <= QUANTITY_EPSILON { 0.0 } else { delta };
    }
}
