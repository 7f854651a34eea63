//! Lot: one open entry of a position.

use serde::Serialize;

use super::Side;

/// An open entry: signed quantity, entry price and the entry fee still
/// attached to the remaining quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lot {
    /// Entry sequence number; lots are consumed in increasing order.
    pub seq: u64,
    pub entry_tick: usize,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_fee: f64,
}

impl Lot {
    pub fn side(&self) -> Side {
        if self.quantity >= 0.0 {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn size(&self) -> f64 {
        self.quantity.abs()
    }

    /// Cash paid for a long lot, or net cash received for a short lot.
    pub fn carried_cost(&self) -> f64 {
        let notional = self.size() * self.entry_price;
        match self.side() {
            Side::Buy => notional + self.entry_fee,
            Side::Sell => notional - self.entry_fee,
        }
    }

    /// Mark-to-market P&L at `price`, before any exit fee.
    pub fn unrealized(&self, price: f64) -> f64 {
        let mark = self.size() * price;
        match self.side() {
            Side::Buy => mark - self.carried_cost(),
            Side::Sell => self.carried_cost() - mark,
        }
    }

    /// P&L from closing this whole lot at `price`, net of `exit_fee`.
    pub fn realize(&self, price: f64, exit_fee: f64) -> f64 {
        self.unrealized(price) - exit_fee
    }

    /// Split off `take` units (absolute) from the front of this lot. The entry
    /// fee is shared pro rata.
    pub fn split(&mut self, take: f64) -> Lot {
        let fraction = take / self.size();
        let sign = self.quantity.signum();
        let taken = Lot {
            seq: self.seq,
            entry_tick: self.entry_tick,
            quantity: sign * take,
            entry_price: self.entry_price,
            entry_fee: self.entry_fee * fraction,
        };
        self.quantity -= taken.quantity;
        self.entry_fee -= taken.entry_fee;
        taken
    }
}
