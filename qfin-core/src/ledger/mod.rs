//! PortfolioLedger: per-run position book with FIFO lots and fee-aware P&L.
//!
//! Lifecycle: `advance` once per tick in increasing order, any number of
//! orders after it, then `wrap_up` exactly once. Orders execute at the current
//! close. A limit breach or a close against a flat position returns
//! `Ok(false)` and leaves every field untouched.

pub mod lot;
pub mod position;

pub use lot::Lot;
pub use position::Position;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::domain::{Instrument, TradeRecord};
use crate::error::{ConfigError, Error, StateError};
use crate::feed::PriceSnapshot;

/// Quantities at or below this are treated as zero.
pub const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Side of a signed quantity; `None` for zero.
    pub fn of(quantity: f64) -> Option<Side> {
        if quantity > 0.0 {
            Some(Side::Buy)
        } else if quantity < 0.0 {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

/// Order size: a share count or a cash amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sizing {
    Quantity(f64),
    Value(f64),
}

impl Sizing {
    /// Exactly one of `quantity` and `value` must be given.
    pub fn from_parts(quantity: Option<f64>, value: Option<f64>) -> Result<Self, ConfigError> {
        match (quantity, value) {
            (Some(q), None) => Ok(Sizing::Quantity(q)),
            (None, Some(v)) => Ok(Sizing::Value(v)),
            _ => Err(ConfigError::AmbiguousSizing),
        }
    }

    /// Unsigned share count at `price` with multiplicative fee `fee`.
    ///
    /// Cash buys spend `value` including the fee; cash sells receive `value`
    /// after the fee.
    pub fn shares(self, side: Side, price: f64, fee: f64) -> Result<f64, ConfigError> {
        let raw = match self {
            Sizing::Quantity(q) | Sizing::Value(q) => q,
        };
        if !raw.is_finite() || raw < 0.0 {
            return Err(ConfigError::InvalidSize(raw));
        }
        Ok(match self {
            Sizing::Quantity(q) => q,
            Sizing::Value(v) => match side {
                Side::Buy => v / (price * (1.0 + fee)),
                Side::Sell => v / (price * (1.0 - fee)),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Multiplicative fee rate charged on every fill's notional.
    pub fee: f64,
    /// Absolute position limit for instruments without an override.
    pub default_limit: f64,
    pub limits: BTreeMap<Instrument, f64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fee: 0.001,
            default_limit: f64::INFINITY,
            limits: BTreeMap::new(),
        }
    }
}

impl LedgerConfig {
    pub fn new(fee: f64, default_limit: f64) -> Self {
        Self {
            fee,
            default_limit,
            limits: BTreeMap::new(),
        }
    }

    pub fn with_limit(mut self, instrument: impl Into<Instrument>, limit: f64) -> Self {
        self.limits.insert(instrument.into(), limit);
        self
    }

    pub fn limit_for(&self, instrument: &str) -> f64 {
        self.limits.get(instrument).copied().unwrap_or(self.default_limit)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.fee) {
            return Err(ConfigError::InvalidFee(self.fee));
        }
        let defaults = std::iter::once(("*", self.default_limit));
        for (instrument, limit) in defaults.chain(self.limits.iter().map(|(k, v)| (k.as_str(), *v))) {
            if limit.is_nan() || limit < 0.0 {
                return Err(ConfigError::InvalidLimit {
                    instrument: instrument.to_string(),
                    limit,
                });
            }
        }
        Ok(())
    }
}

/// Everything a finished ledger hands to result aggregation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerOutput {
    /// Mark-to-market value per instrument, one entry per advanced tick.
    pub values: BTreeMap<Instrument, Vec<f64>>,
    pub trades: Vec<TradeRecord>,
    pub fees_paid: BTreeMap<Instrument, f64>,
    pub realized: BTreeMap<Instrument, f64>,
}

impl LedgerOutput {
    pub fn total_realized(&self) -> f64 {
        self.realized.values().sum()
    }

    pub fn total_fees(&self) -> f64 {
        self.fees_paid.values().sum()
    }

    /// Capital plus the summed value of every instrument at each tick.
    pub fn equity_curve(&self, starting_capital: f64) -> Vec<f64> {
        let len = self.values.values().map(Vec::len).max().unwrap_or(0);
        (0..len)
            .map(|t| {
                starting_capital
                    + self
                        .values
                        .values()
                        .filter_map(|v| v.get(t))
                        .sum::<f64>()
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    config: LedgerConfig,
    instruments: Vec<Instrument>,
    positions: BTreeMap<Instrument, Position>,
    prices: BTreeMap<Instrument, f64>,
    marks: BTreeMap<Instrument, f64>,
    values: BTreeMap<Instrument, Vec<f64>>,
    trades: Vec<TradeRecord>,
    tick: Option<usize>,
    next_seq: u64,
    closed: bool,
}

impl PortfolioLedger {
    pub fn new(instruments: &[Instrument], config: LedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if let Some(unknown) = config.limits.keys().find(|k| !instruments.contains(k)) {
            return Err(ConfigError::UnknownInstrument(unknown.clone()));
        }
        Ok(Self {
            positions: instruments.iter().map(|i| (i.clone(), Position::default())).collect(),
            values: instruments.iter().map(|i| (i.clone(), Vec::new())).collect(),
            instruments: instruments.to_vec(),
            prices: BTreeMap::new(),
            marks: BTreeMap::new(),
            trades: Vec::new(),
            tick: None,
            next_seq: 0,
            closed: false,
            config,
        })
    }

    // ── Queries ──

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn tick(&self) -> Option<usize> {
        self.tick
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument)
    }

    pub fn delta(&self, instrument: &str) -> f64 {
        self.positions.get(instrument).map_or(0.0, Position::delta)
    }

    pub fn fees_paid(&self, instrument: &str) -> f64 {
        self.positions.get(instrument).map_or(0.0, Position::fees_paid)
    }

    pub fn realized(&self, instrument: &str) -> f64 {
        self.positions.get(instrument).map_or(0.0, Position::realized)
    }

    pub fn total_realized(&self) -> f64 {
        self.positions.values().map(Position::realized).sum()
    }

    pub fn limit(&self, instrument: &str) -> f64 {
        self.config.limit_for(instrument)
    }

    /// Current tick's close, `None` before the first advance or on a void bar.
    pub fn price(&self, instrument: &str) -> Option<f64> {
        self.prices.get(instrument).copied().filter(|p| p.is_finite())
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn values(&self, instrument: &str) -> Option<&[f64]> {
        self.values.get(instrument).map(Vec::as_slice)
    }

    // ── Lifecycle ──

    /// Move to the snapshot's tick and append one value per instrument.
    pub fn advance(&mut self, prices: &PriceSnapshot<'_>) -> Result<(), StateError> {
        self.ensure_open()?;
        let tick = prices.tick();
        if let Some(last) = self.tick {
            if tick <= last {
                return Err(StateError::TickOutOfOrder { last, got: tick });
            }
        }
        self.tick = Some(tick);

        for instrument in &self.instruments {
            let price = prices.close(instrument).unwrap_or(f64::NAN);
            self.prices.insert(instrument.clone(), price);
            if price.is_finite() {
                self.marks.insert(instrument.clone(), price);
            }
            let position = &self.positions[instrument];
            let value = match self.marks.get(instrument) {
                Some(mark) => position.value_at(*mark),
                None => position.realized(),
            };
            if let Some(history) = self.values.get_mut(instrument) {
                history.push(value);
            }
        }
        trace!(tick, "ledger advanced");
        Ok(())
    }

    /// Signed share order: positive buys, negative sells.
    pub fn order(&mut self, instrument: &str, quantity: f64) -> Result<bool, Error> {
        match Side::of(quantity) {
            Some(side) => self.submit(instrument, Sizing::Quantity(quantity.abs()), side),
            None => {
                self.ready(instrument)?;
                Ok(false)
            }
        }
    }

    /// Cash-sized order.
    pub fn order_value(&mut self, instrument: &str, value: f64, side: Side) -> Result<bool, Error> {
        self.submit(instrument, Sizing::Value(value), side)
    }

    /// Order from optional quantity/value arguments; exactly one must be set.
    pub fn order_sized(
        &mut self,
        instrument: &str,
        quantity: Option<f64>,
        value: Option<f64>,
        side: Side,
    ) -> Result<bool, Error> {
        let sizing = Sizing::from_parts(quantity, value)?;
        self.submit(instrument, sizing, side)
    }

    /// Execute `sizing` in direction `side` unless it would breach the limit.
    pub fn submit(&mut self, instrument: &str, sizing: Sizing, side: Side) -> Result<bool, Error> {
        let tick = self.ready(instrument)?;
        let Some(price) = self.price(instrument) else {
            let shares = sizing.shares(side, 1.0, self.config.fee)?;
            debug!(instrument, shares, "order on void price rejected");
            return Ok(false);
        };
        let shares = sizing.shares(side, price, self.config.fee)?;
        if shares <= QUANTITY_EPSILON {
            return Ok(false);
        }

        let signed = side.sign() * shares;
        let delta = self.delta(instrument);
        let limit = self.limit(instrument);
        if (delta + signed).abs() > limit + QUANTITY_EPSILON {
            debug!(instrument, delta, signed, limit, "order rejected by position limit");
            return Ok(false);
        }

        self.execute(instrument, tick, price, signed);
        Ok(true)
    }

    /// Reduce-only order; quantity is capped at the open position.
    pub fn close(&mut self, instrument: &str, sizing: Sizing) -> Result<bool, Error> {
        let tick = self.ready(instrument)?;
        let delta = self.delta(instrument);
        let Some(side) = Side::of(delta).map(Side::opposite) else {
            sizing.shares(Side::Sell, 1.0, self.config.fee)?;
            return Ok(false);
        };
        let Some(price) = self.price(instrument) else {
            return Ok(false);
        };
        let shares = sizing.shares(side, price, self.config.fee)?.min(delta.abs());
        if shares <= QUANTITY_EPSILON {
            return Ok(false);
        }
        self.execute(instrument, tick, price, side.sign() * shares);
        Ok(true)
    }

    /// Close the whole position.
    pub fn flatten(&mut self, instrument: &str) -> Result<bool, Error> {
        let size = self.delta(instrument).abs();
        self.close(instrument, Sizing::Quantity(size))
    }

    /// Close every open position at its last valid mark and end the run.
    pub fn wrap_up(&mut self) -> Result<LedgerOutput, StateError> {
        self.ensure_open()?;
        if let Some(tick) = self.tick {
            for instrument in self.instruments.clone() {
                let delta = self.delta(&instrument);
                if delta == 0.0 {
                    continue;
                }
                if let Some(mark) = self.marks.get(&instrument).copied() {
                    self.execute(&instrument, tick, mark, -delta);
                }
            }
        }
        self.closed = true;

        let output = LedgerOutput {
            values: std::mem::take(&mut self.values),
            trades: std::mem::take(&mut self.trades),
            fees_paid: self
                .positions
                .iter()
                .map(|(k, p)| (k.clone(), p.fees_paid()))
                .collect(),
            realized: self
                .positions
                .iter()
                .map(|(k, p)| (k.clone(), p.realized()))
                .collect(),
        };
        debug!(
            trades = output.trades.len(),
            realized = output.total_realized(),
            "ledger wrapped up"
        );
        Ok(output)
    }

    // ── Internals ──

    fn ensure_open(&self) -> Result<(), StateError> {
        if self.closed {
            Err(StateError::LedgerClosed)
        } else {
            Ok(())
        }
    }

    /// Checks shared by every order entry point; returns the current tick.
    fn ready(&self, instrument: &str) -> Result<usize, Error> {
        self.ensure_open()?;
        let tick = self.tick.ok_or(StateError::NotAdvanced)?;
        if !self.positions.contains_key(instrument) {
            return Err(ConfigError::UnknownInstrument(instrument.to_string()).into());
        }
        Ok(tick)
    }

    /// Apply an already-validated signed fill. Reducing quantity consumes lots
    /// FIFO; any remainder opens a new lot on the other side.
    fn execute(&mut self, instrument: &str, tick: usize, price: f64, signed: f64) {
        let fee_rate = self.config.fee;
        let Some(position) = self.positions.get_mut(instrument) else {
            return;
        };

        let mut remaining = signed.abs();
        let mut closed_quantity = 0.0;
        let mut realized = 0.0;
        let mut fee_total = 0.0;

        let reducing = position.delta != 0.0 && position.delta.signum() != signed.signum();
        if reducing {
            while remaining > QUANTITY_EPSILON {
                let Some(front_size) = position.lots.front().map(Lot::size) else {
                    break;
                };
                let take = remaining.min(front_size);
                let consumed = if front_size - take <= QUANTITY_EPSILON {
                    match position.lots.pop_front() {
                        Some(lot) => lot,
                        None => break,
                    }
                } else {
                    match position.lots.front_mut() {
                        Some(lot) => lot.split(take),
                        None => break,
                    }
                };
                let take = consumed.size();
                let exit_fee = take * price * fee_rate;
                realized += consumed.realize(price, exit_fee);
                fee_total += exit_fee;
                closed_quantity += take;
                remaining -= take;
            }
        }

        if remaining > QUANTITY_EPSILON {
            let entry_fee = remaining * price * fee_rate;
            position.lots.push_back(Lot {
                seq: self.next_seq,
                entry_tick: tick,
                quantity: signed.signum() * remaining,
                entry_price: price,
                entry_fee,
            });
            self.next_seq += 1;
            fee_total += entry_fee;
        }

        position.fees_paid += fee_total;
        position.realized += realized;
        position.recompute_delta();

        debug!(
            instrument,
            tick,
            quantity = signed,
            price,
            fee = fee_total,
            realized,
            delta = position.delta,
            "order filled"
        );
        self.trades.push(TradeRecord {
            tick,
            instrument: instrument.to_string(),
            quantity: signed,
            price,
            fee: fee_total,
            closed_quantity,
            realized,
        });
    }
}
