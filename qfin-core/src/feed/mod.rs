//! Price feed: aligned OHLCV series per instrument plus growing-window views.
//!
//! `PriceSnapshot` for tick `i` only exposes indices `0..=i`; the underlying
//! columns are borrowed, never copied.

pub mod csv;
pub mod synthetic;

pub use self::csv::{load_csv_dir, FeedError};
pub use synthetic::synthetic;

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::{Instrument, Measurement, TickWindow};
use crate::error::ConfigError;

// ─── Series ──────────────────────────────────────────────────────────

/// Dense OHLCV columns for one instrument, aligned to the feed's ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentSeries {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl InstrumentSeries {
    /// Series where open/high/low equal the close and volume is zero.
    pub fn from_closes(close: Vec<f64>) -> Self {
        Self {
            open: close.clone(),
            high: close.clone(),
            low: close.clone(),
            volume: vec![0.0; close.len()],
            close,
        }
    }

    pub fn column(&self, m: Measurement) -> &[f64] {
        match m {
            Measurement::Open => &self.open,
            Measurement::High => &self.high,
            Measurement::Low => &self.low,
            Measurement::Close => &self.close,
            Measurement::Volume => &self.volume,
        }
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    fn is_aligned(&self) -> bool {
        let n = self.close.len();
        Measurement::ALL.iter().all(|m| self.column(*m).len() == n)
    }
}

/// All instruments' series, keyed by instrument, as handed to
/// cross-instrument indicators.
pub type FeedFrame<'a> = BTreeMap<&'a str, &'a InstrumentSeries>;

// ─── PriceFeed ───────────────────────────────────────────────────────

/// Source of aligned historical series.
pub trait PriceFeed: Send + Sync {
    /// Instruments in a fixed order.
    fn instruments(&self) -> &[Instrument];

    /// Number of ticks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp of `tick`, `None` past the end.
    fn date_at(&self, tick: usize) -> Option<NaiveDateTime>;

    fn series(&self, instrument: &str) -> Option<&InstrumentSeries>;

    fn column(&self, instrument: &str, measurement: Measurement) -> Option<&[f64]> {
        self.series(instrument).map(|s| s.column(measurement))
    }
}

impl<'f> dyn PriceFeed + 'f {
    /// Growing-window view at `tick`.
    pub fn snapshot(&self, tick: usize) -> PriceSnapshot<'_> {
        PriceSnapshot { feed: self, tick }
    }

    /// Lazy snapshot sequence over `window`.
    pub fn stream(&self, window: TickWindow) -> PriceStream<'_> {
        PriceStream {
            feed: self,
            next: window.start,
            end: window.end.min(self.len()),
        }
    }

    /// Each distinct calendar day with the first tick that falls on it.
    pub fn trading_days(&self) -> Vec<TradingDay> {
        let mut days: Vec<TradingDay> = Vec::new();
        for tick in 0..self.len() {
            let Some(ts) = self.date_at(tick) else { break };
            let date = ts.date();
            if days.last().map_or(true, |d| d.date != date) {
                days.push(TradingDay {
                    date,
                    first_tick: tick,
                });
            }
        }
        days
    }
}

/// Calendar day present in the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingDay {
    pub date: NaiveDate,
    pub first_tick: usize,
}

// ─── Snapshots ───────────────────────────────────────────────────────

/// Prices visible at one tick: every column truncated to `0..=tick`.
#[derive(Clone, Copy)]
pub struct PriceSnapshot<'a> {
    feed: &'a dyn PriceFeed,
    tick: usize,
}

impl<'a> PriceSnapshot<'a> {
    pub fn tick(&self) -> usize {
        self.tick
    }

    pub fn date(&self) -> Option<NaiveDateTime> {
        self.feed.date_at(self.tick)
    }

    pub fn instruments(&self) -> &'a [Instrument] {
        self.feed.instruments()
    }

    /// Growing window of one column.
    pub fn history(&self, instrument: &str, measurement: Measurement) -> Option<&'a [f64]> {
        self.feed
            .column(instrument, measurement)
            .and_then(|col| col.get(..=self.tick))
    }

    /// Current value of one column.
    pub fn current(&self, instrument: &str, measurement: Measurement) -> Option<f64> {
        self.feed
            .column(instrument, measurement)
            .and_then(|col| col.get(self.tick).copied())
    }

    /// Current close, the price orders execute at.
    pub fn close(&self, instrument: &str) -> Option<f64> {
        self.current(instrument, Measurement::Close)
    }
}

impl fmt::Debug for PriceSnapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceSnapshot")
            .field("tick", &self.tick)
            .field("instruments", &self.feed.instruments())
            .finish()
    }
}

/// Restartable cursor over a window; clone it for an independent cursor.
#[derive(Clone)]
pub struct PriceStream<'a> {
    feed: &'a dyn PriceFeed,
    next: usize,
    end: usize,
}

impl<'a> Iterator for PriceStream<'a> {
    type Item = PriceSnapshot<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let snap = PriceSnapshot {
            feed: self.feed,
            tick: self.next,
        };
        self.next += 1;
        Some(snap)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end.saturating_sub(self.next);
        (n, Some(n))
    }
}

impl ExactSizeIterator for PriceStream<'_> {}

// ─── MarketData ──────────────────────────────────────────────────────

/// In-memory feed.
#[derive(Debug, Clone)]
pub struct MarketData {
    instruments: Vec<Instrument>,
    dates: Vec<NaiveDateTime>,
    series: BTreeMap<Instrument, InstrumentSeries>,
}

impl MarketData {
    /// Validates that every series matches the date index and that dates
    /// strictly increase.
    pub fn new(
        dates: Vec<NaiveDateTime>,
        series: BTreeMap<Instrument, InstrumentSeries>,
    ) -> Result<Self, ConfigError> {
        if series.is_empty() {
            return Err(ConfigError::InvalidFeed("no instruments".into()));
        }
        if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ConfigError::InvalidFeed(format!(
                "timestamps not strictly increasing at {}",
                w[1]
            )));
        }
        for (inst, s) in &series {
            if !s.is_aligned() || s.len() != dates.len() {
                return Err(ConfigError::InvalidFeed(format!(
                    "'{inst}' has {} rows, expected {}",
                    s.len(),
                    dates.len()
                )));
            }
        }
        Ok(Self {
            instruments: series.keys().cloned().collect(),
            dates,
            series,
        })
    }

    /// Daily close-only feed starting at `start`, one tick per calendar day.
    pub fn from_closes(
        start: NaiveDate,
        closes: impl IntoIterator<Item = (impl Into<Instrument>, Vec<f64>)>,
    ) -> Result<Self, ConfigError> {
        let series: BTreeMap<Instrument, InstrumentSeries> = closes
            .into_iter()
            .map(|(k, v)| (k.into(), InstrumentSeries::from_closes(v)))
            .collect();
        let len = series.values().next().map_or(0, InstrumentSeries::len);
        let dates = start
            .iter_days()
            .take(len)
            .filter_map(|d| d.and_hms_opt(0, 0, 0))
            .collect();
        Self::new(dates, series)
    }

    pub fn dates(&self) -> &[NaiveDateTime] {
        &self.dates
    }
}

impl PriceFeed for MarketData {
    fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    fn len(&self) -> usize {
        self.dates.len()
    }

    fn date_at(&self, tick: usize) -> Option<NaiveDateTime> {
        self.dates.get(tick).copied()
    }

    fn series(&self, instrument: &str) -> Option<&InstrumentSeries> {
        self.series.get(instrument)
    }
}
