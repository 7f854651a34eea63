//! Seeded random-walk feed for demos, benches and tests.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use super::{InstrumentSeries, MarketData};
use crate::error::ConfigError;

/// `ticks` weekday bars per instrument starting 2020-01-01.
///
/// Each instrument walks with its own drift and volatility; the same seed
/// always produces the same data.
pub fn synthetic(instruments: &[&str], ticks: usize, seed: u64) -> Result<MarketData, ConfigError> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1)
        .ok_or_else(|| ConfigError::InvalidFeed("bad synthetic start date".into()))?;
    let dates = start
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(ticks)
        .filter_map(|d| d.and_hms_opt(0, 0, 0))
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut series = BTreeMap::new();
    for symbol in instruments {
        let drift: f64 = rng.gen_range(-0.0005..0.001);
        let vol: f64 = rng.gen_range(0.005..0.03);
        let mut price: f64 = rng.gen_range(20.0..200.0);
        let mut s = InstrumentSeries::default();
        for _ in 0..ticks {
            let open = price;
            let shock: f64 = rng.gen_range(-1.0..1.0);
            price = (price * (1.0 + drift + vol * shock)).max(0.01);
            let spread = price * vol * rng.gen_range(0.0..1.0);
            s.open.push(open);
            s.high.push(open.max(price) + spread);
            s.low.push((open.min(price) - spread).max(0.01));
            s.close.push(price);
            s.volume.push(rng.gen_range(1_000.0..50_000.0_f64).round());
        }
        series.insert(symbol.to_string(), s);
    }
    MarketData::new(dates, series)
}
