//! Window selection: explicit start dates or seeded random sampling.
//!
//! Windows are measured in distinct calendar days, not ticks, so intraday
//! feeds get whole days. A window's end is the first tick of the day `days`
//! after its start, or the end of the feed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use qfin_core::feed::TradingDay;
use qfin_core::rng::SeedHierarchy;
use qfin_core::{ConfigError, Error, PriceFeed, RangeError, TickWindow};

/// Window length in trading days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "DaysRepr", into = "DaysRepr")]
pub enum Days {
    /// The whole feed.
    #[default]
    All,
    Count(usize),
}

impl Days {
    pub fn validate(self) -> Result<Self, ConfigError> {
        match self {
            Days::Count(0) => Err(ConfigError::InvalidDays("must be at least 1".into())),
            d => Ok(d),
        }
    }
}

impl fmt::Display for Days {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Days::All => f.write_str("all"),
            Days::Count(n) => write!(f, "{n}"),
        }
    }
}

/// TOML/JSON form: the string "all" or an integer.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DaysRepr {
    Count(usize),
    Word(String),
}

impl TryFrom<DaysRepr> for Days {
    type Error = ConfigError;

    fn try_from(repr: DaysRepr) -> Result<Self, Self::Error> {
        match repr {
            DaysRepr::Count(n) => Days::Count(n).validate(),
            DaysRepr::Word(w) if w.eq_ignore_ascii_case("all") => Ok(Days::All),
            DaysRepr::Word(w) => Err(ConfigError::InvalidDays(format!(
                "expected \"all\" or an integer, got \"{w}\""
            ))),
        }
    }
}

impl From<Days> for DaysRepr {
    fn from(days: Days) -> Self {
        match days {
            Days::All => DaysRepr::Word("all".into()),
            Days::Count(n) => DaysRepr::Count(n),
        }
    }
}

/// Pick the windows one run evaluates.
///
/// With `starts`, one window per start date (the first trading day on or
/// after it; a start before the first day of data is out of range) and `cv`
/// is ignored; `Days::All` then runs to the end of the
/// feed. Otherwise `cv` distinct start days are sampled uniformly from those
/// where a full window fits, in ascending order. `Days::All` ignores the seed
/// and repeats the full range.
pub fn select_windows(
    feed: &dyn PriceFeed,
    days: Days,
    starts: &[NaiveDate],
    cv: usize,
    seed: u64,
) -> Result<Vec<TickWindow>, Error> {
    if cv == 0 {
        return Err(ConfigError::InvalidFolds.into());
    }
    days.validate()?;
    let calendar = feed.trading_days();
    if calendar.is_empty() {
        return Err(RangeError::EmptyFeed.into());
    }

    let span = match days {
        Days::All => calendar.len(),
        Days::Count(n) if n > calendar.len() => {
            return Err(RangeError::NotEnoughDays {
                days: n,
                available: calendar.len(),
            }
            .into())
        }
        Days::Count(n) => n,
    };

    let windows = if !starts.is_empty() {
        explicit_windows(feed, &calendar, days, starts)?
    } else if days == Days::All {
        vec![TickWindow::full(feed.len()); cv]
    } else {
        let candidates = calendar.len() - span + 1;
        if cv > candidates {
            return Err(RangeError::TooManyFolds {
                folds: cv,
                candidates,
            }
            .into());
        }
        let mut rng = SeedHierarchy::new(seed).window_rng();
        let mut picked = rand::seq::index::sample(&mut rng, candidates, cv).into_vec();
        picked.sort_unstable();
        picked
            .into_iter()
            .map(|i| window_at(feed, &calendar, i, span))
            .collect()
    };

    info!(
        days = %days,
        folds = windows.len(),
        seed,
        explicit = !starts.is_empty(),
        "selected windows"
    );
    for w in &windows {
        debug!(window = %w, "window");
    }
    Ok(windows)
}

fn explicit_windows(
    feed: &dyn PriceFeed,
    calendar: &[TradingDay],
    days: Days,
    starts: &[NaiveDate],
) -> Result<Vec<TickWindow>, RangeError> {
    let first = calendar[0].date;
    let last = calendar[calendar.len() - 1].date;
    starts
        .iter()
        .map(|&start| {
            if start < first {
                return Err(RangeError::WindowOutOfRange {
                    start,
                    days: match days {
                        Days::All => calendar.len(),
                        Days::Count(n) => n,
                    },
                    first,
                    last,
                });
            }
            let i = calendar.partition_point(|d| d.date < start);
            // `All` runs from the start day to the end of the feed
            let span = match days {
                Days::All => calendar.len().saturating_sub(i).max(1),
                Days::Count(n) => n,
            };
            if i + span > calendar.len() {
                Err(RangeError::WindowOutOfRange {
                    start,
                    days: span,
                    first,
                    last,
                })
            } else {
                Ok(window_at(feed, calendar, i, span))
            }
        })
        .collect()
}

fn window_at(feed: &dyn PriceFeed, calendar: &[TradingDay], day: usize, span: usize) -> TickWindow {
    let start = calendar[day].first_tick;
    let end = calendar
        .get(day + span)
        .map_or(feed.len(), |d| d.first_tick);
    TickWindow::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qfin_core::feed::synthetic;

    fn feed(ticks: usize) -> qfin_core::MarketData {
        synthetic(&["AAA"], ticks, 1).unwrap()
    }

    #[test]
    fn all_repeats_full_range() {
        let f = feed(30);
        let w = select_windows(&f, Days::All, &[], 3, 0).unwrap();
        assert_eq!(w, vec![TickWindow::full(30); 3]);
    }

    #[test]
    fn sampled_windows_span_days() {
        let f = feed(100);
        let w = select_windows(&f, Days::Count(5), &[], 4, 42).unwrap();
        assert_eq!(w.len(), 4);
        for win in &w {
            assert_eq!(win.len(), 5);
            assert!(win.end <= 100);
        }
        let starts: Vec<usize> = w.iter().map(|w| w.start).collect();
        let mut sorted = starts.clone();
        sorted.dedup();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn sampling_draws_from_the_window_rng() {
        let f = feed(50);
        let w = select_windows(&f, Days::Count(10), &[], 3, 11).unwrap();
        let mut rng = SeedHierarchy::new(11).window_rng();
        let mut picked = rand::seq::index::sample(&mut rng, 41, 3).into_vec();
        picked.sort_unstable();
        let starts: Vec<usize> = w.iter().map(|w| w.start).collect();
        assert_eq!(starts, picked);
    }

    #[test]
    fn window_can_end_at_feed_end() {
        let f = feed(10);
        let w = select_windows(&f, Days::Count(10), &[], 1, 9).unwrap();
        assert_eq!(w, vec![TickWindow::full(10)]);
    }

    #[test]
    fn too_many_days_or_folds() {
        let f = feed(10);
        assert!(matches!(
            select_windows(&f, Days::Count(11), &[], 1, 0),
            Err(Error::Range(RangeError::NotEnoughDays { days: 11, available: 10 }))
        ));
        assert!(matches!(
            select_windows(&f, Days::Count(8), &[], 4, 0),
            Err(Error::Range(RangeError::TooManyFolds { folds: 4, candidates: 3 }))
        ));
        assert!(matches!(
            select_windows(&f, Days::Count(2), &[], 0, 0),
            Err(Error::Config(ConfigError::InvalidFolds))
        ));
    }

    #[test]
    fn explicit_start_rounds_forward_to_trading_day() {
        let f = feed(20);
        // 2020-01-04 is a Saturday; the next bar is Monday 2020-01-06 (tick 3)
        let start = NaiveDate::from_ymd_opt(2020, 1, 4).unwrap();
        let w = select_windows(&f, Days::Count(5), &[start], 7, 0).unwrap();
        assert_eq!(w, vec![TickWindow::new(3, 8)]);
    }

    #[test]
    fn explicit_start_outside_data() {
        let f = feed(20);
        let late = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert!(matches!(
            select_windows(&f, Days::Count(5), &[late], 1, 0),
            Err(Error::Range(RangeError::WindowOutOfRange { .. }))
        ));
    }

    #[test]
    fn explicit_start_before_data() {
        let f = feed(20);
        let early = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        assert!(matches!(
            select_windows(&f, Days::Count(5), &[early], 1, 0),
            Err(Error::Range(RangeError::WindowOutOfRange { .. }))
        ));
        assert!(select_windows(&f, Days::All, &[early], 1, 0).is_err());

        // the first day itself is inside the data
        let first = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert_eq!(
            select_windows(&f, Days::Count(5), &[first], 1, 0).unwrap(),
            vec![TickWindow::new(0, 5)]
        );
    }

    #[test]
    fn days_parse_from_toml_scalars() {
        #[derive(Deserialize)]
        struct W {
            days: Days,
        }
        let all: W = toml::from_str("days = \"all\"").unwrap();
        assert_eq!(all.days, Days::All);
        let n: W = toml::from_str("days = 30").unwrap();
        assert_eq!(n.days, Days::Count(30));
        assert!(toml::from_str::<W>("days = 0").is_err());
        assert!(toml::from_str::<W>("days = \"some\"").is_err());
    }
}
