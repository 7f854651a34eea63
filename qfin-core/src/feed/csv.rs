//! CSV loader: one `<SYMBOL>.csv` per instrument with columns
//! `time,open,high,low,close,volume`. Every file must carry the same
//! timestamps in the same order.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::{InstrumentSeries, MarketData};
use crate::error::ConfigError;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("unparseable timestamp '{value}' in {path}")]
    Timestamp { path: PathBuf, value: String },

    #[error("{path} is not aligned with {reference}: {detail}")]
    Misaligned {
        path: PathBuf,
        reference: String,
        detail: String,
    },

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

fn parse_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn read_file(path: &Path) -> Result<(Vec<NaiveDateTime>, InstrumentSeries), FeedError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| FeedError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    let mut dates = Vec::new();
    let mut series = InstrumentSeries::default();
    for row in reader.deserialize::<CsvRow>() {
        let row = row.map_err(|source| FeedError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let ts = parse_time(&row.time).ok_or_else(|| FeedError::Timestamp {
            path: path.to_path_buf(),
            value: row.time.clone(),
        })?;
        dates.push(ts);
        series.open.push(row.open);
        series.high.push(row.high);
        series.low.push(row.low);
        series.close.push(row.close);
        series.volume.push(row.volume);
    }
    debug!(path = %path.display(), rows = dates.len(), "read price file");
    Ok((dates, series))
}

/// Load `<dir>/<SYMBOL>.csv` for each instrument into one aligned feed.
pub fn load_csv_dir(dir: &Path, instruments: &[String]) -> Result<MarketData, FeedError> {
    if instruments.is_empty() {
        return Err(ConfigError::InvalidFeed("no instruments requested".into()).into());
    }

    let mut reference: Option<(String, Vec<NaiveDateTime>)> = None;
    let mut series = BTreeMap::new();

    for symbol in instruments {
        let path = dir.join(format!("{symbol}.csv"));
        if !path.exists() {
            return Err(FeedError::Io {
                path,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "price file not found"),
            });
        }
        let (dates, s) = read_file(&path)?;

        if let Some((ref_symbol, ref_dates)) = &reference {
            if ref_dates.len() != dates.len() {
                return Err(FeedError::Misaligned {
                    path,
                    reference: ref_symbol.clone(),
                    detail: format!("{} rows vs {}", dates.len(), ref_dates.len()),
                });
            }
            if let Some(i) = ref_dates.iter().zip(&dates).position(|(a, b)| a != b) {
                return Err(FeedError::Misaligned {
                    path,
                    reference: ref_symbol.clone(),
                    detail: format!("timestamp mismatch at row {i}"),
                });
            }
        } else {
            reference = Some((symbol.clone(), dates));
        }
        series.insert(symbol.clone(), s);
    }

    let dates = reference.map(|(_, d)| d).unwrap_or_default();
    let data = MarketData::new(dates, series)?;
    info!(
        dir = %dir.display(),
        instruments = instruments.len(),
        ticks = data.dates().len(),
        "loaded CSV feed"
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::PriceFeed;
    use std::fs;

    const HEADER: &str = "time,open,high,low,close,volume\n";

    fn write(dir: &Path, name: &str, rows: &[&str]) {
        let mut body = HEADER.to_string();
        for r in rows {
            body.push_str(r);
            body.push('\n');
        }
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn loads_aligned_files() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "AAA.csv",
            &["2024-01-02,1,2,0.5,1.5,100", "2024-01-03,1.5,2,1,1.8,120"],
        );
        write(
            tmp.path(),
            "BBB.csv",
            &["2024-01-02,10,11,9,10.5,50", "2024-01-03,10.5,12,10,11,60"],
        );
        let data = load_csv_dir(tmp.path(), &["AAA".into(), "BBB".into()]).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.series("BBB").unwrap().close, vec![10.5, 11.0]);
        assert_eq!(data.instruments(), &["AAA".to_string(), "BBB".to_string()]);
    }

    #[test]
    fn accepts_intraday_timestamps() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "AAA.csv",
            &["2024-01-02 09:30:00,1,1,1,1,1", "2024-01-02T10:30:00,1,1,1,1,1"],
        );
        let data = load_csv_dir(tmp.path(), &["AAA".into()]).unwrap();
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn rejects_mismatched_timestamps() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "AAA.csv", &["2024-01-02,1,1,1,1,1"]);
        write(tmp.path(), "BBB.csv", &["2024-01-03,1,1,1,1,1"]);
        let err = load_csv_dir(tmp.path(), &["AAA".into(), "BBB".into()]).unwrap_err();
        assert!(matches!(err, FeedError::Misaligned { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_csv_dir(tmp.path(), &["NOPE".into()]).unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
    }

    #[test]
    fn bad_timestamp_reported() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "AAA.csv", &["yesterday,1,1,1,1,1"]);
        let err = load_csv_dir(tmp.path(), &["AAA".into()]).unwrap_err();
        assert!(matches!(err, FeedError::Timestamp { .. }));
    }
}
