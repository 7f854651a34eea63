//! Bollinger Bands on the typical price `(high + low + close) / 3`.
//!
//! Emits three outputs: `bollinger_upper`, `bollinger_middle` (rolling mean)
//! and `bollinger_lower`, with bands at `middle ± n_std * stddev`. Population
//! standard deviation (divide by N).

use super::{period_param, IndicatorDescriptor, IndicatorOutputs};
use crate::error::ConfigError;
use crate::feed::InstrumentSeries;
use crate::params::{ParamSchema, Params};

pub const NAME: &str = "bollinger";
pub const UPPER: &str = "bollinger_upper";
pub const MIDDLE: &str = "bollinger_middle";
pub const LOWER: &str = "bollinger_lower";

pub fn descriptor() -> IndicatorDescriptor {
    let schema = ParamSchema::new().param("lookback", 20).param("n_std", 2.0);
    IndicatorDescriptor::per_instrument(NAME, schema, compute)
}

fn compute(series: &InstrumentSeries, params: &Params) -> Result<IndicatorOutputs, ConfigError> {
    let lookback = period_param(params, "lookback")?;
    let n_std = params.f64("n_std")?;
    let typical: Vec<f64> = series
        .high
        .iter()
        .zip(&series.low)
        .zip(&series.close)
        .map(|((h, l), c)| (h + l + c) / 3.0)
        .collect();
    let bands = bands(&typical, lookback, n_std);
    Ok(IndicatorOutputs::from([
        (UPPER.to_string(), bands.upper),
        (MIDDLE.to_string(), bands.middle),
        (LOWER.to_string(), bands.lower),
    ]))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bands(values: &[f64], period: usize, n_std: f64) -> Bands {
    let n = values.len();
    let mut out = Bands {
        upper: vec![f64::NAN; n],
        middle: vec![f64::NAN; n],
        lower: vec![f64::NAN; n],
    };
    if period == 0 || n < period {
        return out;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / period as f64;
        let stddev = variance.sqrt();
        out.middle[i] = mean;
        out.upper[i] = mean + n_std * stddev;
        out.lower[i] = mean - n_std * stddev;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn bands_known_values() {
        // window [2, 4, 4, 4, 5, 5, 7, 9]: mean 5, population stddev 2
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let b = bands(&values, 8, 2.0);
        assert!(b.middle[6].is_nan());
        assert_approx(b.middle[7], 5.0, DEFAULT_EPSILON);
        assert_approx(b.upper[7], 9.0, DEFAULT_EPSILON);
        assert_approx(b.lower[7], 1.0, DEFAULT_EPSILON);
    }

    #[test]
    fn flat_series_collapses_bands() {
        let b = bands(&[3.0; 6], 3, 2.0);
        for i in 2..6 {
            assert_approx(b.upper[i], 3.0, DEFAULT_EPSILON);
            assert_approx(b.lower[i], 3.0, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn uses_typical_price() {
        let series = InstrumentSeries {
            open: vec![0.0; 3],
            high: vec![3.0, 6.0, 9.0],
            low: vec![0.0, 3.0, 6.0],
            close: vec![3.0, 3.0, 3.0],
            volume: vec![0.0; 3],
        };
        let params = Params::new().with("lookback", 1).with("n_std", 2.0);
        let out = compute(&series, &params).unwrap();
        assert_approx(out[MIDDLE][0], 2.0, DEFAULT_EPSILON);
        assert_approx(out[MIDDLE][2], 6.0, DEFAULT_EPSILON);
        assert_approx(out[UPPER][2], 6.0, DEFAULT_EPSILON);
    }

    #[test]
    fn zero_lookback_rejected() {
        let series = InstrumentSeries::from_closes(vec![1.0, 2.0]);
        let params = Params::new().with("lookback", 0).with("n_std", 2.0);
        assert!(matches!(
            compute(&series, &params),
            Err(ConfigError::InvalidParam { .. })
        ));
    }
}
