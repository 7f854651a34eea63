//! Relative Strength Index with Wilder smoothing.
//!
//! First value at index `period`. `avg_loss == 0` gives 100, `avg_gain == 0`
//! gives 0, no movement at all gives 50.

use super::{period_param, IndicatorDescriptor, IndicatorOutputs};
use crate::params::ParamSchema;

pub const NAME: &str = "rsi";

pub fn descriptor() -> IndicatorDescriptor {
    IndicatorDescriptor::per_instrument(NAME, ParamSchema::new().param("period", 14), |series, params| {
        let period = period_param(params, "period")?;
        Ok(IndicatorOutputs::from([(NAME.to_string(), rsi(&series.close, period))]))
    })
}

pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let change = |i: usize| values[i] - values[i - 1];

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let ch = change(i);
        if ch.is_nan() {
            return result;
        }
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = rsi_value(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let ch = change(i);
        if ch.is_nan() {
            break;
        }
        avg_gain = alpha * ch.max(0.0) + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * (-ch).max(0.0) + (1.0 - alpha) * avg_loss;
        result[i] = rsi_value(avg_gain, avg_loss);
    }
    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
