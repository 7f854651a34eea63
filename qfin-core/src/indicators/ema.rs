//! Exponential Moving Average (EMA) of closes.
//!
//! `EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1]`, `alpha = 2 / (period + 1)`,
//! seeded with the SMA of the first `period` values. A NaN taints every later
//! value.

use super::{period_param, IndicatorDescriptor, IndicatorOutputs};
use crate::params::ParamSchema;

pub const NAME: &str = "ema";

pub fn descriptor() -> IndicatorDescriptor {
    IndicatorDescriptor::per_instrument(NAME, ParamSchema::new().param("period", 20), |series, params| {
        let period = period_param(params, "period")?;
        Ok(IndicatorOutputs::from([(NAME.to_string(), ema(&series.close, period))]))
    })
}

pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let seed_window = &values[..period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let mut prev = seed_window.iter().sum::<f64>() / period as f64;
    result[period - 1] = prev;

    let alpha = 2.0 / (period as f64 + 1.0);
    for i in period..n {
        if values[i].is_nan() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}
