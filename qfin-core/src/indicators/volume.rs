//! Combined volume across every instrument, scaled by `mult`.
//!
//! Cross-instrument: invoked once with the whole feed and emits a single
//! joint series.

use super::{IndicatorDescriptor, IndicatorOutputs};
use crate::error::ConfigError;
use crate::feed::FeedFrame;
use crate::params::{ParamSchema, Params};

pub const NAME: &str = "volume_sum";

pub fn descriptor() -> IndicatorDescriptor {
    IndicatorDescriptor::cross_instrument(NAME, ParamSchema::new().param("mult", 1.0), compute)
}

fn compute(frame: &FeedFrame<'_>, params: &Params) -> Result<IndicatorOutputs, ConfigError> {
    let mult = params.f64("mult")?;
    let len = frame.values().next().map_or(0, |s| s.len());
    let mut total = vec![0.0; len];
    for series in frame.values() {
        for (acc, v) in total.iter_mut().zip(&series.volume) {
            *acc += v;
        }
    }
    for v in &mut total {
        *v *= mult;
    }
    Ok(IndicatorOutputs::from([(NAME.to_string(), total)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::InstrumentSeries;

    #[test]
    fn sums_and_scales() {
        let mut a = InstrumentSeries::from_closes(vec![1.0, 1.0]);
        a.volume = vec![10.0, 20.0];
        let mut b = InstrumentSeries::from_closes(vec![1.0, 1.0]);
        b.volume = vec![1.0, f64::NAN];
        let frame: FeedFrame<'_> = [("A", &a), ("B", &b)].into_iter().collect();
        let out = compute(&frame, &Params::new().with("mult", 2.0)).unwrap();
        assert_eq!(out[NAME][0], 22.0);
        assert!(out[NAME][1].is_nan());
    }
}
