//! Domain types shared by the feed, the indicator engine and the ledger.

pub mod trade;
pub mod window;

pub use trade::TradeRecord;
pub use window::TickWindow;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument identifier (ticker symbol).
pub type Instrument = String;

/// One column of an OHLCV series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measurement {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Measurement {
    pub const ALL: [Measurement; 5] = [
        Measurement::Open,
        Measurement::High,
        Measurement::Low,
        Measurement::Close,
        Measurement::Volume,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Measurement::Open => "open",
            Measurement::High => "high",
            Measurement::Low => "low",
            Measurement::Close => "close",
            Measurement::Volume => "volume",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
