//! Error taxonomy for the core engine.
//!
//! Three families, matching how callers are expected to react:
//! - `ConfigError`: the request itself is malformed (unknown names, bad sizes).
//! - `RangeError`: the request is well-formed but the data cannot satisfy it.
//! - `StateError`: an operation was issued in the wrong lifecycle state.
//!
//! Expected business rejections (limit breaches, closing a flat position) are
//! not errors; the ledger reports them as `Ok(false)`.

use chrono::NaiveDate;
use thiserror::Error;

use crate::feed::FeedError;

/// Malformed or unknown configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown indicator '{0}'")]
    UnknownIndicator(String),

    #[error("unknown parameter '{param}' for '{owner}'")]
    UnknownParameter { owner: String, param: String },

    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    #[error("parameter '{param}' expected {expected}, got {actual}")]
    ParamType {
        param: String,
        expected: &'static str,
        actual: String,
    },

    #[error("invalid value for parameter '{param}': {reason}")]
    InvalidParam { param: String, reason: String },

    #[error("parameter '{0}' has an empty candidate list")]
    EmptyCandidates(String),

    #[error("parameter '{0}' lists several candidates where a single value is required")]
    UnexpectedCandidates(String),

    #[error("indicator '{0}' is already registered with a different schema")]
    SchemaConflict(String),

    #[error("output '{output}' is emitted by both '{first}' and '{second}'")]
    DuplicateOutput {
        output: String,
        first: String,
        second: String,
    },

    #[error("indicator '{indicator}' output '{output}' has {actual} values, expected {expected}")]
    OutputLength {
        indicator: String,
        output: String,
        expected: usize,
        actual: usize,
    },

    #[error("indicator '{indicator}' did not emit output '{output}' for '{instrument}'")]
    MissingOutput {
        indicator: String,
        output: String,
        instrument: String,
    },

    #[error("unknown instrument '{0}'")]
    UnknownInstrument(String),

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("order sizing requires exactly one of quantity or value")]
    AmbiguousSizing,

    #[error("invalid order size {0}")]
    InvalidSize(f64),

    #[error("fee rate must be in [0, 1), got {0}")]
    InvalidFee(f64),

    #[error("position limit for '{instrument}' must be non-negative, got {limit}")]
    InvalidLimit { instrument: String, limit: f64 },

    #[error("invalid day count: {0}")]
    InvalidDays(String),

    #[error("fold count must be at least 1")]
    InvalidFolds,

    #[error("starting capital must be positive, got {0}")]
    InvalidCapital(f64),

    #[error("invalid feed: {0}")]
    InvalidFeed(String),
}

/// Requested window does not fit the available data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("feed contains no ticks")]
    EmptyFeed,

    #[error("requested {days} trading days but the data covers only {available}")]
    NotEnoughDays { days: usize, available: usize },

    #[error(
        "window starting {start} spanning {days} trading days falls outside the data ({first} to {last})"
    )]
    WindowOutOfRange {
        start: NaiveDate,
        days: usize,
        first: NaiveDate,
        last: NaiveDate,
    },

    #[error("cannot sample {folds} distinct windows from {candidates} candidate start days")]
    TooManyFolds { folds: usize, candidates: usize },
}

/// Operation issued in the wrong lifecycle state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("indicator '{indicator}' with params {params} has not been cached")]
    NotCached { indicator: String, params: String },

    #[error("ledger has been wrapped up")]
    LedgerClosed,

    #[error("order placed before the first advance")]
    NotAdvanced,

    #[error("tick {got} does not follow tick {last}")]
    TickOutOfOrder { last: usize, got: usize },
}

/// Any core error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("range error: {0}")]
    Range(#[from] RangeError),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),
}
