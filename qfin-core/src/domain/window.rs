use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Half-open tick range `[start, end)` covered by one backtest execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickWindow {
    pub start: usize,
    pub end: usize,
}

impl TickWindow {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "window start {start} after end {end}");
        Self { start, end }
    }

    /// Window covering every tick of a feed of length `len`.
    pub fn full(len: usize) -> Self {
        Self { start: 0, end: len }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, tick: usize) -> bool {
        tick >= self.start && tick < self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for TickWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
