//! Growing-window access to cached indicator outputs.
//!
//! A view maps output names to cached series. Snapshots and streams slice
//! those series up to the current tick; nothing is copied, and any number of
//! cursors can share one view.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::cache::OutputSeries;
use crate::domain::{Instrument, TickWindow};

#[derive(Debug, Clone)]
pub struct IndicatorView<'a> {
    outputs: Arc<BTreeMap<&'a str, &'a OutputSeries>>,
    len: usize,
}

impl<'a> IndicatorView<'a> {
    pub(crate) fn new(outputs: BTreeMap<&'a str, &'a OutputSeries>, len: usize) -> Self {
        Self {
            outputs: Arc::new(outputs),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn output_names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.outputs.keys().copied()
    }

    /// Snapshot at `tick`.
    pub fn at(&self, tick: usize) -> IndicatorSnapshot<'a> {
        IndicatorSnapshot {
            outputs: Arc::clone(&self.outputs),
            tick,
        }
    }

    /// Cursor over `window`, clamped to the feed length.
    pub fn stream(&self, window: TickWindow) -> IndicatorStream<'a> {
        IndicatorStream {
            outputs: Arc::clone(&self.outputs),
            next: window.start,
            end: window.end.min(self.len),
        }
    }

    /// Cursor over the whole feed.
    pub fn stream_all(&self) -> IndicatorStream<'a> {
        self.stream(TickWindow::full(self.len))
    }
}

/// Indicator values visible at one tick.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot<'a> {
    outputs: Arc<BTreeMap<&'a str, &'a OutputSeries>>,
    tick: usize,
}

/// One output at one tick.
#[derive(Debug, Clone, Copy)]
pub enum SnapshotEntry<'a> {
    PerInstrument(InstrumentWindows<'a>),
    Joint(&'a [f64]),
}

/// Per-instrument growing windows of one output.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentWindows<'a> {
    series: &'a BTreeMap<Instrument, Vec<f64>>,
    tick: usize,
}

impl<'a> InstrumentWindows<'a> {
    pub fn get(&self, instrument: &str) -> Option<&'a [f64]> {
        self.series.get(instrument).and_then(|v| v.get(..=self.tick))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a [f64])> + '_ {
        self.series
            .iter()
            .filter_map(|(k, v)| v.get(..=self.tick).map(|s| (k.as_str(), s)))
    }
}

impl<'a> IndicatorSnapshot<'a> {
    pub fn tick(&self) -> usize {
        self.tick
    }

    pub fn output_names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.outputs.keys().copied()
    }

    pub fn get(&self, output: &str) -> Option<SnapshotEntry<'a>> {
        let series: &'a OutputSeries = self.outputs.get(output).copied()?;
        Some(match series {
            OutputSeries::PerInstrument(map) => SnapshotEntry::PerInstrument(InstrumentWindows {
                series: map,
                tick: self.tick,
            }),
            OutputSeries::Joint(values) => SnapshotEntry::Joint(values.get(..=self.tick)?),
        })
    }

    /// Growing window of a per-instrument output.
    pub fn per_instrument(&self, output: &str, instrument: &str) -> Option<&'a [f64]> {
        match self.get(output)? {
            SnapshotEntry::PerInstrument(w) => w.get(instrument),
            SnapshotEntry::Joint(_) => None,
        }
    }

    /// Growing window of a cross-instrument output.
    pub fn joint(&self, output: &str) -> Option<&'a [f64]> {
        match self.get(output)? {
            SnapshotEntry::Joint(values) => Some(values),
            SnapshotEntry::PerInstrument(_) => None,
        }
    }

    /// Value at the current tick of a per-instrument output.
    pub fn current(&self, output: &str, instrument: &str) -> Option<f64> {
        self.per_instrument(output, instrument)?.last().copied()
    }

    pub fn current_joint(&self, output: &str) -> Option<f64> {
        self.joint(output)?.last().copied()
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorStream<'a> {
    outputs: Arc<BTreeMap<&'a str, &'a OutputSeries>>,
    next: usize,
    end: usize,
}

impl<'a> Iterator for IndicatorStream<'a> {
    type Item = IndicatorSnapshot<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let snap = IndicatorSnapshot {
            outputs: Arc::clone(&self.outputs),
            tick: self.next,
        };
        self.next += 1;
        Some(snap)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end.saturating_sub(self.next);
        (n, Some(n))
    }
}

impl ExactSizeIterator for IndicatorStream<'_> {}
