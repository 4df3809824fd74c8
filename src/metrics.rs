//! Injectable timing sink.
//!
//! Detection and registration durations are reported through a sink supplied
//! by the caller instead of global counters, so embedding applications decide
//! what to do with them.

use std::collections::HashMap;
use std::time::Duration;

/// Receiver for labeled processing durations.
pub trait MetricsSink {
    fn record(&mut self, label: &str, duration: Duration);
}

impl<M: MetricsSink + ?Sized> MetricsSink for &mut M {
    fn record(&mut self, label: &str, duration: Duration) {
        (**self).record(label, duration);
    }
}

/// Discards every measurement. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn record(&mut self, _label: &str, _duration: Duration) {}
}

/// Accumulates call counts and total durations per label.
#[derive(Debug, Default)]
pub struct AccumulatingMetrics {
    totals: HashMap<String, (usize, Duration)>,
}

impl AccumulatingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recordings under `label`.
    pub fn count(&self, label: &str) -> usize {
        self.totals.get(label).map_or(0, |(count, _)| *count)
    }

    /// Total duration accumulated under `label`.
    pub fn total(&self, label: &str) -> Duration {
        self.totals
            .get(label)
            .map_or(Duration::ZERO, |(_, total)| *total)
    }
}

impl MetricsSink for AccumulatingMetrics {
    fn record(&mut self, label: &str, duration: Duration) {
        let entry = self
            .totals
            .entry(label.to_owned())
            .or_insert((0, Duration::ZERO));
        entry.0 += 1;
        entry.1 += duration;
    }
}
