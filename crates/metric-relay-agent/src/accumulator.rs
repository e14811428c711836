//! Concurrent metric accumulator.
//!
//! Samplers write into the accumulator; the dispatcher drains it once
//! per report wave and resets it. Gauges overwrite, counters sum.
//! Readers always receive a point-in-time copy, never a live view.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Partitions {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// Thread-safe gauge/counter container shared between samplers and the
/// dispatcher. All operations are total and infallible.
#[derive(Debug, Default)]
pub struct MetricAccumulator {
    inner: RwLock<Partitions>,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a gauge sample, replacing any prior value for `id`.
    pub fn add_gauge(&self, id: &str, value: f64) {
        self.write().gauges.insert(id.to_string(), value);
    }

    /// Add `delta` to the counter `id`, initializing it on first write.
    ///
    /// The read-modify-write happens under the write lock, so
    /// concurrent deltas to the same counter never lose updates.
    pub fn add_counter(&self, id: &str, delta: i64) {
        *self.write().counters.entry(id.to_string()).or_insert(0) += delta;
    }

    /// Snapshot copy of all gauges.
    pub fn all_gauges(&self) -> HashMap<String, f64> {
        self.read().gauges.clone()
    }

    /// Snapshot copy of all counters.
    pub fn all_counters(&self) -> HashMap<String, i64> {
        self.read().counters.clone()
    }

    /// Clear both partitions. Called by the dispatcher after a wave has
    /// been enqueued; concurrent adds land either before the clear
    /// (part of the sent wave) or after (part of the next one).
    pub fn reset(&self) {
        let mut inner = self.write();
        inner.gauges.clear();
        inner.counters.clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, Partitions> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Partitions> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "accumulator_tests.rs"]
mod tests;
