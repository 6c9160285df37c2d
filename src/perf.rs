//! Threshold-gated timing of slow operations.

use crate::error::Result;
use crate::library_store::{now_millis, SqliteLibraryStore};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct PerformanceMonitor {
    store: SqliteLibraryStore,
    threshold: Duration,
}

impl PerformanceMonitor {
    pub fn new(store: SqliteLibraryStore, threshold: Duration) -> Self {
        Self { store, threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Run `f`, persisting its duration if it took at least the threshold.
    pub fn measure<T>(
        &self,
        operation: &str,
        metadata: Option<serde_json::Value>,
        f: impl FnOnce() -> T,
    ) -> T {
        self.measure_with(operation, f, |_| metadata)
    }

    /// Like [`measure`](Self::measure), with metadata derived from the result.
    /// `metadata` only runs when the measurement is kept.
    pub fn measure_with<T>(
        &self,
        operation: &str,
        f: impl FnOnce() -> T,
        metadata: impl FnOnce(&T) -> Option<serde_json::Value>,
    ) -> T {
        let started = Instant::now();
        let result = f();
        let elapsed = started.elapsed();
        if elapsed >= self.threshold {
            self.record(operation, elapsed, metadata(&result));
        }
        result
    }

    /// Persist a measurement taken elsewhere. Fast operations are dropped and
    /// storage failures are only logged.
    pub fn record(&self, operation: &str, elapsed: Duration, metadata: Option<serde_json::Value>) {
        if elapsed < self.threshold {
            return;
        }
        let duration_ms = elapsed.as_millis() as i64;
        debug!("Slow operation {} took {}ms", operation, duration_ms);
        if let Err(e) = self
            .store
            .record_metric(operation, duration_ms, metadata.as_ref())
        {
            warn!("Failed to record metric for {}: {}", operation, e);
        }
    }

    /// Remove metrics older than `retention`.
    pub fn prune(&self, retention: Duration) -> Result<usize> {
        let cutoff = now_millis() - retention.as_millis() as i64;
        self.store.prune_metrics_older_than(cutoff)
    }
}
