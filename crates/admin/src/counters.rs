//! Lock-free atomic counters for stage observability.
//!
//! All fields use `Ordering::Relaxed` — these are monotonic counters where
//! eventual visibility is acceptable for dashboard/status reads. Handlers
//! return per-message results; the worker loop records them here so the
//! admin surface aggregates at the edge instead of mutating handler state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

pub struct StageCounters {
    started_at: Instant,
    /// Messages pulled off the queue.
    pub received: AtomicU64,
    /// Messages processed to completion.
    pub succeeded: AtomicU64,
    /// Messages skipped as already done (idempotent re-delivery).
    pub skipped: AtomicU64,
    /// Messages that failed terminally (deleted).
    pub failed: AtomicU64,
    /// Messages left for redelivery (transient failure or contention).
    pub retried: AtomicU64,
}

/// Serializable snapshot for `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct CountersSnapshot {
    pub received: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub retried: u64,
    pub uptime_secs: u64,
}

impl StageCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            received: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            received: self.received.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for StageCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let counters = StageCounters::new();
        counters.received.fetch_add(5, Ordering::Relaxed);
        counters.succeeded.fetch_add(3, Ordering::Relaxed);
        counters.retried.fetch_add(2, Ordering::Relaxed);

        let snap = counters.snapshot();
        assert_eq!(snap.received, 5);
        assert_eq!(snap.succeeded, 3);
        assert_eq!(snap.retried, 2);
        assert_eq!(snap.failed, 0);
    }
}
