//! Atomic activity counters for the coordinator.

use std::sync::atomic::{AtomicU64, Ordering};

use super::snapshot::MetricsSnapshot;

/// Lock-free counters recording what the coordinator has done.
///
/// Shared between the coordinator task (writer) and any number of handles
/// (readers via [`CoordinatorMetrics::snapshot`]).
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    /// `get` answered from a settled entry.
    lookups_hit: AtomicU64,

    /// `get` answered for an absent key.
    lookups_miss: AtomicU64,

    /// Reads suspended on a pending entry.
    waiters_registered: AtomicU64,

    /// Waiters released by a settlement.
    waiters_settled: AtomicU64,

    /// Waiters released by their own deadline.
    waiters_expired: AtomicU64,

    /// `set` calls that passed the write-race rule.
    writes_accepted: AtomicU64,

    /// `set` calls dropped for losing the race.
    writes_dropped: AtomicU64,

    /// Malformed requests answered with an error.
    protocol_errors: AtomicU64,
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_hit(&self) {
        self.lookups_hit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lookup_miss(&self) {
        self.lookups_miss.fetch_add(1, Ordering::Relaxed);
    }

    pub fn waiter_registered(&self) {
        self.waiters_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn waiter_settled(&self) {
        self.waiters_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn waiter_expired(&self) {
        self.waiters_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_accepted(&self) {
        self.writes_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_dropped(&self) {
        self.writes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy for display.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lookups_hit: self.lookups_hit.load(Ordering::Relaxed),
            lookups_miss: self.lookups_miss.load(Ordering::Relaxed),
            waiters_registered: self.waiters_registered.load(Ordering::Relaxed),
            waiters_settled: self.waiters_settled.load(Ordering::Relaxed),
            waiters_expired: self.waiters_expired.load(Ordering::Relaxed),
            writes_accepted: self.writes_accepted.load(Ordering::Relaxed),
            writes_dropped: self.writes_dropped.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_snapshot() {
        let metrics = CoordinatorMetrics::new();
        metrics.lookup_hit();
        metrics.lookup_hit();
        metrics.lookup_miss();
        metrics.waiter_registered();
        metrics.waiter_settled();
        metrics.write_accepted();
        metrics.write_dropped();
        metrics.protocol_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lookups_hit, 2);
        assert_eq!(snapshot.lookups_miss, 1);
        assert_eq!(snapshot.waiters_registered, 1);
        assert_eq!(snapshot.waiters_settled, 1);
        assert_eq!(snapshot.waiters_expired, 0);
        assert_eq!(snapshot.writes_accepted, 1);
        assert_eq!(snapshot.writes_dropped, 1);
        assert_eq!(snapshot.protocol_errors, 1);
    }
}
