//! Point-in-time copy of the coordinator counters.

use std::fmt;

/// Snapshot of [`CoordinatorMetrics`](super::CoordinatorMetrics) for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub lookups_hit: u64,
    pub lookups_miss: u64,
    pub waiters_registered: u64,
    pub waiters_settled: u64,
    pub waiters_expired: u64,
    pub writes_accepted: u64,
    pub writes_dropped: u64,
    pub protocol_errors: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lookups {}/{} hit/miss, waiters {} registered ({} settled, {} expired), \
             writes {} accepted ({} dropped), {} protocol errors",
            self.lookups_hit,
            self.lookups_miss,
            self.waiters_registered,
            self.waiters_settled,
            self.waiters_expired,
            self.writes_accepted,
            self.writes_dropped,
            self.protocol_errors,
        )
    }
}
