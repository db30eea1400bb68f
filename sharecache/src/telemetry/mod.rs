//! Coordinator telemetry for observability.
//!
//! This module provides activity counters for the coordinator. It uses
//! lock-free atomic counters so recording an event from the hot path costs a
//! single relaxed increment.
//!
//! # Example
//!
//! ```ignore
//! use sharecache::telemetry::CoordinatorMetrics;
//!
//! let metrics = CoordinatorMetrics::new();
//! metrics.lookup_hit();
//! metrics.waiter_registered();
//!
//! let snapshot = metrics.snapshot();
//! println!("hits: {}", snapshot.lookups_hit);
//! ```

mod metrics;
mod snapshot;

pub use metrics::CoordinatorMetrics;
pub use snapshot::MetricsSnapshot;

use tracing_subscriber::EnvFilter;

/// Initializes stdout logging with an env-filter (`RUST_LOG`).
///
/// Falls back to `info` when `RUST_LOG` is unset. Call once at process
/// startup; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
