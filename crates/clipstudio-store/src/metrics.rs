//! Store metrics collection.
//!
//! Provides standardized metrics for monitoring store operations:
//! - Operation counters by backend, operation and outcome
//! - Latency histograms

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total store operations by backend, operation and outcome.
    pub const OPERATIONS_TOTAL: &str = "clipstudio_store_operations_total";

    /// Operation latency in seconds by backend and operation.
    pub const LATENCY_SECONDS: &str = "clipstudio_store_latency_seconds";
}

/// Record metrics for a completed store operation.
pub fn record_operation(backend: &'static str, operation: &'static str, outcome: &'static str, latency_secs: f64) {
    counter!(
        names::OPERATIONS_TOTAL,
        "backend" => backend,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "backend" => backend,
        "operation" => operation
    )
    .record(latency_secs);
}
