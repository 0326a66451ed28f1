//! Job lifecycle metrics.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    pub const JOBS_ENQUEUED: &str = "clipstudio_jobs_enqueued_total";
    pub const JOBS_CLAIMED: &str = "clipstudio_jobs_claimed_total";
    /// Claim polls that found nothing to do
    pub const CLAIMS_EMPTY: &str = "clipstudio_claims_empty_total";
    /// Completions by outcome (completed, retried, dead)
    pub const JOBS_COMPLETED: &str = "clipstudio_jobs_completed_total";
    /// Reaped leases by action (reset, dead)
    pub const JOBS_REAPED: &str = "clipstudio_jobs_reaped_total";
    pub const HEARTBEATS: &str = "clipstudio_heartbeats_total";
}

pub fn record_enqueued() {
    counter!(names::JOBS_ENQUEUED).increment(1);
}

pub fn record_claim(found: bool) {
    if found {
        counter!(names::JOBS_CLAIMED).increment(1);
    } else {
        counter!(names::CLAIMS_EMPTY).increment(1);
    }
}

pub fn record_completion(outcome: &'static str) {
    counter!(names::JOBS_COMPLETED, "outcome" => outcome).increment(1);
}

pub fn record_reaped(action: &'static str, count: u64) {
    if count > 0 {
        counter!(names::JOBS_REAPED, "action" => action).increment(count);
    }
}

pub fn record_heartbeat() {
    counter!(names::HEARTBEATS).increment(1);
}
