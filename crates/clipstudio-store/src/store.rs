//! The job store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use clipstudio_models::{Job, JobId, JobStatus};

use crate::error::StoreResult;

/// Durable, consistent access to job records.
///
/// `compare_and_swap` is the only concurrency primitive the coordinator
/// relies on: a write lands only if the stored record still carries the
/// revision the caller read. Every successful write bumps the revision, so
/// any interleaved write (claim, heartbeat, reap, complete) invalidates
/// the caller's view and surfaces as [`StoreError::Conflict`].
///
/// [`StoreError::Conflict`]: crate::StoreError::Conflict
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Insert a new record. Fails with `AlreadyExists` if the id is taken.
    /// Returns the record as stored (revision 1).
    async fn insert(&self, job: Job) -> StoreResult<Job>;

    /// Point lookup. Fails with `NotFound`.
    async fn get(&self, id: &JobId) -> StoreResult<Job>;

    /// Replace `current` with `next` if the stored revision still equals
    /// `current.revision`. Returns the record as stored.
    ///
    /// Fails with `NotFound` if the record is gone and `Conflict` if it
    /// changed since `current` was read.
    async fn compare_and_swap(&self, current: &Job, next: Job) -> StoreResult<Job>;

    /// All records matching `filter`, oldest `created_at` first.
    async fn scan(&self, filter: &JobFilter) -> StoreResult<Vec<Job>>;

    /// Round trip to the backing store.
    async fn ping(&self) -> StoreResult<()>;

    /// Short backend name for logs and readiness output.
    fn backend_name(&self) -> &'static str;
}

/// Scan predicate: status plus heartbeat staleness.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    /// Only records whose last liveness signal is strictly older than this
    pub heartbeat_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn heartbeat_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.heartbeat_before = Some(cutoff);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Processing jobs whose holder has been silent since before `cutoff`.
    pub fn stale_since(cutoff: DateTime<Utc>) -> Self {
        Self::new().status(JobStatus::Processing).heartbeat_before(cutoff)
    }

    /// The single oldest pending job.
    pub fn oldest_pending() -> Self {
        Self::new().status(JobStatus::Pending).limit(1)
    }

    pub fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        match self.heartbeat_before {
            Some(cutoff) => job.silent_since(cutoff),
            None => true,
        }
    }
}

/// Order records oldest first and apply the limit.
pub(crate) fn finish_scan(mut jobs: Vec<Job>, filter: &JobFilter) -> Vec<Job> {
    jobs.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    if let Some(limit) = filter.limit {
        jobs.truncate(limit);
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use clipstudio_models::JobType;

    fn job_at(now: DateTime<Utc>) -> Job {
        Job::new(JobType::VideoClip, serde_json::json!({}), "u", 3, now)
    }

    #[test]
    fn test_filter_matches_status() {
        let now = Utc::now();
        let job = job_at(now);
        assert!(JobFilter::new().matches(&job));
        assert!(JobFilter::new().status(JobStatus::Pending).matches(&job));
        assert!(!JobFilter::new().status(JobStatus::Processing).matches(&job));
    }

    #[test]
    fn test_filter_matches_staleness() {
        let now = Utc::now();
        let job = job_at(now).claimed_by("w1", now);

        assert!(JobFilter::stale_since(now + Duration::seconds(1)).matches(&job));
        assert!(!JobFilter::stale_since(now).matches(&job));
        assert!(!JobFilter::stale_since(now - Duration::seconds(1)).matches(&job));
    }

    #[test]
    fn test_finish_scan_orders_and_limits() {
        let now = Utc::now();
        let newer = job_at(now);
        let older = job_at(now - Duration::seconds(5));
        let older_id = older.id.clone();

        let out = finish_scan(vec![newer, older], &JobFilter::oldest_pending());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, older_id);
    }
}
