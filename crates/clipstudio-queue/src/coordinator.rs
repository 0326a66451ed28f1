//! Lease coordinator.
//!
//! Binds pending jobs to workers, tracks their liveness and records their
//! outcome. It holds no state of its own: every decision is made on a
//! freshly read record and written back with a compare-and-swap, so any
//! number of coordinator instances can serve the same store.
//!
//! ```text
//! pending ──claim──▶ processing ──complete(ok)──────────▶ done
//!    ▲                  │   │
//!    │                  │   └──complete(err), attempts left──▶ pending
//!    └──reap (silent)───┘   └──complete(err), exhausted──────▶ dead
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use clipstudio_models::{CompleteRequest, CompletionOutcome, CompletionStatus, FailureDisposition, Job, JobId, JobStatus};
use clipstudio_store::{JobFilter, JobStore};

use crate::clock::{Clock, SystemClock};
use crate::config::{stale_cutoff, CoordinatorConfig};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::metrics;

/// Error recorded on a job buried after too many reaped leases.
pub const REAP_LIMIT_ERROR: &str = "lease expired too many times";

/// Adds worker-facing fields to a claimed job (for example credentials the
/// render needs). Only the copy returned to the worker is changed.
#[async_trait]
pub trait ClaimAugmenter: Send + Sync + 'static {
    async fn augment(&self, job: &mut Job) -> CoordinatorResult<()>;
}

/// Leaves claimed jobs untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAugmenter;

#[async_trait]
impl ClaimAugmenter for NoopAugmenter {
    async fn augment(&self, _job: &mut Job) -> CoordinatorResult<()> {
        Ok(())
    }
}

/// Outcome a worker reports for its job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(Option<serde_json::Value>),
    Failure(String),
}

impl From<CompleteRequest> for JobOutcome {
    fn from(req: CompleteRequest) -> Self {
        match req.status {
            CompletionStatus::Completed => JobOutcome::Success(req.result),
            CompletionStatus::Failed => {
                JobOutcome::Failure(req.error.unwrap_or_else(|| "unknown error".to_string()))
            }
        }
    }
}

/// Result of one sweep over expired leases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Returned to pending
    pub reset: u32,
    /// Buried after exceeding the reap cap
    pub dead: u32,
    /// Skipped because the record changed under us
    pub conflicts: u32,
}

impl ReapReport {
    pub fn reaped(&self) -> u32 {
        self.reset + self.dead
    }
}

pub struct LeaseCoordinator {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    augmenter: Arc<dyn ClaimAugmenter>,
    config: CoordinatorConfig,
}

impl LeaseCoordinator {
    pub fn new(store: Arc<dyn JobStore>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            augmenter: Arc::new(NoopAugmenter),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_augmenter(mut self, augmenter: Arc<dyn ClaimAugmenter>) -> Self {
        self.augmenter = augmenter;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Reap expired leases, then bind the oldest pending job to `worker_id`.
    ///
    /// Returns `None` when nothing is pending or another worker won the
    /// race for the selected job. Callers simply poll again later.
    pub async fn claim(&self, worker_id: &str) -> CoordinatorResult<Option<Job>> {
        if worker_id.trim().is_empty() {
            return Err(CoordinatorError::unauthenticated("empty worker id"));
        }

        self.reap_stale().await?;

        let candidate = match self.store.scan(&JobFilter::oldest_pending()).await?.into_iter().next() {
            Some(job) => job,
            None => {
                metrics::record_claim(false);
                return Ok(None);
            }
        };

        let now = self.clock.now();
        let next = candidate.clone().claimed_by(worker_id, now);
        let mut job = match self.store.compare_and_swap(&candidate, next).await {
            Ok(job) => job,
            Err(e) if e.is_conflict() || e.is_not_found() => {
                debug!(job_id = %candidate.id, worker_id = %worker_id, "Lost claim race");
                metrics::record_claim(false);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            job_id = %job.id,
            worker_id = %worker_id,
            attempts = job.attempts,
            reaps = job.reaps,
            "Job claimed"
        );
        metrics::record_claim(true);

        // The lease is already held; if augmentation fails the job is
        // recovered by the reaper once the lease goes stale.
        self.augmenter.augment(&mut job).await?;
        Ok(Some(job))
    }

    /// Record a liveness signal from the lease holder.
    pub async fn heartbeat(&self, job_id: &JobId, worker_id: &str) -> CoordinatorResult<Job> {
        let job = self.store.get(job_id).await?;

        if job.status != JobStatus::Processing {
            return Err(CoordinatorError::not_active(format!(
                "job {} is {}",
                job.id, job.status
            )));
        }
        if !job.is_held_by(worker_id) {
            return Err(CoordinatorError::not_owner(format!(
                "job {} is not held by {}",
                job.id, worker_id
            )));
        }

        let next = job.clone().heartbeat(self.clock.now());
        let stored = self.store.compare_and_swap(&job, next).await?;

        debug!(job_id = %job.id, worker_id = %worker_id, "Heartbeat recorded");
        metrics::record_heartbeat();
        Ok(stored)
    }

    /// Record the outcome reported by the lease holder.
    ///
    /// A job that is already terminal is never transitioned again; the call
    /// fails with `NotActive` and the stored record is left as it was.
    pub async fn complete(
        &self,
        job_id: &JobId,
        worker_id: &str,
        outcome: JobOutcome,
    ) -> CoordinatorResult<(Job, CompletionOutcome)> {
        let job = self.store.get(job_id).await?;

        if job.is_terminal() {
            return Err(CoordinatorError::not_active(format!(
                "job {} is already terminal ({})",
                job.id, job.status
            )));
        }
        if !job.is_held_by(worker_id) {
            return Err(CoordinatorError::not_owner(format!(
                "job {} is not held by {}",
                job.id, worker_id
            )));
        }

        let now = self.clock.now();
        let (next, result) = match outcome {
            JobOutcome::Success(result) => (job.clone().completed(result, now), CompletionOutcome::Completed),
            JobOutcome::Failure(error) => match job.clone().failed(error, now) {
                (next, FailureDisposition::Retry) => (next, CompletionOutcome::Retried),
                (next, FailureDisposition::Dead) => (next, CompletionOutcome::Dead),
            },
        };

        let stored = self.store.compare_and_swap(&job, next).await?;

        match result {
            CompletionOutcome::Completed => {
                info!(job_id = %stored.id, worker_id = %worker_id, "Job completed");
                metrics::record_completion("completed");
            }
            CompletionOutcome::Retried => {
                warn!(
                    job_id = %stored.id,
                    worker_id = %worker_id,
                    attempts = stored.attempts,
                    max_attempts = stored.max_attempts,
                    error = stored.error.as_deref().unwrap_or_default(),
                    "Job failed, returned to queue"
                );
                metrics::record_completion("retried");
            }
            CompletionOutcome::Dead => {
                warn!(
                    job_id = %stored.id,
                    worker_id = %worker_id,
                    attempts = stored.attempts,
                    error = stored.error.as_deref().unwrap_or_default(),
                    "Job failed permanently"
                );
                metrics::record_completion("dead");
            }
        }

        Ok((stored, result))
    }

    /// Processing jobs whose holder has been silent longer than `threshold`
    /// (the configured staleness threshold by default). Read only.
    ///
    /// A threshold reaching back past the earliest representable instant
    /// is rejected as `InvalidPayload`.
    pub async fn list_stuck(&self, threshold: Option<Duration>) -> CoordinatorResult<Vec<Job>> {
        let threshold = threshold.unwrap_or(self.config.stale_threshold);
        let cutoff = stale_cutoff(self.clock.now(), threshold).ok_or_else(|| {
            CoordinatorError::invalid_payload(format!(
                "stuck threshold of {}s is out of range",
                threshold.as_secs()
            ))
        })?;
        Ok(self.store.scan(&JobFilter::stale_since(cutoff)).await?)
    }

    /// Point lookup.
    pub async fn get(&self, job_id: &JobId) -> CoordinatorResult<Job> {
        Ok(self.store.get(job_id).await?)
    }

    /// Return every expired lease to the pool, or bury it once it has been
    /// reaped more than `max_reaps` times. Attempts are never consumed here.
    ///
    /// Each record is written with its own compare-and-swap; a record that
    /// changed since the scan (a late heartbeat, another sweeper) is skipped.
    pub async fn reap_stale(&self) -> CoordinatorResult<ReapReport> {
        let now = self.clock.now();
        let Some(cutoff) = self.config.stale_cutoff(now) else {
            // No heartbeat can be older than that
            return Ok(ReapReport::default());
        };
        let stale = self.store.scan(&JobFilter::stale_since(cutoff)).await?;

        let mut report = ReapReport::default();
        for job in stale {
            let bury = self.config.reap_limit_reached(job.reaps);
            let next = if bury {
                job.clone().abandoned(REAP_LIMIT_ERROR, now)
            } else {
                job.clone().released(now)
            };

            match self.store.compare_and_swap(&job, next).await {
                Ok(stored) if bury => {
                    report.dead += 1;
                    warn!(
                        job_id = %stored.id,
                        previous_worker = job.locked_by.as_deref().unwrap_or_default(),
                        reaps = stored.reaps,
                        "Lease expired too many times, job is dead"
                    );
                }
                Ok(stored) => {
                    report.reset += 1;
                    info!(
                        job_id = %stored.id,
                        previous_worker = job.locked_by.as_deref().unwrap_or_default(),
                        last_heartbeat = ?job.last_heartbeat,
                        reaps = stored.reaps,
                        "Reaped stale lease"
                    );
                }
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    report.conflicts += 1;
                    debug!(job_id = %job.id, "Stale lease changed during reap, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        metrics::record_reaped("reset", report.reset as u64);
        metrics::record_reaped("dead", report.dead as u64);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipstudio_models::JobType;
    use clipstudio_store::MemoryJobStore;
    use serde_json::json;

    struct StampAugmenter;

    #[async_trait]
    impl ClaimAugmenter for StampAugmenter {
        async fn augment(&self, job: &mut Job) -> CoordinatorResult<()> {
            if let Some(obj) = job.payload.as_object_mut() {
                obj.insert("accessToken".to_string(), json!("tok"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_augmenter_changes_only_returned_copy() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let job = Job::new(JobType::VideoClip, json!({"a": 1}), "u", 3, chrono::Utc::now());
        let job = store.insert(job).await.unwrap();

        let coordinator = LeaseCoordinator::new(Arc::clone(&store), CoordinatorConfig::default())
            .with_augmenter(Arc::new(StampAugmenter));
        let claimed = coordinator.claim("w1").await.unwrap().unwrap();
        assert_eq!(claimed.payload["accessToken"], "tok");

        let stored = store.get(&job.id).await.unwrap();
        assert!(stored.payload.get("accessToken").is_none());
    }

    #[test]
    fn test_outcome_from_request() {
        assert_eq!(
            JobOutcome::from(CompleteRequest::success(json!({"url": "x"}))),
            JobOutcome::Success(Some(json!({"url": "x"})))
        );
        let req = CompleteRequest {
            status: CompletionStatus::Failed,
            result: None,
            error: None,
        };
        assert_eq!(JobOutcome::from(req), JobOutcome::Failure("unknown error".to_string()));
    }

    #[tokio::test]
    async fn test_empty_worker_id_rejected() {
        let coordinator = LeaseCoordinator::new(Arc::new(MemoryJobStore::new()), CoordinatorConfig::default());
        assert!(matches!(
            coordinator.claim("  ").await,
            Err(CoordinatorError::Unauthenticated(_))
        ));
    }
}
