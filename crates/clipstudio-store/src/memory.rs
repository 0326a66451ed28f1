//! In-memory job store.
//!
//! One write lock guards the whole table, so every compare-and-swap is
//! evaluated and applied by a single writer. Records live for the life of
//! the process; use the Redis store for anything that must survive a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use clipstudio_models::{Job, JobId};

use crate::error::{StoreError, StoreResult};
use crate::store::{finish_scan, JobFilter, JobStore};

/// Job table held in process memory.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, mut job: Job) -> StoreResult<Job> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.to_string()));
        }
        job.revision = 1;
        jobs.insert(job.id.clone(), job.clone());
        debug!(job_id = %job.id, "Inserted job");
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> StoreResult<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id.as_str()))
    }

    async fn compare_and_swap(&self, current: &Job, mut next: Job) -> StoreResult<Job> {
        if next.id != current.id {
            return Err(StoreError::Serialization(format!(
                "record id changed from {} to {}",
                current.id, next.id
            )));
        }

        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(&current.id)
            .ok_or_else(|| StoreError::not_found(current.id.as_str()))?;

        if stored.revision != current.revision {
            return Err(StoreError::conflict(format!(
                "{} (expected revision {}, found {})",
                current.id, current.revision, stored.revision
            )));
        }

        next.revision = current.revision + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn scan(&self, filter: &JobFilter) -> StoreResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let matched = jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        Ok(finish_scan(matched, filter))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
