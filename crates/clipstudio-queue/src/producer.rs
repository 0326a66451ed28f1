//! Job producer.

use std::sync::Arc;

use tracing::info;
use validator::Validate;

use clipstudio_models::{ClipPayload, Job, JobId, JobType};
use clipstudio_store::JobStore;

use crate::clock::{Clock, SystemClock};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::metrics;

/// Turns render requests into pending jobs. Insertion is its whole
/// contract; it never waits on or touches existing jobs.
pub struct JobProducer {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl JobProducer {
    pub fn new(store: Arc<dyn JobStore>, config: &CoordinatorConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            max_attempts: config.max_attempts,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate `payload` and insert one pending `video_clip` job.
    pub async fn enqueue(&self, payload: &ClipPayload, user_id: &str) -> CoordinatorResult<JobId> {
        payload
            .validate()
            .map_err(|e| CoordinatorError::invalid_payload(e.to_string()))?;
        let value = serde_json::to_value(payload)
            .map_err(|e| CoordinatorError::invalid_payload(e.to_string()))?;

        self.enqueue_raw(JobType::VideoClip, value, user_id).await
    }

    /// Insert a job whose payload was validated elsewhere.
    pub async fn enqueue_raw(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        user_id: &str,
    ) -> CoordinatorResult<JobId> {
        if user_id.trim().is_empty() {
            return Err(CoordinatorError::invalid_payload("user id is required"));
        }

        let job = Job::new(job_type, payload, user_id, self.max_attempts, self.clock.now());
        let job = self.store.insert(job).await?;

        info!(
            job_id = %job.id,
            user_id = %job.user_id,
            job_type = %job.job_type,
            max_attempts = job.max_attempts,
            "Job enqueued"
        );
        metrics::record_enqueued();
        Ok(job.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipstudio_models::{JobStatus, LayoutMode, Platform};
    use clipstudio_store::MemoryJobStore;

    fn producer(store: Arc<dyn JobStore>) -> JobProducer {
        JobProducer::new(store, &CoordinatorConfig::default())
    }

    #[tokio::test]
    async fn test_enqueue_inserts_pending_job() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let payload = ClipPayload::new("dQw4w9WgXcQ", 5.0, 35.0)
            .with_layout(LayoutMode::PortraitCrop)
            .with_platforms(vec![Platform::Youtube, Platform::Tiktok]);

        let id = producer(Arc::clone(&store)).enqueue(&payload, "user-1").await.unwrap();

        let job = store.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);
        assert_eq!(job.user_id, "user-1");
        assert!(job.locked_by.is_none());

        let decoded: ClipPayload = serde_json::from_value(job.payload).unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_payload() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let producer = producer(store);

        let err = producer
            .enqueue(&ClipPayload::new("abc", 30.0, 10.0), "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidPayload(_)));

        let err = producer
            .enqueue(&ClipPayload::new("abc", 0.0, 10.0), "")
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_each_enqueue_creates_a_new_job() {
        let store = Arc::new(MemoryJobStore::new());
        let producer = producer(Arc::clone(&store) as Arc<dyn JobStore>);
        let payload = ClipPayload::new("abc", 0.0, 10.0);

        let a = producer.enqueue(&payload, "u").await.unwrap();
        let b = producer.enqueue(&payload, "u").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
    }
}
