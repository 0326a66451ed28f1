//! Structured job logging.

use tracing::{error, info, warn, Span};

use clipstudio_models::Job;

/// Logs one job's lifecycle with consistent fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    job_type: String,
    worker_id: String,
}

impl JobLogger {
    pub fn new(job: &Job, worker_id: &str) -> Self {
        Self {
            job_id: job.id.to_string(),
            job_type: job.job_type.to_string(),
            worker_id: worker_id.to_string(),
        }
    }

    pub fn log_start(&self, attempts: u32, max_attempts: u32) {
        info!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            worker_id = %self.worker_id,
            attempts,
            max_attempts,
            "Job started"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            worker_id = %self.worker_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            worker_id = %self.worker_id,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            worker_id = %self.worker_id,
            "Job finished: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span covering the whole job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            job_type = %self.job_type,
            worker_id = %self.worker_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        serde_json::from_value(serde_json::json!({
            "id": "job-42",
            "type": "video_clip",
            "payload": {},
            "status": "processing",
            "user_id": "user-1",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_job_logger_fields() {
        let logger = JobLogger::new(&job(), "worker-7");
        assert_eq!(logger.job_id(), "job-42");
        assert_eq!(logger.job_type, "video_clip");
        assert_eq!(logger.worker_id, "worker-7");
    }
}
