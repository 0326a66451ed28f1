//! Job executor: one job at a time, polled from the coordinator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn, Instrument};

use clipstudio_models::{ClipPayload, CompleteRequest, CompleteResponse, CompletionOutcome, Job, JobId};

use crate::client::{ClientError, ClientResult, CoordinatorClient};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::heartbeat::{Heartbeat, HeartbeatEnd};
use crate::logging::JobLogger;
use crate::pipeline::{RenderOutput, RenderPipeline};
use crate::retry::{retry_async, RetryConfig};

/// Error reported when a render succeeds without producing anything.
pub const EMPTY_RESULT_ERROR: &str = "render returned no result";

/// What became of a claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    /// The coordinator accepted the report
    Reported(CompletionOutcome),
    /// Another worker or the reaper took the job first
    LeaseLost,
    /// The report could not be delivered; the lease will expire and be reaped
    Unreported,
}

/// Polls for work, renders it and reports the outcome.
pub struct JobExecutor {
    config: WorkerConfig,
    client: Arc<CoordinatorClient>,
    pipeline: Arc<dyn RenderPipeline>,
    report_retry: RetryConfig,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, client: CoordinatorClient, pipeline: Arc<dyn RenderPipeline>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            client: Arc::new(client),
            pipeline,
            report_retry: RetryConfig::new("complete_job"),
            shutdown,
        }
    }

    /// Backoff used when a completion report hits a retryable error.
    pub fn with_report_retry(mut self, retry: RetryConfig) -> Self {
        self.report_retry = retry;
        self
    }

    /// Poll until [`JobExecutor::shutdown`] is called. A job in flight when
    /// shutdown is requested is finished and reported first.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            worker_id = %self.client.worker_id(),
            poll_interval_secs = self.config.poll_interval.as_secs(),
            heartbeat_secs = self.config.heartbeat_interval.as_secs(),
            "Starting job executor"
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            let wait = match self.poll_once().await {
                Ok(Some(_)) => Duration::ZERO,
                Ok(None) => {
                    debug!("No jobs available, sleeping");
                    self.config.idle_interval()
                }
                Err(WorkerError::Client(e)) if e.is_unauthenticated() => {
                    error!("Coordinator rejected the worker token: {}", e);
                    self.config.poll_interval
                }
                Err(e) => {
                    warn!("Failed to fetch job: {}", e);
                    self.config.poll_interval
                }
            };

            if wait.is_zero() {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown_rx.changed() => {}
            }
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Claim one job and see it through. `None` when the queue is empty.
    pub async fn poll_once(&self) -> WorkerResult<Option<JobDisposition>> {
        let Some(job) = self.client.claim().await? else {
            return Ok(None);
        };
        Ok(Some(self.process_job(job).await))
    }

    async fn process_job(&self, job: Job) -> JobDisposition {
        let logger = JobLogger::new(&job, self.client.worker_id());
        let span = logger.create_span();

        async move {
            logger.log_start(job.attempts, job.max_attempts);

            let heartbeat = Heartbeat::spawn(
                Arc::clone(&self.client),
                job.id.clone(),
                self.config.heartbeat_interval,
            );
            let rendered = self.render(&job).await;
            // The lease must not be extended past the report
            let heartbeat_end = heartbeat.stop().await;

            let report = match rendered {
                Ok(RenderOutput {
                    result: Some(result),
                }) => CompleteRequest::success(result),
                Ok(RenderOutput { result: None }) => {
                    logger.log_warning(EMPTY_RESULT_ERROR);
                    CompleteRequest::failure(EMPTY_RESULT_ERROR)
                }
                Err(e) => {
                    logger.log_error(&e.to_string());
                    CompleteRequest::failure(e.to_string())
                }
            };

            if heartbeat_end == HeartbeatEnd::LeaseLost {
                logger.log_warning("lease lost during render, outcome not reported");
                return JobDisposition::LeaseLost;
            }

            match self.report(&job.id, &report).await {
                Ok(response) => {
                    logger.log_completion(&format!(
                        "{:?} (attempts {})",
                        response.outcome, response.attempts
                    ));
                    JobDisposition::Reported(response.outcome)
                }
                Err(e) if e.is_lease_lost() => {
                    logger.log_warning(&format!("outcome rejected, lease lost: {}", e));
                    JobDisposition::LeaseLost
                }
                Err(e) => {
                    logger.log_error(&format!("failed to report outcome: {}", e));
                    JobDisposition::Unreported
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Render in a separate task so a panic becomes a reportable failure.
    async fn render(&self, job: &Job) -> WorkerResult<RenderOutput> {
        let payload: ClipPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| WorkerError::invalid_payload(e.to_string()))?;

        let pipeline = Arc::clone(&self.pipeline);
        let job_id = job.id.clone();
        let task = tokio::spawn(async move { pipeline.render(&job_id, &payload).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(self.config.job_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(join_error(e)),
            Err(_) => {
                abort.abort();
                Err(WorkerError::Timeout(self.config.job_timeout))
            }
        }
    }

    async fn report(&self, job_id: &JobId, report: &CompleteRequest) -> ClientResult<CompleteResponse> {
        retry_async(&self.report_retry, ClientError::is_retryable, || {
            self.client.complete(job_id, report)
        })
        .await
    }
}

fn join_error(e: JoinError) -> WorkerError {
    if !e.is_panic() {
        return WorkerError::render_failed("render task was cancelled");
    }

    let panic = e.into_panic();
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    WorkerError::Panicked(message)
}
