//! Executor behaviour against a mock coordinator with stub pipelines.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clipstudio_models::{ClipPayload, CompletionOutcome, JobId};
use clipstudio_worker::{
    CoordinatorClient, JobDisposition, JobExecutor, RenderOutput, RenderPipeline, RetryConfig,
    WorkerConfig, WorkerError, WorkerResult, EMPTY_RESULT_ERROR,
};

/// Returns a fixed output after an optional delay.
struct StubPipeline {
    output: Option<Value>,
    delay: Duration,
}

#[async_trait]
impl RenderPipeline for StubPipeline {
    async fn render(&self, _job_id: &JobId, _payload: &ClipPayload) -> WorkerResult<RenderOutput> {
        tokio::time::sleep(self.delay).await;
        Ok(RenderOutput {
            result: self.output.clone(),
        })
    }
}

struct FailingPipeline;

#[async_trait]
impl RenderPipeline for FailingPipeline {
    async fn render(&self, _job_id: &JobId, _payload: &ClipPayload) -> WorkerResult<RenderOutput> {
        Err(WorkerError::render_failed("source video unavailable"))
    }
}

struct PanickingPipeline;

#[async_trait]
impl RenderPipeline for PanickingPipeline {
    async fn render(&self, _job_id: &JobId, _payload: &ClipPayload) -> WorkerResult<RenderOutput> {
        panic!("decoder state corrupted");
    }
}

fn succeeding(delay: Duration) -> Arc<dyn RenderPipeline> {
    Arc::new(StubPipeline {
        output: Some(json!({ "url": "s3://clips/job-1.mp4" })),
        delay,
    })
}

fn executor(server: &MockServer, pipeline: Arc<dyn RenderPipeline>) -> JobExecutor {
    let config = WorkerConfig {
        backend_url: server.uri(),
        worker_token: "test-token".to_string(),
        heartbeat_interval: Duration::from_millis(50),
        job_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let client = CoordinatorClient::from_config(&config).unwrap();
    JobExecutor::new(config, client, pipeline)
        .with_report_retry(RetryConfig::new("complete_job").with_base_delay(Duration::from_millis(5)))
}

async fn mount_claim(server: &MockServer) {
    let payload = serde_json::to_value(ClipPayload::new("dQw4w9WgXcQ", 0.0, 30.0)).unwrap();
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/claim"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job": {
                "id": "job-1",
                "type": "video_clip",
                "payload": payload,
                "status": "processing",
                "locked_by": "worker-1",
                "attempts": 0,
                "max_attempts": 3,
                "user_id": "user-1",
                "created_at": "2026-03-01T12:00:00Z",
                "updated_at": "2026-03-01T12:00:00Z",
                "revision": 2
            }
        })))
        .mount(server)
        .await;
}

fn outcome(outcome: &str, attempts: u32) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "outcome": outcome, "attempts": attempts }))
}

#[tokio::test]
async fn test_empty_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/claim"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job": null })))
        .mount(&server)
        .await;

    let result = executor(&server, succeeding(Duration::ZERO)).poll_once().await.unwrap();
    assert_eq!(result, None);
}

#[tokio::test]
async fn test_success_is_reported_with_result() {
    let server = MockServer::start().await;
    mount_claim(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/complete"))
        .and(body_partial_json(json!({
            "status": "completed",
            "result": { "url": "s3://clips/job-1.mp4" }
        })))
        .respond_with(outcome("completed", 0))
        .expect(1)
        .mount(&server)
        .await;

    let result = executor(&server, succeeding(Duration::ZERO)).poll_once().await.unwrap();
    assert_eq!(result, Some(JobDisposition::Reported(CompletionOutcome::Completed)));
}

#[tokio::test]
async fn test_success_without_result_is_reported_as_failure() {
    let server = MockServer::start().await;
    mount_claim(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/complete"))
        .and(body_partial_json(json!({ "status": "failed", "error": EMPTY_RESULT_ERROR })))
        .respond_with(outcome("retried", 1))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = Arc::new(StubPipeline {
        output: None,
        delay: Duration::ZERO,
    });
    let result = executor(&server, pipeline).poll_once().await.unwrap();
    assert_eq!(result, Some(JobDisposition::Reported(CompletionOutcome::Retried)));
}

#[tokio::test]
async fn test_render_error_is_reported() {
    let server = MockServer::start().await;
    mount_claim(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/complete"))
        .and(body_partial_json(json!({
            "status": "failed",
            "error": "Render failed: source video unavailable"
        })))
        .respond_with(outcome("dead", 3))
        .expect(1)
        .mount(&server)
        .await;

    let result = executor(&server, Arc::new(FailingPipeline)).poll_once().await.unwrap();
    assert_eq!(result, Some(JobDisposition::Reported(CompletionOutcome::Dead)));
}

#[tokio::test]
async fn test_render_panic_is_reported_as_failure() {
    let server = MockServer::start().await;
    mount_claim(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/complete"))
        .and(body_partial_json(json!({
            "status": "failed",
            "error": "Render panicked: decoder state corrupted"
        })))
        .respond_with(outcome("retried", 1))
        .expect(1)
        .mount(&server)
        .await;

    let result = executor(&server, Arc::new(PanickingPipeline)).poll_once().await.unwrap();
    assert_eq!(result, Some(JobDisposition::Reported(CompletionOutcome::Retried)));
}

#[tokio::test]
async fn test_heartbeats_while_rendering() {
    let server = MockServer::start().await;
    mount_claim(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/heartbeat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(2..)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/complete"))
        .respond_with(outcome("completed", 0))
        .expect(1)
        .mount(&server)
        .await;

    let result = executor(&server, succeeding(Duration::from_millis(300)))
        .poll_once()
        .await
        .unwrap();
    assert_eq!(result, Some(JobDisposition::Reported(CompletionOutcome::Completed)));
}

#[tokio::test]
async fn test_lost_lease_skips_report() {
    let server = MockServer::start().await;
    mount_claim(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/heartbeat"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({ "detail": "not held", "code": "not_owner" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/complete"))
        .respond_with(outcome("completed", 0))
        .expect(0)
        .mount(&server)
        .await;

    let result = executor(&server, succeeding(Duration::from_millis(300)))
        .poll_once()
        .await
        .unwrap();
    assert_eq!(result, Some(JobDisposition::LeaseLost));
}

#[tokio::test]
async fn test_report_retried_after_conflict() {
    let server = MockServer::start().await;
    mount_claim(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/complete"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({ "detail": "revision changed", "code": "conflict" })),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/complete"))
        .respond_with(outcome("completed", 0))
        .expect(1)
        .mount(&server)
        .await;

    let result = executor(&server, succeeding(Duration::ZERO)).poll_once().await.unwrap();
    assert_eq!(result, Some(JobDisposition::Reported(CompletionOutcome::Completed)));
}

#[tokio::test]
async fn test_rejected_report_means_lease_lost() {
    let server = MockServer::start().await;
    mount_claim(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/job-1/complete"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({ "detail": "already terminal", "code": "not_active" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = executor(&server, succeeding(Duration::ZERO)).poll_once().await.unwrap();
    assert_eq!(result, Some(JobDisposition::LeaseLost));
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/internal/jobs/claim"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job": null })))
        .mount(&server)
        .await;

    let executor = Arc::new(executor(&server, succeeding(Duration::ZERO)));
    let running = Arc::clone(&executor);
    let handle = tokio::spawn(async move { running.run().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    executor.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}
