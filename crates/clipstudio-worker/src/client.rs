//! HTTP client for the coordinator's internal worker routes.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

use clipstudio_models::{
    ClaimResponse, CompleteRequest, CompleteResponse, HeartbeatResponse, Job, JobId,
    StuckJobsResponse,
};

use crate::config::WorkerConfig;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Coordinator returned {status} ({code}): {detail}")]
    Api {
        status: u16,
        code: String,
        detail: String,
    },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Error code from the coordinator's error body, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Network(e) => e.status().map(|s| s.as_u16()),
            ClientError::Decode(_) => None,
        }
    }

    /// The caller no longer holds the lease: another worker owns the job,
    /// the job left `processing`, or the record is gone.
    pub fn is_lease_lost(&self) -> bool {
        matches!(self.code(), Some("not_owner" | "not_active" | "not_found"))
    }

    /// The token was rejected.
    pub fn is_unauthenticated(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED.as_u16())
    }

    /// Worth repeating: a lost write race, an unreachable coordinator, or a
    /// store outage behind it.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Api { status, code, .. } => code == "conflict" || *status >= 500,
            ClientError::Decode(_) => false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: String,
    #[serde(default)]
    code: String,
}

/// Coordinator client, authenticated as one worker instance.
#[derive(Clone)]
pub struct CoordinatorClient {
    http: Client,
    base_url: String,
    token: String,
    worker_id: String,
}

impl CoordinatorClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        worker_id: impl Into<String>,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("clipstudio-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            worker_id: worker_id.into(),
        })
    }

    pub fn from_config(config: &WorkerConfig) -> ClientResult<Self> {
        Self::new(
            &config.backend_url,
            &config.worker_token,
            &config.worker_id,
            config.request_timeout,
        )
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/internal/jobs{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("x-worker-id", &self.worker_id)
    }

    /// Ask for the oldest pending job. `None` when the queue is empty.
    pub async fn claim(&self) -> ClientResult<Option<Job>> {
        let response: ClaimResponse = self
            .send("claim", self.authed(self.http.post(self.url("/claim"))))
            .await?;
        Ok(response.job)
    }

    /// Extend the lease on `job_id`.
    pub async fn heartbeat(&self, job_id: &JobId) -> ClientResult<()> {
        let response: HeartbeatResponse = self
            .send(
                "heartbeat",
                self.authed(self.http.post(self.url(&format!("/{}/heartbeat", job_id)))),
            )
            .await?;

        if response.ok {
            Ok(())
        } else {
            Err(ClientError::Decode("heartbeat answered ok=false".to_string()))
        }
    }

    /// Report the outcome of `job_id`.
    pub async fn complete(
        &self,
        job_id: &JobId,
        report: &CompleteRequest,
    ) -> ClientResult<CompleteResponse> {
        self.send(
            "complete",
            self.authed(self.http.post(self.url(&format!("/{}/complete", job_id))))
                .json(report),
        )
        .await
    }

    /// Processing jobs whose holder has gone silent.
    pub async fn list_stuck(&self, threshold_secs: Option<u64>) -> ClientResult<StuckJobsResponse> {
        let mut request = self.authed(self.http.get(self.url("/stuck")));
        if let Some(secs) = threshold_secs {
            request = request.query(&[("threshold_secs", secs)]);
        }
        self.send("list_stuck", request).await
    }

    async fn send<T: DeserializeOwned>(&self, operation: &'static str, request: RequestBuilder) -> ClientResult<T> {
        let span = info_span!("coordinator_request", operation, worker_id = %self.worker_id);

        async move {
            let response = request.send().await?;
            debug!(status = %response.status(), "Coordinator responded");
            decode(response).await
        }
        .instrument(span)
        .await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            code: if body.code.is_empty() {
                status.canonical_reason().unwrap_or("error").to_lowercase()
            } else {
                body.code
            },
            detail: if body.detail.is_empty() {
                String::from_utf8_lossy(&bytes).into_owned()
            } else {
                body.detail
            },
        });
    }

    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}
