//! Internal worker routes. Every handler requires a verified worker token.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use clipstudio_models::{
    ClaimResponse, CompleteRequest, CompleteResponse, HeartbeatResponse, JobId, JobResponse,
    StuckJobsResponse,
};
use clipstudio_queue::{CoordinatorError, JobOutcome};

use crate::auth::WorkerAuth;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Claim the oldest pending job, reaping expired leases first.
pub async fn claim_job(
    State(state): State<AppState>,
    auth: WorkerAuth,
) -> ApiResult<Json<ClaimResponse>> {
    auth.identity.require_claimant(auth.asserted_id.as_deref())?;

    let job = state.coordinator.claim(auth.worker_id()).await?;
    if job.is_none() {
        debug!(worker_id = %auth.worker_id(), "No job available");
    }

    Ok(Json(ClaimResponse { job }))
}

/// Extend the caller's lease.
pub async fn heartbeat_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    auth: WorkerAuth,
) -> ApiResult<Json<HeartbeatResponse>> {
    auth.identity.require_owner(auth.asserted_id.as_deref())?;

    state
        .coordinator
        .heartbeat(&JobId::from_string(job_id), auth.worker_id())
        .await?;

    Ok(Json(HeartbeatResponse { ok: true }))
}

/// Record the outcome of the caller's job.
pub async fn complete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    auth: WorkerAuth,
    body: Result<Json<CompleteRequest>, JsonRejection>,
) -> ApiResult<Json<CompleteResponse>> {
    auth.identity.require_owner(auth.asserted_id.as_deref())?;
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let (job, outcome) = state
        .coordinator
        .complete(
            &JobId::from_string(job_id),
            auth.worker_id(),
            JobOutcome::from(request),
        )
        .await?;

    Ok(Json(CompleteResponse {
        outcome,
        attempts: job.attempts,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StuckQuery {
    /// Silence threshold; the configured staleness threshold when absent
    pub threshold_secs: Option<u64>,
}

/// Read-only listing of processing jobs whose holder has gone silent.
pub async fn list_stuck(
    State(state): State<AppState>,
    _auth: WorkerAuth,
    Query(query): Query<StuckQuery>,
) -> ApiResult<Json<StuckJobsResponse>> {
    let threshold = query
        .threshold_secs
        .map(Duration::from_secs)
        .unwrap_or(state.coordinator.config().stale_threshold);

    let jobs = state
        .coordinator
        .list_stuck(Some(threshold))
        .await
        .map_err(|e| match e {
            CoordinatorError::InvalidPayload(msg) => ApiError::bad_request(msg),
            other => other.into(),
        })?;

    Ok(Json(StuckJobsResponse {
        threshold_secs: threshold.as_secs(),
        jobs,
    }))
}

/// Point lookup of a job record.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    _auth: WorkerAuth,
) -> ApiResult<Json<JobResponse>> {
    let job = state.coordinator.get(&JobId::from_string(job_id)).await?;
    Ok(Json(JobResponse { job }))
}
