//! Producer handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use clipstudio_models::{ClipPayload, EnqueueResponse};

use crate::auth::UserId;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Enqueue a clip render for the calling user.
pub async fn enqueue_job(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    payload: Result<Json<ClipPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<EnqueueResponse>)> {
    let Json(payload) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let job_id = state.producer.enqueue(&payload, &user_id).await?;

    Ok((StatusCode::CREATED, Json(EnqueueResponse { job_id })))
}
