//! Request identity extractors.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use clipstudio_queue::WorkerIdentity;

use crate::error::ApiError;
use crate::state::AppState;

/// Header a worker uses to assert which instance it is.
pub const WORKER_ID_HEADER: &str = "x-worker-id";

/// Header carrying the user id, set by the upstream session layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// A worker whose bearer token verified.
#[derive(Debug, Clone)]
pub struct WorkerAuth {
    pub identity: WorkerIdentity,
    /// Value of the `x-worker-id` header, if sent
    pub asserted_id: Option<String>,
}

impl WorkerAuth {
    pub fn worker_id(&self) -> &str {
        &self.identity.worker_id
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for WorkerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let identity = state.verifier.verify_header(authorization)?;

        let asserted_id = parts
            .headers
            .get(WORKER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            identity,
            asserted_id,
        })
    }
}

/// The user on whose behalf a job is produced.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| UserId(s.to_string()))
            .ok_or_else(|| ApiError::unauthorized("Missing user identity"))
    }
}
