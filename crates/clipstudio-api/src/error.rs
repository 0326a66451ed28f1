//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use clipstudio_queue::CoordinatorError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Coordinator(#[from] CoordinatorError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Coordinator(e) => match e {
                CoordinatorError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
                CoordinatorError::NotOwner(_) => StatusCode::FORBIDDEN,
                CoordinatorError::NotFound(_) => StatusCode::NOT_FOUND,
                CoordinatorError::NotActive(_) | CoordinatorError::Conflict(_) => StatusCode::CONFLICT,
                CoordinatorError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
                CoordinatorError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthenticated",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::RateLimited => "rate_limited",
            ApiError::Internal(_) => "internal",
            ApiError::Coordinator(e) => e.code(),
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_) | ApiError::Coordinator(CoordinatorError::StoreUnavailable(_))
        )
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
            if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                "An internal error occurred".to_string()
            } else {
                self.to_string()
            }
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            detail,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_error_status_codes() {
        let cases = [
            (CoordinatorError::unauthenticated("x"), StatusCode::UNAUTHORIZED),
            (CoordinatorError::not_owner("x"), StatusCode::FORBIDDEN),
            (CoordinatorError::not_active("x"), StatusCode::CONFLICT),
            (CoordinatorError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CoordinatorError::Conflict("x".into()), StatusCode::CONFLICT),
            (CoordinatorError::invalid_payload("x"), StatusCode::BAD_REQUEST),
            (CoordinatorError::StoreUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(ApiError::RateLimited.code(), "rate_limited");
        assert_eq!(ApiError::from(CoordinatorError::not_owner("x")).code(), "not_owner");
    }
}
