//! Coordinator error types.

use clipstudio_store::StoreError;
use thiserror::Error;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Missing, malformed or expired worker credential
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Caller does not hold the job's lease
    #[error("Not lease owner: {0}")]
    NotOwner(String),

    /// Job is not in the status the operation requires
    #[error("Job not active: {0}")]
    NotActive(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    /// Lost an optimistic-update race; retry the outer operation
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl CoordinatorError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn not_owner(msg: impl Into<String>) -> Self {
        Self::NotOwner(msg.into())
    }

    pub fn not_active(msg: impl Into<String>) -> Self {
        Self::NotActive(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Stable short code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::Unauthenticated(_) => "unauthenticated",
            CoordinatorError::NotOwner(_) => "not_owner",
            CoordinatorError::NotActive(_) => "not_active",
            CoordinatorError::NotFound(_) => "not_found",
            CoordinatorError::Conflict(_) => "conflict",
            CoordinatorError::StoreUnavailable(_) => "store_unavailable",
            CoordinatorError::InvalidPayload(_) => "invalid_payload",
        }
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => CoordinatorError::NotFound(id),
            StoreError::Conflict(msg) => CoordinatorError::Conflict(msg),
            StoreError::AlreadyExists(id) => {
                CoordinatorError::Conflict(format!("job already exists: {}", id))
            }
            other => CoordinatorError::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            CoordinatorError::from(StoreError::not_found("j1")),
            CoordinatorError::NotFound(_)
        ));
        assert!(matches!(
            CoordinatorError::from(StoreError::conflict("j1")),
            CoordinatorError::Conflict(_)
        ));
        assert!(matches!(
            CoordinatorError::from(StoreError::unavailable("down")),
            CoordinatorError::StoreUnavailable(_)
        ));
    }
}
