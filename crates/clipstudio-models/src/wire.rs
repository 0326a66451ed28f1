//! Request and response bodies of the coordinator HTTP surface.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId};

/// Response to a claim poll. `job` is `null` when nothing is available.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClaimResponse {
    pub job: Option<Job>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HeartbeatResponse {
    pub ok: bool,
}

/// Outcome a worker reports for its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    #[serde(alias = "COMPLETED", alias = "done")]
    Completed,
    #[serde(alias = "FAILED")]
    Failed,
}

/// Body of a complete call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompleteRequest {
    pub status: CompletionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompleteRequest {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            status: CompletionStatus::Completed,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: CompletionStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// What a complete call did to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Job is done
    Completed,
    /// Failure recorded; job is pending again
    Retried,
    /// Failure recorded; attempts exhausted
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompleteResponse {
    pub outcome: CompletionOutcome,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EnqueueResponse {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobResponse {
    pub job: Job,
}

/// Read-only listing of leases whose holder has gone silent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StuckJobsResponse {
    pub threshold_secs: u64,
    pub jobs: Vec<Job>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_request_accepts_legacy_status() {
        let req: CompleteRequest =
            serde_json::from_str(r#"{"status":"COMPLETED","result":{"url":"x"}}"#).unwrap();
        assert_eq!(req.status, CompletionStatus::Completed);

        let req: CompleteRequest =
            serde_json::from_str(r#"{"status":"failed","error":"boom"}"#).unwrap();
        assert_eq!(req.status, CompletionStatus::Failed);
        assert_eq!(req.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_empty_claim_is_null() {
        let body = serde_json::to_string(&ClaimResponse { job: None }).unwrap();
        assert_eq!(body, r#"{"job":null}"#);
    }
}
