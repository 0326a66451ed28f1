//! Job records and their lease lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker to claim it
    #[default]
    Pending,
    /// Leased to exactly one worker
    Processing,
    /// Finished successfully (terminal)
    Done,
    /// Reported failed; recognised for older records, never written by the coordinator
    Failed,
    /// Abandoned after exhausting its attempts (terminal)
    Dead,
}

impl JobStatus {
    /// Every status, in lifecycle order.
    pub const ALL: &'static [JobStatus] = &[
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Done,
        JobStatus::Failed,
        JobStatus::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Dead => "dead",
        }
    }

    /// Terminal records are inert: nothing may change them again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Dead)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for JobStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "done" | "completed" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "dead" => Ok(JobStatus::Dead),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// Kind of work a job carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Cut, reframe and publish a clip of a source video
    #[default]
    VideoClip,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::VideoClip => "video_clip",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a reported failure did to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Returned to the pool for another attempt
    Retry,
    /// Attempts exhausted; permanently abandoned
    Dead,
}

/// A unit of asynchronous work.
///
/// `locked_by` is set if and only if `status` is [`JobStatus::Processing`].
/// The transition helpers below keep that invariant; the coordinator
/// decides which transition is legal and writes the result with a
/// compare-and-swap on `revision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Job type
    #[serde(rename = "type")]
    pub job_type: JobType,

    /// Producer-defined render parameters, passed through untouched
    pub payload: serde_json::Value,

    /// Lifecycle status
    pub status: JobStatus,

    /// Worker currently holding the lease
    #[serde(default)]
    pub locked_by: Option<String>,

    /// When the current lease was acquired
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,

    /// Most recent liveness signal from the lease holder
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,

    /// Failed processing attempts consumed so far
    #[serde(default)]
    pub attempts: u32,

    /// Ceiling on `attempts`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Times the lease was reaped after its holder went silent
    #[serde(default)]
    pub reaps: u32,

    /// Terminal success payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Last reported error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Owner, for attribution only
    pub user_id: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Set once, when the job becomes terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Record version, bumped by the store on every write
    #[serde(default)]
    pub revision: u64,
}

fn default_max_attempts() -> u32 {
    3
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        job_type: JobType,
        payload: serde_json::Value,
        user_id: impl Into<String>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type,
            payload,
            status: JobStatus::Pending,
            locked_by: None,
            locked_at: None,
            last_heartbeat: None,
            attempts: 0,
            max_attempts,
            reaps: 0,
            result: None,
            error: None,
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
            finished_at: None,
            revision: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True if `worker_id` holds the current lease.
    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.status == JobStatus::Processing && self.locked_by.as_deref() == Some(worker_id)
    }

    /// True if the last liveness signal came before `cutoff`. A record with
    /// no signal at all counts as silent.
    pub fn silent_since(&self, cutoff: DateTime<Utc>) -> bool {
        match self.last_heartbeat.or(self.locked_at) {
            Some(seen) => seen < cutoff,
            None => true,
        }
    }

    /// Bind the job to `worker_id`.
    pub fn claimed_by(mut self, worker_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        self.status = JobStatus::Processing;
        self.locked_by = Some(worker_id.into());
        self.locked_at = Some(now);
        self.last_heartbeat = Some(now);
        self.updated_at = now;
        self
    }

    /// Record a liveness signal from the lease holder.
    pub fn heartbeat(mut self, now: DateTime<Utc>) -> Self {
        // Never move the heartbeat behind the lease start.
        let floor = self.locked_at.unwrap_or(now);
        self.last_heartbeat = Some(now.max(floor));
        self.updated_at = now;
        self
    }

    /// Return an abandoned lease to the pool. Does not count as an attempt.
    pub fn released(mut self, now: DateTime<Utc>) -> Self {
        self.status = JobStatus::Pending;
        self.clear_lease();
        self.reaps += 1;
        self.updated_at = now;
        self
    }

    /// Bury a job whose lease was reaped too many times.
    pub fn abandoned(mut self, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        self.status = JobStatus::Dead;
        self.clear_lease();
        self.reaps += 1;
        self.error = Some(error.into());
        self.finished_at = Some(now);
        self.updated_at = now;
        self
    }

    /// Mark the job done with its result.
    pub fn completed(mut self, result: Option<serde_json::Value>, now: DateTime<Utc>) -> Self {
        self.status = JobStatus::Done;
        self.clear_lease();
        self.result = result;
        self.finished_at = Some(now);
        self.updated_at = now;
        self
    }

    /// Consume one attempt and either requeue or bury the job.
    pub fn failed(mut self, error: impl Into<String>, now: DateTime<Utc>) -> (Self, FailureDisposition) {
        let error = error.into();
        self.clear_lease();
        self.updated_at = now;
        self.error = Some(error);

        let disposition = if self.attempts + 1 < self.max_attempts {
            self.status = JobStatus::Pending;
            FailureDisposition::Retry
        } else {
            self.status = JobStatus::Dead;
            self.finished_at = Some(now);
            FailureDisposition::Dead
        };
        self.attempts += 1;

        (self, disposition)
    }

    fn clear_lease(&mut self) {
        self.locked_by = None;
        self.locked_at = None;
        self.last_heartbeat = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn pending() -> Job {
        Job::new(JobType::VideoClip, json!({"k": "v"}), "user-1", 3, Utc::now())
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = pending();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.locked_by.is_none());
    }

    #[test]
    fn test_claim_sets_lease_fields() {
        let now = Utc::now();
        let job = pending().claimed_by("w1", now);

        assert!(job.is_held_by("w1"));
        assert!(!job.is_held_by("w2"));
        assert_eq!(job.locked_at, Some(now));
        assert_eq!(job.last_heartbeat, Some(now));
    }

    #[test]
    fn test_silence_detection() {
        let start = Utc::now();
        let job = pending().claimed_by("w1", start);

        assert!(!job.silent_since(start));
        assert!(job.silent_since(start + Duration::seconds(1)));

        let job = job.heartbeat(start + Duration::seconds(50));
        assert!(!job.silent_since(start + Duration::seconds(10)));
        assert!(job.silent_since(start + Duration::seconds(51)));

        // Never leased: no signal at all
        assert!(pending().silent_since(start));
    }

    #[test]
    fn test_release_keeps_attempts() {
        let now = Utc::now();
        let job = pending().claimed_by("w1", now).released(now);

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.reaps, 1);
        assert!(job.locked_by.is_none());
        assert!(job.last_heartbeat.is_none());
    }

    #[test]
    fn test_failure_retries_then_dies() {
        let now = Utc::now();
        let (job, d) = pending().claimed_by("w1", now).failed("boom", now);
        assert_eq!(d, FailureDisposition::Retry);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.finished_at.is_none());

        let (job, d) = job.claimed_by("w1", now).failed("boom", now);
        assert_eq!(d, FailureDisposition::Retry);

        let (job, d) = job.claimed_by("w1", now).failed("final", now);
        assert_eq!(d, FailureDisposition::Dead);
        assert_eq!(job.attempts, 3);
        assert_eq!(job.status, JobStatus::Dead);
        assert_eq!(job.error.as_deref(), Some("final"));
        assert!(job.locked_by.is_none());
        assert!(job.is_terminal());
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), *status);
        }
        assert_eq!("COMPLETED".parse::<JobStatus>().unwrap(), JobStatus::Done);
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_serializes_type_field() {
        let value = serde_json::to_value(pending()).unwrap();
        assert_eq!(value["type"], "video_clip");
        assert_eq!(value["status"], "pending");
    }
}
