//! Shared data models for the ClipStudio job coordination layer.
//!
//! This crate provides Serde-serializable types for:
//! - Job records and their lease fields
//! - Clip render payloads (source, time range, layout, platforms)
//! - Request/response bodies exchanged between workers and the coordinator

pub mod job;
pub mod payload;
pub mod wire;

// Re-export common types
pub use job::{FailureDisposition, Job, JobId, JobStatus, JobType, StatusParseError};
pub use payload::{
    ClipPayload, LayoutMode, LayoutModeParseError, Platform, PublishMetadata, VideoSource,
    MAX_CLIP_DURATION_SECS,
};
pub use wire::{
    ClaimResponse, CompleteRequest, CompleteResponse, CompletionOutcome, CompletionStatus,
    EnqueueResponse, HeartbeatResponse, JobResponse, StuckJobsResponse,
};
