//! Job coordination: producing jobs and leasing them to workers.
//!
//! This crate provides:
//! - `JobProducer`: validates render requests and inserts pending jobs
//! - `LeaseCoordinator`: claim (reap-then-claim), heartbeat, complete, stuck listing
//! - `Reaper`: periodic sweep of expired leases
//! - Worker credentials: HS256 keyring with rotation, verifier, token issuing

pub mod auth;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod producer;
pub mod reaper;

pub use auth::{
    KeyringError, WorkerClaims, WorkerIdentity, WorkerKeyring, WorkerVerifier, DEFAULT_WORKER_KIND,
    WORKER_ROLE,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoordinatorConfig;
pub use coordinator::{
    ClaimAugmenter, JobOutcome, LeaseCoordinator, NoopAugmenter, ReapReport, REAP_LIMIT_ERROR,
};
pub use error::{CoordinatorError, CoordinatorResult};
pub use producer::JobProducer;
pub use reaper::Reaper;
