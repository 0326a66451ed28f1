//! Render worker.
//!
//! Polls the coordinator for a lease, heartbeats while the render pipeline
//! runs, and reports the outcome. One job at a time per process.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod heartbeat;
pub mod logging;
pub mod pipeline;
pub mod retry;

pub use client::{ClientError, ClientResult, CoordinatorClient};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobDisposition, JobExecutor, EMPTY_RESULT_ERROR};
pub use heartbeat::{Heartbeat, HeartbeatEnd};
pub use pipeline::{CommandRenderPipeline, RenderOutput, RenderPipeline};
pub use retry::RetryConfig;
