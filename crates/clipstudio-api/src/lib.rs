//! Axum HTTP API server.
//!
//! This crate provides:
//! - The producer route (`POST /api/jobs`)
//! - Internal worker routes: claim, heartbeat, complete, stuck listing
//! - Worker bearer token verification
//! - Rate limiting, security headers and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
