//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::internal::{claim_job, complete_job, get_job, heartbeat_job, list_stuck};
use crate::handlers::jobs::enqueue_job;
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers, RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    // Producer route, called on behalf of end users
    let producer_routes = Router::new()
        .route("/jobs", post(enqueue_job))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    // Worker routes; workers poll, so they are not rate limited
    let internal_routes = Router::new()
        .route("/jobs/claim", post(claim_job))
        .route("/jobs/stuck", get(list_stuck))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/heartbeat", post(heartbeat_job))
        .route("/jobs/:job_id/complete", post(complete_job));

    let api_routes = Router::new()
        .merge(producer_routes)
        .nest("/internal", internal_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
