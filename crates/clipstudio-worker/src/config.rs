//! Worker configuration.

use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Coordinator base URL
    pub backend_url: String,
    /// Bearer token minted by `issue-worker-token`
    pub worker_token: String,
    /// Instance id sent as `x-worker-id`; must match the token subject
    pub worker_id: String,
    /// Back-off after a failed poll; an empty queue waits three times this
    pub poll_interval: Duration,
    /// Interval between lease heartbeats while rendering
    pub heartbeat_interval: Duration,
    /// Hard limit on a single render
    pub job_timeout: Duration,
    /// Render command line, program first
    pub render_command: String,
    /// Work directory for render output
    pub work_dir: String,
    /// HTTP request timeout against the coordinator
    pub request_timeout: Duration,
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("backend_url", &self.backend_url)
            .field("worker_token", &"***")
            .field("worker_id", &self.worker_id)
            .field("poll_interval", &self.poll_interval)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("job_timeout", &self.job_timeout)
            .field("render_command", &self.render_command)
            .field("work_dir", &self.work_dir)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            worker_token: String::new(),
            worker_id: "worker-1".to_string(),
            poll_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(15),
            job_timeout: Duration::from_secs(1800), // 30 minutes
            render_command: "clipstudio-render".to_string(),
            work_dir: "/tmp/clipstudio".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables. `WORKER_TOKEN` is required.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let worker_token = std::env::var("WORKER_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| WorkerError::config_error("WORKER_TOKEN must be set"))?;

        Ok(Self {
            backend_url: std::env::var("BACKEND_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.backend_url),
            worker_token,
            worker_id: std::env::var("WORKER_ID")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.worker_id),
            poll_interval: Duration::from_secs(
                std::env::var("POLL_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(30),
            ),
            heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(15),
            ),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(1800),
            ),
            render_command: std::env::var("RENDER_COMMAND")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.render_command),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            request_timeout: defaults.request_timeout,
        })
    }

    /// Wait after a poll that found no work.
    pub fn idle_interval(&self) -> Duration {
        self.poll_interval.saturating_mul(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let config = WorkerConfig {
            worker_token: "secret-token".to_string(),
            ..Default::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("worker-1"));
    }

    #[test]
    fn test_idle_interval_is_three_polls() {
        let config = WorkerConfig {
            poll_interval: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(config.idle_interval(), Duration::from_secs(30));
    }
}
