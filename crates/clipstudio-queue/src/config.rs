//! Coordinator configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Upper bound applied to `STALE_MS`.
pub const MAX_STALE_THRESHOLD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Lease and retry policy.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// A processing job silent for longer than this is reclaimable
    pub stale_threshold: Duration,
    /// Failed attempts before a job is dead
    pub max_attempts: u32,
    /// Reaped leases before a job is dead (0 = unlimited)
    pub max_reaps: u32,
    /// Run the background reaper (claims always reap inline)
    pub reaper_enabled: bool,
    /// Interval of the background reaper
    pub reaper_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stale_threshold: Duration::from_millis(60_000),
            max_attempts: 3,
            max_reaps: 5,
            reaper_enabled: true,
            reaper_interval: Duration::from_secs(15),
        }
    }
}

impl CoordinatorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            stale_threshold: Duration::from_millis(
                std::env::var("STALE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(60_000),
            )
            .min(MAX_STALE_THRESHOLD),
            max_attempts: std::env::var("JOB_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(3),
            max_reaps: std::env::var("JOB_MAX_REAPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            reaper_enabled: std::env::var("REAPER_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            reaper_interval: Duration::from_secs(
                std::env::var("REAPER_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(15),
            ),
        }
    }

    /// Heartbeats older than this instant are stale.
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        stale_cutoff(now, self.stale_threshold)
    }

    /// True if a job that has already been reaped `reaps` times must be
    /// buried instead of released once more.
    pub fn reap_limit_reached(&self, reaps: u32) -> bool {
        self.max_reaps > 0 && reaps + 1 > self.max_reaps
    }
}

/// `now - threshold`, or `None` when that instant cannot be represented.
pub fn stale_cutoff(now: DateTime<Utc>, threshold: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(threshold)
        .ok()
        .and_then(|t| now.checked_sub_signed(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reap_limit() {
        let config = CoordinatorConfig {
            max_reaps: 2,
            ..Default::default()
        };
        assert!(!config.reap_limit_reached(0));
        assert!(!config.reap_limit_reached(1));
        assert!(config.reap_limit_reached(2));

        let unlimited = CoordinatorConfig {
            max_reaps: 0,
            ..Default::default()
        };
        assert!(!unlimited.reap_limit_reached(1_000));
    }

    #[test]
    fn test_stale_cutoff() {
        let now = Utc::now();
        let config = CoordinatorConfig::default();
        assert_eq!(config.stale_cutoff(now), Some(now - chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_stale_cutoff_out_of_range() {
        let now = Utc::now();
        // Fits in a chrono duration but lands before the earliest date
        assert_eq!(stale_cutoff(now, Duration::from_secs(10_000_000_000_000)), None);
        // Does not fit in a chrono duration at all
        assert_eq!(stale_cutoff(now, Duration::from_secs(u64::MAX / 1000)), None);
        assert_eq!(stale_cutoff(now, Duration::MAX), None);
    }
}
