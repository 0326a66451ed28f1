//! Background service that returns expired leases to the pool.
//!
//! Claims already reap inline; this loop keeps reaping while no worker is
//! polling, so `listStuck` and operators see recovered jobs promptly.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::coordinator::{LeaseCoordinator, ReapReport};
use crate::error::CoordinatorResult;

pub struct Reaper {
    coordinator: Arc<LeaseCoordinator>,
}

impl Reaper {
    pub fn new(coordinator: Arc<LeaseCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Run until `shutdown` flips to true. Should be spawned as a
    /// background task.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let config = self.coordinator.config();
        if !config.reaper_enabled {
            info!("Background reaper is disabled");
            return;
        }

        info!(
            interval_secs = config.reaper_interval.as_secs(),
            stale_ms = config.stale_threshold.as_millis() as u64,
            max_reaps = config.max_reaps,
            "Starting background reaper"
        );

        let mut ticker = interval(config.reaper_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.check_once().await {
                        error!("Reaper sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Background reaper stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Run a single sweep.
    pub async fn check_once(&self) -> CoordinatorResult<ReapReport> {
        let report = self.coordinator.reap_stale().await?;
        if report.reaped() > 0 || report.conflicts > 0 {
            info!(
                reset = report.reset,
                dead = report.dead,
                conflicts = report.conflicts,
                "Reaper sweep complete"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::CoordinatorConfig;
    use chrono::{Duration, Utc};
    use clipstudio_models::{Job, JobStatus, JobType};
    use clipstudio_store::{JobStore, MemoryJobStore};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn test_check_once_reaps_silent_lease() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let coordinator = Arc::new(
            LeaseCoordinator::new(Arc::clone(&store), CoordinatorConfig::default())
                .with_clock(clock.clone()),
        );

        let job = Job::new(JobType::VideoClip, serde_json::json!({}), "u", 3, clock.now());
        let job = store.insert(job).await.unwrap();
        coordinator.claim("w1").await.unwrap().unwrap();

        let reaper = Reaper::new(Arc::clone(&coordinator));
        assert_eq!(reaper.check_once().await.unwrap().reaped(), 0);

        clock.advance(Duration::seconds(61));
        let report = reaper.check_once().await.unwrap();
        assert_eq!(report.reset, 1);

        let job = store.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let config = CoordinatorConfig {
            reaper_interval: StdDuration::from_millis(10),
            ..Default::default()
        };
        let coordinator = Arc::new(LeaseCoordinator::new(Arc::new(MemoryJobStore::new()), config));
        let reaper = Reaper::new(coordinator);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { reaper.run(rx).await });

        tokio::time::sleep(StdDuration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(StdDuration::from_secs(1), handle)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }
}
