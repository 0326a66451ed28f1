//! Lease heartbeat while a render is in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use clipstudio_models::JobId;

use crate::client::CoordinatorClient;
use crate::retry::FailureStreak;

/// Why the heartbeat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEnd {
    /// Stopped by the executor
    Stopped,
    /// The coordinator says this worker no longer holds the lease
    LeaseLost,
}

/// Background heartbeat for one job, stopped through a `watch` channel.
pub struct Heartbeat {
    stop: watch::Sender<bool>,
    handle: JoinHandle<HeartbeatEnd>,
}

impl Heartbeat {
    /// Start heartbeating `job_id` every `every`. The first beat goes out
    /// one interval after the claim.
    pub fn spawn(client: Arc<CoordinatorClient>, job_id: JobId, every: Duration) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut failures = FailureStreak::new(3);

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            debug!(job_id = %job_id, "Heartbeat stopped");
                            return HeartbeatEnd::Stopped;
                        }
                    }
                    _ = ticker.tick() => {
                        match client.heartbeat(&job_id).await {
                            Ok(()) => {
                                failures.reset();
                                debug!(job_id = %job_id, "Heartbeat sent");
                            }
                            Err(e) if e.is_lease_lost() => {
                                warn!(
                                    job_id = %job_id,
                                    worker_id = %client.worker_id(),
                                    "Lease lost, heartbeat stopped: {}", e
                                );
                                return HeartbeatEnd::LeaseLost;
                            }
                            Err(e) => {
                                if failures.fail() {
                                    warn!(
                                        job_id = %job_id,
                                        failures = failures.count(),
                                        "Heartbeat failed: {}", e
                                    );
                                }
                            }
                        }
                    }
                }
            }
        });

        Self { stop, handle }
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(self) -> HeartbeatEnd {
        let _ = self.stop.send(true);
        match self.handle.await {
            Ok(end) => end,
            Err(e) => {
                warn!("Heartbeat task ended abnormally: {}", e);
                HeartbeatEnd::Stopped
            }
        }
    }
}
