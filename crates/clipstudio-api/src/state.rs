//! Application state.

use std::sync::Arc;

use clipstudio_queue::{CoordinatorConfig, JobProducer, LeaseCoordinator, WorkerKeyring, WorkerVerifier};
use clipstudio_store::{JobStore, StoreConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStore>,
    pub producer: Arc<JobProducer>,
    pub coordinator: Arc<LeaseCoordinator>,
    pub verifier: Arc<WorkerVerifier>,
}

impl AppState {
    /// Create application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = StoreConfig::from_env()?.connect().await?;
        let keyring = WorkerKeyring::from_env()?;
        Ok(Self::from_parts(config, store, CoordinatorConfig::from_env(), keyring))
    }

    /// Wire state from already-built parts.
    pub fn from_parts(
        config: ApiConfig,
        store: Arc<dyn JobStore>,
        coordinator_config: CoordinatorConfig,
        keyring: WorkerKeyring,
    ) -> Self {
        let producer = JobProducer::new(Arc::clone(&store), &coordinator_config);
        let coordinator = LeaseCoordinator::new(Arc::clone(&store), coordinator_config);

        Self {
            config,
            store,
            producer: Arc::new(producer),
            coordinator: Arc::new(coordinator),
            verifier: Arc::new(WorkerVerifier::new(Arc::new(keyring))),
        }
    }
}
