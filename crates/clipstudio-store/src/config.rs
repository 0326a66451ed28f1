//! Store backend selection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryJobStore;
use crate::redis_store::{RedisJobStore, DEFAULT_KEY_PREFIX};
use crate::store::JobStore;

/// Which persistence backend holds job records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Process memory; records are lost on restart
    #[default]
    Memory,
    /// Redis or Valkey
    Redis,
}

impl FromStr for StoreBackend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "redis" | "valkey" => Ok(StoreBackend::Redis),
            other => Err(StoreError::Unavailable(format!(
                "unknown store backend: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Redis => write!(f, "redis"),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis URL (redis backend only)
    pub redis_url: String,
    /// Prefix for every Redis key
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    ///
    /// An unrecognised `STORE_BACKEND` is an error rather than a silent
    /// fallback to memory.
    pub fn from_env() -> StoreResult<Self> {
        let backend = match std::env::var("STORE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StoreBackend::Memory,
        };

        Ok(Self {
            backend,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("STORE_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_KEY_PREFIX.to_string()),
        })
    }

    /// Build the configured store and check that it answers.
    pub async fn connect(&self) -> StoreResult<Arc<dyn JobStore>> {
        let store: Arc<dyn JobStore> = match self.backend {
            StoreBackend::Memory => Arc::new(MemoryJobStore::new()),
            StoreBackend::Redis => {
                Arc::new(RedisJobStore::new(&self.redis_url, self.key_prefix.clone())?)
            }
        };

        store.ping().await?;
        info!(backend = %self.backend, "Job store ready");
        Ok(store)
    }
}
