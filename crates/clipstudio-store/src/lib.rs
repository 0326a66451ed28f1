//! Job record store.
//!
//! This crate provides:
//! - The `JobStore` contract: insert, point lookup, compare-and-swap, scan
//! - An in-memory store guarded by a single lock (tests, single-node runs)
//! - A Redis store using Lua scripts for atomic revision checks
//! - Backend selection from environment variables

pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod redis_store;
pub mod store;

pub use config::{StoreBackend, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;
pub use store::{JobFilter, JobStore};
