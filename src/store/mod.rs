//! Job record persistence.
//!
//! One contract, two backends: [`RedisJobStore`] keeps records with a TTL so
//! stale jobs expire on their own, [`MemoryJobStore`] keeps them in-process for
//! setups without Redis. Which one runs is a configuration choice.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{AppConfig, StoreBackend};
use crate::models::job::{Job, JobPatch};

pub mod memory;
pub mod redis;

pub use self::memory::MemoryJobStore;
pub use self::redis::RedisJobStore;

/// Keyed storage for job records.
///
/// Implementations report backend failures as [`StoreError`]; callers decide
/// how to degrade. All mutation of an existing record goes through
/// [`Job::apply`], so lifecycle rules hold on every backend.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a record.
    async fn put(&self, job: &Job) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Merge `patch` into the record. `Ok(None)` when the id is unknown.
    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Option<Job>, StoreError>;

    /// Records ordered newest-created first.
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Job>, StoreError>;

    /// `Ok(false)` when there was nothing to delete.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

pub type SharedJobStore = Arc<dyn JobStore>;

/// Build the store selected by `STORE_BACKEND`.
pub fn from_config(config: &AppConfig) -> Result<SharedJobStore, StoreError> {
    match config.store_backend {
        StoreBackend::Redis => {
            let store = RedisJobStore::new(&config.redis_url, config.job_ttl_secs)?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => Ok(Arc::new(MemoryJobStore::new())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
