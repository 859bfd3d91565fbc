//! Cache Layer.
//!
//! The cache is accelerative, never authoritative: [`CacheLayer`] swallows
//! every [`CacheError`] so a cache outage degrades to store reads.
//!
//! Backends:
//! - [`InMemoryCache`] (default, per process)
//! - [`RedisCache`] (feature `redis`)

pub mod in_memory;
pub mod keys;
pub mod layer;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use in_memory::InMemoryCache;
pub use layer::CacheLayer;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),

    #[error("cache command error: {0}")]
    Command(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),

    #[error("cache call timed out after {0:?}")]
    Timeout(Duration),
}

/// Raw string key/value cache.
#[async_trait]
pub trait Cache: Send + Sync {
    /// `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`. Returns how many were removed.
    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}
