//! # thing-cache
//!
//! The key/value store consumed by `thing-orm`'s cache-aside layer. Only three
//! operations matter to the ORM (`get`, `put`, `forget`); backends may offer
//! more.
//!
//! ```rust
//! use thing_cache::{CacheBackend, CacheConfig, MemoryBackend};
//!
//! # tokio_test_block_on(async {
//! let cache = MemoryBackend::new(CacheConfig::default());
//! cache.put("Member:1", b"{\"id\":1}".to_vec(), None).await.unwrap();
//! assert!(cache.get("Member:1").await.unwrap().is_some());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod backends;
pub mod config;

pub use backends::*;
pub use config::*;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Cache configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout error")]
    Timeout,
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Core cache backend trait
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a value with an optional TTL
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove a value, reporting whether it existed
    async fn forget(&self, key: &str) -> CacheResult<bool>;

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Clear every entry
    async fn flush(&self) -> CacheResult<()>;

    async fn forget_many(&self, keys: &[String]) -> CacheResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.forget(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(CacheStats::default())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_keys: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
