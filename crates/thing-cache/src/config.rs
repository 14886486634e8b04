//! Cache configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by all backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// TTL applied when the caller passes none
    pub default_ttl: Option<Duration>,

    /// Maximum number of entries (memory backend)
    pub max_entries: Option<usize>,

    pub connection_timeout: Duration,

    pub operation_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: None,
            max_entries: Some(10_000),
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(1),
        }
    }
}

impl CacheConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn unlimited_entries(mut self) -> Self {
        self.max_entries = None;
        self
    }
}
