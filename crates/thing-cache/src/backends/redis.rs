//! Redis cache backend

use crate::{CacheBackend, CacheConfig, CacheError, CacheResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

/// Redis connection settings
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,

    /// Prepended to every key
    pub key_prefix: Option<String>,

    pub cache: CacheConfig,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            key_prefix: None,
            cache: CacheConfig::default(),
        }
    }
}

impl RedisConfig {
    /// Build from the `host`/`port`/`db` triple used by the ORM settings file
    pub fn from_parts(host: &str, port: u16, db: i64) -> Self {
        Self {
            url: format!("redis://{}:{}/{}", host, port, db),
            ..Self::default()
        }
    }

    pub fn with_key_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.cache.default_ttl = Some(ttl);
        self
    }
}

/// Cache backend over a multiplexed Redis connection
pub struct RedisBackend {
    connection: ConnectionManager,
    config: RedisConfig,
}

impl RedisBackend {
    pub async fn new(config: RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::Configuration(format!("Invalid Redis URL: {}", e)))?;

        let connection = tokio::time::timeout(
            config.cache.connection_timeout,
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| CacheError::Timeout)?
        .map_err(|e| CacheError::Network(format!("Failed to connect to Redis: {}", e)))?;

        debug!("Redis cache connected to {}", config.url);
        Ok(Self { connection, config })
    }

    fn key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }

    async fn run<T, F>(&self, op: &str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.cache.operation_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("Redis {} failed: {}", op, e);
                Err(CacheError::Backend(e.to_string()))
            }
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let key = self.key(key);
        self.run("GET", async move { conn.get::<_, Option<Vec<u8>>>(key).await })
            .await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let key = self.key(key);
        match ttl.or(self.config.cache.default_ttl) {
            Some(ttl) => {
                let seconds = ttl.as_secs().max(1) as usize;
                self.run("SETEX", async move {
                    conn.set_ex::<_, _, ()>(key, value, seconds).await
                })
                .await
            }
            None => {
                self.run("SET", async move { conn.set::<_, _, ()>(key, value).await })
                    .await
            }
        }
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let key = self.key(key);
        let removed: i64 = self
            .run("DEL", async move { conn.del::<_, i64>(key).await })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let key = self.key(key);
        self.run("EXISTS", async move { conn.exists::<_, bool>(key).await })
            .await
    }

    async fn flush(&self) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        self.run("FLUSHDB", async move {
            redis::cmd("FLUSHDB").query_async::<_, ()>(&mut conn).await
        })
        .await
    }
}
