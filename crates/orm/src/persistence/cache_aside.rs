//! Read-through / invalidate-on-write decorator
//!
//! Cache failures never fail the surrounding operation: they are logged and
//! the database result stands.
//!
//! Bulk updates and deletes learn which keys to invalidate from a SELECT
//! issued before the write. Rows that start matching between that SELECT and
//! the write keep their stale cache entries.

use super::{Persistence, Target};
use crate::backends::Row;
use crate::error::OrmResult;
use crate::query::{Predicate, SelectStatement};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thing_cache::CacheBackend;
use tracing::{debug, warn};

pub struct CachedStore {
    inner: Arc<dyn Persistence>,
    cache: Arc<dyn CacheBackend>,
    ttl: Option<Duration>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn Persistence>, cache: Arc<dyn CacheBackend>) -> Self {
        Self {
            inner,
            cache,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    async fn cached_row(&self, key: &str) -> Option<Row> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Row>(&bytes) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!("Ignoring undecodable cache entry '{}': {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read of '{}' failed, using the database: {}", key, e);
                None
            }
        }
    }

    async fn store_row(&self, key: &str, row: &Row) {
        let bytes = match serde_json::to_vec(row) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot serialize row for '{}': {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.put(key, bytes, self.ttl).await {
            warn!("Cache write of '{}' failed: {}", key, e);
        }
    }

    async fn invalidate(&self, target: &Target, keys: &[Value]) {
        for pk in keys {
            let key = target.cache_key(pk);
            match self.cache.forget(&key).await {
                Ok(_) => debug!("Invalidated '{}'", key),
                Err(e) => warn!("Cache invalidation of '{}' failed: {}", key, e),
            }
        }
    }
}

#[async_trait]
impl Persistence for CachedStore {
    async fn find_by_pk(&self, target: &Target, pk: &Value) -> OrmResult<Option<Row>> {
        let key = target.cache_key(pk);
        if let Some(row) = self.cached_row(&key).await {
            debug!("Cache hit for '{}'", key);
            return Ok(Some(row));
        }

        let row = self.inner.find_by_pk(target, pk).await?;
        if let Some(row) = &row {
            self.store_row(&key, row).await;
        }
        Ok(row)
    }

    async fn find_one(&self, target: &Target, query: &SelectStatement) -> OrmResult<Option<Row>> {
        self.inner.find_one(target, query).await
    }

    async fn find_all(&self, target: &Target, query: &SelectStatement) -> OrmResult<Vec<Row>> {
        self.inner.find_all(target, query).await
    }

    async fn count(&self, target: &Target, filters: &[Predicate]) -> OrmResult<i64> {
        self.inner.count(target, filters).await
    }

    async fn primary_keys(&self, target: &Target, filters: &[Predicate]) -> OrmResult<Vec<Value>> {
        self.inner.primary_keys(target, filters).await
    }

    async fn insert(&self, target: &Target, values: &Row) -> OrmResult<Row> {
        let row = self.inner.insert(target, values).await?;
        if let Some(pk) = row.get(&target.primary_key) {
            self.store_row(&target.cache_key(pk), &row).await;
        }
        Ok(row)
    }

    async fn update_by_pk(&self, target: &Target, pk: &Value, values: &Row) -> OrmResult<Option<Row>> {
        let row = self.inner.update_by_pk(target, pk, values).await?;
        self.invalidate(target, std::slice::from_ref(pk)).await;
        Ok(row)
    }

    async fn update_where(&self, target: &Target, filters: &[Predicate], values: &Row) -> OrmResult<u64> {
        let keys = self.inner.primary_keys(target, filters).await?;
        let affected = self.inner.update_where(target, filters, values).await?;
        self.invalidate(target, &keys).await;
        Ok(affected)
    }

    async fn delete_by_pk(&self, target: &Target, pk: &Value) -> OrmResult<u64> {
        self.invalidate(target, std::slice::from_ref(pk)).await;
        self.inner.delete_by_pk(target, pk).await
    }

    async fn delete_where(&self, target: &Target, filters: &[Predicate]) -> OrmResult<u64> {
        let keys = self.inner.primary_keys(target, filters).await?;
        self.invalidate(target, &keys).await;
        self.inner.delete_where(target, filters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{DatabaseBackendRegistry, MemoryBackend, MemoryDatabase};
    use crate::config::{DatabaseSection, ThingConfig};
    use crate::connection::ConnectionRouter;
    use crate::persistence::DatabaseStore;
    use crate::schema::TableSchema;
    use serde_json::json;
    use thing_cache::{CacheConfig, CacheError, CacheResult, MemoryBackend as MemoryCache};

    struct UnreachableCache;

    #[async_trait]
    impl CacheBackend for UnreachableCache {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Network("connection refused".into()))
        }

        async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> CacheResult<()> {
            Err(CacheError::Network("connection refused".into()))
        }

        async fn forget(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::Network("connection refused".into()))
        }

        async fn flush(&self) -> CacheResult<()> {
            Err(CacheError::Network("connection refused".into()))
        }
    }

    fn database_store() -> (Arc<MemoryDatabase>, Arc<dyn Persistence>) {
        let memory = Arc::new(MemoryBackend::new());
        let db = memory.database("cache_aside");
        db.create_table(
            TableSchema::new("member")
                .with_primary_key("id", "integer")
                .with_column("email", "text"),
        );

        let mut registry = DatabaseBackendRegistry::new();
        registry.register(memory);
        let config = ThingConfig::new()
            .with_section("master", DatabaseSection::new("memory://cache_aside"))
            .with_section("slave", DatabaseSection::new("memory://cache_aside"));
        let router = Arc::new(ConnectionRouter::new(Arc::new(config), Arc::new(registry)));
        (db, Arc::new(DatabaseStore::new(router, false)))
    }

    fn member_row(email: &str) -> Row {
        let mut row = Row::new();
        row.insert("email".into(), json!(email));
        row
    }

    #[tokio::test]
    async fn test_insert_populates_cache_and_find_skips_database() {
        let (db, inner) = database_store();
        let cache = Arc::new(MemoryCache::new(CacheConfig::default()));
        let store = CachedStore::new(inner, cache.clone());
        let target = Target::new("Member", "member", "id");

        let row = store.insert(&target, &member_row("a@x.com")).await.unwrap();
        assert!(cache.get("Member:1").await.unwrap().is_some());

        let before = db.statement_count();
        let found = store.find_by_pk(&target, &json!(1)).await.unwrap();
        assert_eq!(db.statement_count(), before);
        assert_eq!(found, Some(row));
    }

    #[tokio::test]
    async fn test_bulk_delete_invalidates_each_key() {
        let (_db, inner) = database_store();
        let cache = Arc::new(MemoryCache::new(CacheConfig::default()));
        let store = CachedStore::new(inner, cache.clone());
        let target = Target::new("Member", "member", "id");

        store.insert(&target, &member_row("a@x.com")).await.unwrap();
        store.insert(&target, &member_row("b@x.com")).await.unwrap();

        let deleted = store.delete_where(&target, &[]).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(cache.get("Member:1").await.unwrap().is_none());
        assert!(cache.get("Member:2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_cache_degrades_to_database() {
        let (_db, inner) = database_store();
        let store = CachedStore::new(inner, Arc::new(UnreachableCache));
        let target = Target::new("Member", "member", "id");

        let row = store.insert(&target, &member_row("a@x.com")).await.unwrap();
        let found = store.find_by_pk(&target, &json!(1)).await.unwrap();
        assert_eq!(found, Some(row));
        assert_eq!(store.delete_by_pk(&target, &json!(1)).await.unwrap(), 1);
    }
}
