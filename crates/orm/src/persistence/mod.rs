//! The persistence capability records are built on
//!
//! [`DatabaseStore`] talks to the database through the router.
//! [`CachedStore`] wraps any [`Persistence`] with read-through on primary-key
//! lookups and invalidate-on-write.

pub mod cache_aside;
pub mod database;

pub use cache_aside::CachedStore;
pub use database::DatabaseStore;

use crate::backends::Row;
use crate::error::OrmResult;
use crate::query::{Predicate, SelectStatement};
use async_trait::async_trait;
use serde_json::Value;

/// Where an operation lands: model identity for cache keys, table and key
/// column for statements, shard for routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub model: String,
    pub table: String,
    pub primary_key: String,
    pub shard: Option<String>,
}

impl Target {
    pub fn new(model: impl Into<String>, table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            table: table.into(),
            primary_key: primary_key.into(),
            shard: None,
        }
    }

    pub fn with_shard(mut self, shard: Option<String>) -> Self {
        self.shard = shard;
        self
    }

    /// `"<ModelName>:<primary key>"`
    pub fn cache_key(&self, pk: &Value) -> String {
        match pk {
            Value::String(s) => format!("{}:{}", self.model, s),
            other => format!("{}:{}", self.model, other),
        }
    }

    pub fn by_primary_key(&self, pk: &Value) -> Predicate {
        Predicate::eq(self.primary_key.clone(), pk.clone())
    }
}

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Load one row by primary key
    async fn find_by_pk(&self, target: &Target, pk: &Value) -> OrmResult<Option<Row>>;

    /// First row of a filtered select
    async fn find_one(&self, target: &Target, query: &SelectStatement) -> OrmResult<Option<Row>>;

    async fn find_all(&self, target: &Target, query: &SelectStatement) -> OrmResult<Vec<Row>>;

    /// `COUNT(primary key)` over the filtered rows
    async fn count(&self, target: &Target, filters: &[Predicate]) -> OrmResult<i64>;

    /// Primary keys of the filtered rows
    async fn primary_keys(&self, target: &Target, filters: &[Predicate]) -> OrmResult<Vec<Value>>;

    /// Insert and return the stored row, generated key included
    async fn insert(&self, target: &Target, values: &Row) -> OrmResult<Row>;

    /// Update one row and return it as stored afterwards
    async fn update_by_pk(&self, target: &Target, pk: &Value, values: &Row) -> OrmResult<Option<Row>>;

    async fn update_where(&self, target: &Target, filters: &[Predicate], values: &Row) -> OrmResult<u64>;

    async fn delete_by_pk(&self, target: &Target, pk: &Value) -> OrmResult<u64>;

    async fn delete_where(&self, target: &Target, filters: &[Predicate]) -> OrmResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_format() {
        let target = Target::new("Member", "member", "id");
        assert_eq!(target.cache_key(&json!(42)), "Member:42");
        assert_eq!(target.cache_key(&json!("abc")), "Member:abc");
    }
}
