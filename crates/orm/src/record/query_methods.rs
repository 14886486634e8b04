//! Query builder methods on [`Record`]
//!
//! `filter`, `order_by` and `select` only stage state. `find`, `findall`,
//! `count`, `updateall` and bulk `delete` consume it. `count` leaves the
//! filters in place so the same filters can feed a following `findall`;
//! every other consumer clears them, even when the statement fails.

use super::Record;
use crate::backends::Row;
use crate::error::{OrmError, OrmResult};
use crate::query::types::require_array;
use crate::query::{parse_expr, parse_order, parse_projection, Predicate, QueryOperator, SelectStatement, SqlExpr};
use serde_json::Value;
use tracing::debug;

/// Page size used when `findall` is reached through dynamic finders
pub const DEFAULT_PAGE_SIZE: i64 = 20;

impl Record {
    fn check_column(&self, expr: &SqlExpr) -> OrmResult<()> {
        let column = expr.column_name();
        if column == "*" || self.schema.has_column(column) {
            Ok(())
        } else {
            Err(OrmError::Query(format!(
                "Unknown column '{}' on table '{}'",
                column, self.definition.table
            )))
        }
    }

    /// Add `field <operator> value` to the filter stack. `field` may be a
    /// column or `"func(column)"`; operators are `=`, `>`, `>=`, `<`, `<=`,
    /// `!=` and `in`.
    pub fn filter(&mut self, field: &str, operator: &str, value: impl Into<Value>) -> OrmResult<&mut Self> {
        let operator: QueryOperator = operator.parse()?;
        let expr = parse_expr(field)?;
        self.check_column(&expr)?;

        let value = value.into();
        if operator == QueryOperator::In {
            require_array(&value)?;
        }

        self.filters.push(Predicate::new(expr, operator, value));
        Ok(self)
    }

    pub fn where_eq(&mut self, field: &str, value: impl Into<Value>) -> OrmResult<&mut Self> {
        self.filter(field, "=", value)
    }

    pub fn where_in(&mut self, field: &str, values: Vec<Value>) -> OrmResult<&mut Self> {
        self.filter(field, "in", Value::Array(values))
    }

    /// `"column"` ascending or `"-column"` descending
    pub fn order_by(&mut self, spec: &str) -> OrmResult<&mut Self> {
        let ordering = parse_order(spec)?;
        if !self.schema.has_column(&ordering.column) {
            return Err(OrmError::Query(format!(
                "Unknown column '{}' on table '{}'",
                ordering.column, self.definition.table
            )));
        }
        self.ordering = ordering;
        Ok(self)
    }

    /// Replace the projection. Entries are `"column"`, `"func(column)"` or
    /// `"func(column) as alias"`.
    pub fn select(&mut self, fields: &[&str]) -> OrmResult<&mut Self> {
        let mut projection = Vec::with_capacity(fields.len());
        for field in fields {
            let entry = parse_projection(field)?;
            self.check_column(&entry.expr)?;
            projection.push(entry);
        }
        self.projection = projection;
        Ok(self)
    }

    fn take_query(&mut self) -> SelectStatement {
        SelectStatement::new(self.definition.table.clone())
            .columns(std::mem::take(&mut self.projection))
            .filters(std::mem::take(&mut self.filters))
    }

    /// Load the first row matching the filter stack. A miss leaves the
    /// record empty.
    pub async fn find(&mut self) -> OrmResult<&mut Self> {
        let query = self.take_query().limit(Some(1));
        let row = self.store.find_one(&self.target(), &query).await?;
        self.current = row.unwrap_or_default();
        Ok(self)
    }

    /// Load one row by primary key, ignoring the filter stack. Goes through
    /// the cache when the model is cached.
    pub async fn find_by_primary_key(&mut self, pk: impl Into<Value>) -> OrmResult<&mut Self> {
        self.filters.clear();
        self.projection.clear();

        let pk = pk.into();
        let row = self.store.find_by_pk(&self.target(), &pk).await?;
        self.current = row.unwrap_or_default();
        Ok(self)
    }

    /// Load a page ordered by the current ordering. `limit == -1` is
    /// unbounded; `offset` applies either way.
    pub async fn findall(&mut self, limit: i64, offset: u64) -> OrmResult<&mut Self> {
        let query = self.take_query();
        let limit = match limit {
            -1 => None,
            n if n < -1 => {
                return Err(OrmError::Query(format!("Invalid limit {}", n)));
            }
            n => Some(n as u64),
        };

        let query = query
            .order(Some(self.ordering.clone()))
            .limit(limit)
            .offset(offset);
        self.results = self.store.find_all(&self.target(), &query).await?;
        self.cursor = -1;
        debug!(
            "findall on {} returned {} rows",
            self.definition.table,
            self.results.len()
        );
        Ok(self)
    }

    /// `COUNT(primary key)` over the filter stack, which is kept
    pub async fn count(&self) -> OrmResult<i64> {
        self.store.count(&self.target(), &self.filters).await
    }

    /// Bulk update of every row matching the filter stack
    pub async fn updateall(&mut self, values: Row) -> OrmResult<u64> {
        let filters = std::mem::take(&mut self.filters);
        if values.is_empty() {
            return Err(OrmError::Query("updateall needs at least one field".to_string()));
        }
        for column in values.keys() {
            if !self.schema.has_column(column) {
                return Err(OrmError::Query(format!(
                    "Unknown column '{}' on table '{}'",
                    column, self.definition.table
                )));
            }
        }

        self.store.update_where(&self.target(), &filters, &values).await
    }

    /// Run raw SQL on the read connection of this model's table
    pub async fn execute_raw(&self, sql: &str) -> OrmResult<Vec<Row>> {
        let target = self.target();
        let conn = self
            .ctx
            .router()
            .get_connection(&target.table, true, target.shard.as_deref())
            .await?;
        conn.execute_raw(sql).await
    }
}

#[cfg(test)]
mod tests {
    use crate::backends::MemoryBackend;
    use crate::config::{DatabaseSection, ThingConfig};
    use crate::context::Context;
    use crate::error::OrmError;
    use crate::model::ModelDefinition;
    use crate::query::{OrderBy, QueryOperator, SqlExpr};
    use crate::record::Record;
    use crate::schema::TableSchema;
    use serde_json::json;
    use std::sync::Arc;

    async fn member_record(name: &str) -> Record {
        let memory = Arc::new(MemoryBackend::new());
        let db = memory.database(name);
        db.create_table(
            TableSchema::new("member")
                .with_primary_key("id", "integer")
                .with_column("email", "text")
                .with_column("age", "integer"),
        );
        let url = format!("memory://{}", name);
        let config = ThingConfig::new()
            .with_section("master", DatabaseSection::new(url.clone()))
            .with_section("slave", DatabaseSection::new(url));
        let ctx = Context::builder(config)
            .backend(memory)
            .definition(ModelDefinition::new("Member"))
            .build()
            .await
            .unwrap();

        let mut record = ctx.record_named("Member").await.unwrap();
        for (email, age) in [("a@x.com", 17), ("b@x.com", 30), ("c@x.com", 45)] {
            record.reset();
            record.set("email", email).set("age", age);
            record.save().await.unwrap();
        }
        record.reset();
        record
    }

    #[tokio::test]
    async fn test_filter_rejects_bad_input() {
        let mut record = member_record("qm_bad_input").await;

        assert!(matches!(record.filter("age", "~", 1), Err(OrmError::Query(_))));
        assert!(matches!(record.filter("nickname", "=", 1), Err(OrmError::Query(_))));
        assert!(matches!(record.filter("max(age", "=", 1), Err(OrmError::Query(_))));
        assert!(matches!(record.filter("id", "in", 1), Err(OrmError::Query(_))));
        assert!(record.filters().is_empty());
    }

    #[tokio::test]
    async fn test_filter_parses_function_expressions() {
        let mut record = member_record("qm_functions").await;
        record.filter("lower(email)", "=", "a@x.com").unwrap();

        let predicate = &record.filters()[0];
        assert_eq!(predicate.expr, SqlExpr::function("lower", "email"));
        assert_eq!(predicate.operator, QueryOperator::Equal);
    }

    #[tokio::test]
    async fn test_findall_orders_and_pages() {
        let mut record = member_record("qm_paging").await;

        record.findall(-1, 0).await.unwrap();
        assert_eq!(record.get_field("id"), vec![json!(3), json!(2), json!(1)]);

        record.order_by("age").unwrap();
        record.findall(2, 1).await.unwrap();
        assert_eq!(record.get_field("age"), vec![json!(30), json!(45)]);

        assert!(matches!(record.findall(-2, 0).await, Err(OrmError::Query(_))));
    }

    #[tokio::test]
    async fn test_select_with_aggregate_alias() {
        let mut record = member_record("qm_select").await;
        record.select(&["max(age) as oldest"]).unwrap();
        record.find().await.unwrap();

        assert_eq!(record.get("oldest").unwrap(), json!(45));
        assert!(record.projection().is_empty());
    }

    #[tokio::test]
    async fn test_updateall_applies_to_filtered_rows() {
        let mut record = member_record("qm_updateall").await;
        record.filter("age", ">", 18).unwrap();

        let mut values = crate::backends::Row::new();
        values.insert("email".into(), json!("adult@x.com"));
        assert_eq!(record.updateall(values).await.unwrap(), 2);
        assert!(record.filters().is_empty());

        record.where_eq("email", "adult@x.com").unwrap();
        assert_eq!(record.count().await.unwrap(), 2);
        assert_eq!(record.ordering(), &OrderBy::desc("id"));
    }

    #[tokio::test]
    async fn test_raw_sql_is_rejected_by_memory_backend() {
        let record = member_record("qm_raw").await;
        assert!(matches!(
            record.execute_raw("SELECT 1").await,
            Err(OrmError::Query(_))
        ));
    }
}
