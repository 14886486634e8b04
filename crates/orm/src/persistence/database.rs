use super::{Persistence, Target};
use crate::backends::{DatabaseConnection, Row};
use crate::connection::ConnectionRouter;
use crate::error::{OrmError, OrmResult};
use crate::query::{
    DeleteStatement, InsertStatement, Predicate, Projection, SelectStatement, SqlExpr, Statement,
    UpdateStatement,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Persistence straight against the routed connections. Reads go to the
/// read section; writes, and the re-read that follows them, to the write
/// section.
pub struct DatabaseStore {
    router: Arc<ConnectionRouter>,
    debug: bool,
}

impl DatabaseStore {
    pub fn new(router: Arc<ConnectionRouter>, debug: bool) -> Self {
        Self { router, debug }
    }

    async fn connection(&self, target: &Target, is_read: bool) -> OrmResult<Arc<dyn DatabaseConnection>> {
        self.router
            .get_connection(&target.table, is_read, target.shard.as_deref())
            .await
    }

    fn trace(&self, conn: &dyn DatabaseConnection, statement: &Statement) {
        if self.debug {
            if let Ok(compiled) = statement.to_sql(&conn.dialect()) {
                info!("{} {:?}", compiled.sql, compiled.params);
            }
        }
    }

    async fn fetch_optional(&self, conn: &dyn DatabaseConnection, statement: Statement) -> OrmResult<Option<Row>> {
        self.trace(conn, &statement);
        conn.fetch_optional(&statement).await
    }

    async fn fetch_all(&self, conn: &dyn DatabaseConnection, statement: Statement) -> OrmResult<Vec<Row>> {
        self.trace(conn, &statement);
        conn.fetch_all(&statement).await
    }

    async fn execute(&self, conn: &dyn DatabaseConnection, statement: Statement) -> OrmResult<crate::backends::ExecResult> {
        self.trace(conn, &statement);
        conn.execute(&statement).await
    }

    fn select_by_pk(target: &Target, pk: &Value) -> Statement {
        Statement::Select(
            SelectStatement::new(target.table.clone())
                .filter(target.by_primary_key(pk))
                .limit(Some(1)),
        )
    }
}

#[async_trait]
impl Persistence for DatabaseStore {
    async fn find_by_pk(&self, target: &Target, pk: &Value) -> OrmResult<Option<Row>> {
        let conn = self.connection(target, true).await?;
        self.fetch_optional(conn.as_ref(), Self::select_by_pk(target, pk)).await
    }

    async fn find_one(&self, target: &Target, query: &SelectStatement) -> OrmResult<Option<Row>> {
        let conn = self.connection(target, true).await?;
        self.fetch_optional(conn.as_ref(), Statement::Select(query.clone())).await
    }

    async fn find_all(&self, target: &Target, query: &SelectStatement) -> OrmResult<Vec<Row>> {
        let conn = self.connection(target, true).await?;
        self.fetch_all(conn.as_ref(), Statement::Select(query.clone())).await
    }

    async fn count(&self, target: &Target, filters: &[Predicate]) -> OrmResult<i64> {
        let conn = self.connection(target, true).await?;
        let statement = Statement::Select(
            SelectStatement::new(target.table.clone())
                .columns(vec![Projection::aliased(
                    SqlExpr::function("count", target.primary_key.clone()),
                    "count",
                )])
                .filters(filters.to_vec()),
        );

        let row = self.fetch_optional(conn.as_ref(), statement).await?;
        let count = row.as_ref().and_then(|r| r.get("count")).and_then(|v| {
            v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
        });
        Ok(count.unwrap_or(0))
    }

    async fn primary_keys(&self, target: &Target, filters: &[Predicate]) -> OrmResult<Vec<Value>> {
        let conn = self.connection(target, true).await?;
        let statement = Statement::Select(
            SelectStatement::new(target.table.clone())
                .columns(vec![Projection::column(target.primary_key.clone())])
                .filters(filters.to_vec()),
        );

        let rows = self.fetch_all(conn.as_ref(), statement).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.remove(&target.primary_key))
            .collect())
    }

    async fn insert(&self, target: &Target, values: &Row) -> OrmResult<Row> {
        let conn = self.connection(target, false).await?;
        let result = self
            .execute(
                conn.as_ref(),
                Statement::Insert(InsertStatement {
                    table: target.table.clone(),
                    values: values.clone(),
                    returning: Some(target.primary_key.clone()),
                }),
            )
            .await?;

        let pk = values
            .get(&target.primary_key)
            .filter(|v| !v.is_null())
            .cloned()
            .or(result.last_insert_id)
            .ok_or_else(|| {
                OrmError::Database(format!(
                    "Insert into '{}' did not report a primary key",
                    target.table
                ))
            })?;

        self.fetch_optional(conn.as_ref(), Self::select_by_pk(target, &pk))
            .await?
            .ok_or_else(|| {
                OrmError::Database(format!(
                    "Inserted row {} not found in '{}'",
                    pk, target.table
                ))
            })
    }

    async fn update_by_pk(&self, target: &Target, pk: &Value, values: &Row) -> OrmResult<Option<Row>> {
        let conn = self.connection(target, false).await?;
        if !values.is_empty() {
            self.execute(
                conn.as_ref(),
                Statement::Update(UpdateStatement {
                    table: target.table.clone(),
                    values: values.clone(),
                    filters: vec![target.by_primary_key(pk)],
                }),
            )
            .await?;
        }

        self.fetch_optional(conn.as_ref(), Self::select_by_pk(target, pk)).await
    }

    async fn update_where(&self, target: &Target, filters: &[Predicate], values: &Row) -> OrmResult<u64> {
        let conn = self.connection(target, false).await?;
        let result = self
            .execute(
                conn.as_ref(),
                Statement::Update(UpdateStatement {
                    table: target.table.clone(),
                    values: values.clone(),
                    filters: filters.to_vec(),
                }),
            )
            .await?;
        Ok(result.rows_affected)
    }

    async fn delete_by_pk(&self, target: &Target, pk: &Value) -> OrmResult<u64> {
        self.delete_where(target, &[target.by_primary_key(pk)]).await
    }

    async fn delete_where(&self, target: &Target, filters: &[Predicate]) -> OrmResult<u64> {
        let conn = self.connection(target, false).await?;
        let result = self
            .execute(
                conn.as_ref(),
                Statement::Delete(DeleteStatement {
                    table: target.table.clone(),
                    filters: filters.to_vec(),
                }),
            )
            .await?;
        Ok(result.rows_affected)
    }
}
