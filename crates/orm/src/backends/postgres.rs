//! PostgreSQL Backend Implementation
//!
//! Uses sqlx as the underlying driver. Each routing section gets its own pool;
//! the pool is the shared handle the router caches.
//!
//! sqlx sends every string parameter as TEXT, which Postgres will not assign
//! or compare to uuid, timestamp or numeric columns. Each connection keeps
//! the column types of the tables it has touched and compiles statements
//! with explicit casts.

use super::core::*;
use super::DatabaseBackendType;
use crate::config::DatabaseSection;
use crate::error::{OrmError, OrmResult};
use crate::query::{CompiledQuery, Statement};
use crate::schema::{ColumnInfo, TableSchema};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column, Pool, Postgres, Row as SqlxRow};
use std::time::Duration;
use std::sync::Arc;
use tracing::{debug, error, warn};

const DESCRIBE_TABLE_SQL: &str = r#"
SELECT c.column_name::text AS column_name,
       c.udt_name::text AS data_type,
       c.is_nullable::text AS is_nullable,
       EXISTS (
           SELECT 1
           FROM information_schema.table_constraints tc
           JOIN information_schema.key_column_usage k
             ON tc.constraint_name = k.constraint_name
            AND tc.table_schema = k.table_schema
           WHERE tc.constraint_type = 'PRIMARY KEY'
             AND tc.table_schema = c.table_schema
             AND tc.table_name = c.table_name
             AND k.column_name = c.column_name
       ) AS is_primary
FROM information_schema.columns c
WHERE c.table_schema = current_schema()
  AND c.table_name = $1
ORDER BY c.ordinal_position
"#;

/// PostgreSQL database backend implementation
#[derive(Debug, Default)]
pub struct PostgresBackend;

impl PostgresBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseBackend for PostgresBackend {
    async fn connect(&self, section: &DatabaseSection) -> OrmResult<Arc<dyn DatabaseConnection>> {
        let mut options = PgPoolOptions::new();
        if let Some(max) = section.max_connections {
            options = options.max_connections(max);
        }
        if let Some(min) = section.min_connections {
            options = options.min_connections(min);
        }
        if let Some(timeout) = section.acquire_timeout() {
            options = options.acquire_timeout(timeout);
        }
        if let Some(idle) = section.idle_timeout {
            options = options.idle_timeout(Duration::from_secs(idle));
        }
        if let Some(lifetime) = section.max_lifetime {
            options = options.max_lifetime(Duration::from_secs(lifetime));
        }

        let pool = options.connect_with(connect_options(section)?).await.map_err(|e| {
            error!("Failed to create PostgreSQL pool: {}", e);
            OrmError::Connection(format!("Failed to create PostgreSQL pool: {}", e))
        })?;

        Ok(Arc::new(PostgresConnection::new(pool)))
    }

    fn sql_dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::PostgreSQL
    }

    fn validate_database_url(&self, url: &str) -> OrmResult<()> {
        let parsed = url::Url::parse(url)
            .map_err(|e| OrmError::Configuration(format!("Invalid database URL: {}", e)))?;

        if parsed.scheme() != "postgresql" && parsed.scheme() != "postgres" {
            return Err(OrmError::Configuration("Invalid PostgreSQL URL scheme".to_string()));
        }
        if parsed.host_str().is_none() {
            return Err(OrmError::Configuration("Missing host in database URL".to_string()));
        }
        Ok(())
    }
}

/// Parse the section URL and apply the driver options this backend
/// understands. Unknown keys are logged and skipped.
fn connect_options(section: &DatabaseSection) -> OrmResult<PgConnectOptions> {
    let mut options = section
        .url
        .parse::<PgConnectOptions>()
        .map_err(|e| OrmError::Configuration(format!("Invalid database URL: {}", e)))?;

    for (key, value) in &section.options {
        let invalid = || {
            OrmError::Configuration(format!("Invalid value {} for driver option '{}'", value, key))
        };
        options = match key.as_str() {
            "statement_cache_capacity" => {
                let capacity = value.as_u64().ok_or_else(invalid)?;
                options.statement_cache_capacity(capacity as usize)
            }
            "application_name" => options.application_name(value.as_str().ok_or_else(invalid)?),
            _ => {
                warn!("Ignoring unknown PostgreSQL option '{}'", key);
                options
            }
        };
    }
    Ok(options)
}

/// Pooled PostgreSQL handle
pub struct PostgresConnection {
    pool: Pool<Postgres>,
    column_types: DashMap<String, Arc<TableSchema>>,
}

impl PostgresConnection {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            column_types: DashMap::new(),
        }
    }

    async fn reflect(&self, table: &str) -> OrmResult<Option<TableSchema>> {
        debug!("Reflecting table '{}'", table);
        let rows = sqlx::query(DESCRIBE_TABLE_SQL)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Reflection of '{}' failed: {}", table, e);
                OrmError::Schema(format!("Failed to reflect table '{}': {}", table, e))
            })?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut schema = TableSchema::new(table);
        for row in rows {
            let name: String = row.try_get("column_name")?;
            let data_type: String = row.try_get("data_type")?;
            let nullable: String = row.try_get("is_nullable")?;
            let primary_key: bool = row.try_get("is_primary")?;

            let mut column = ColumnInfo::new(name, data_type);
            column.nullable = nullable == "YES";
            column.primary_key = primary_key;
            schema.columns.push(column);
        }

        self.column_types
            .insert(table.to_string(), Arc::new(schema.clone()));
        Ok(Some(schema))
    }

    async fn table_schema(&self, table: &str) -> OrmResult<Option<Arc<TableSchema>>> {
        if let Some(schema) = self.column_types.get(table) {
            return Ok(Some(schema.clone()));
        }
        Ok(self.reflect(table).await?.map(Arc::new))
    }

    async fn compile(&self, statement: &Statement) -> OrmResult<CompiledQuery> {
        let schema = self.table_schema(statement.table()).await?;
        let compiled = statement.to_sql_for(&SqlDialect::PostgreSQL, schema.as_deref())?;
        debug!("{} {:?}", compiled.sql, compiled.params);
        Ok(compiled)
    }

    fn query<'q>(
        compiled: &'q CompiledQuery,
    ) -> OrmResult<sqlx::query::Query<'q, Postgres, PgArguments>> {
        let mut query = sqlx::query(&compiled.sql);
        for param in &compiled.params {
            query = bind_database_value(query, DatabaseValue::from_json(param))?;
        }
        Ok(query)
    }
}

#[async_trait]
impl DatabaseConnection for PostgresConnection {
    async fn execute(&self, statement: &Statement) -> OrmResult<ExecResult> {
        let compiled = self.compile(statement).await?;
        let query = Self::query(&compiled)?;

        if let Statement::Insert(insert) = statement {
            if let Some(returning) = &insert.returning {
                let row = query.fetch_optional(&self.pool).await.map_err(|e| {
                    error!("Insert into {} failed: {}", insert.table, e);
                    OrmError::from(e)
                })?;
                let last_insert_id = match row {
                    Some(row) => row_to_json(&row)?.remove(returning),
                    None => None,
                };
                return Ok(ExecResult {
                    rows_affected: 1,
                    last_insert_id,
                });
            }
        }

        let result = query.execute(&self.pool).await.map_err(|e| {
            error!("Query execution failed: {}", e);
            OrmError::from(e)
        })?;

        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    async fn fetch_all(&self, statement: &Statement) -> OrmResult<Vec<Row>> {
        let compiled = self.compile(statement).await?;
        let rows = Self::query(&compiled)?
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Query fetch failed: {}", e);
                OrmError::from(e)
            })?;

        rows.iter().map(row_to_json).collect()
    }

    async fn fetch_optional(&self, statement: &Statement) -> OrmResult<Option<Row>> {
        let compiled = self.compile(statement).await?;
        let row = Self::query(&compiled)?
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Query fetch failed: {}", e);
                OrmError::from(e)
            })?;

        row.as_ref().map(row_to_json).transpose()
    }

    async fn describe_table(&self, table: &str) -> OrmResult<Option<TableSchema>> {
        self.reflect(table).await
    }

    async fn execute_raw(&self, sql: &str) -> OrmResult<Vec<Row>> {
        debug!("{}", sql);
        let rows = sqlx::query(sql).fetch_all(&self.pool).await.map_err(|e| {
            error!("Raw query failed: {}", e);
            OrmError::from(e)
        })?;

        rows.iter().map(row_to_json).collect()
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    async fn close(&self) -> OrmResult<()> {
        self.pool.close().await;
        Ok(())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }
}

fn row_to_json(row: &PgRow) -> OrmResult<Row> {
    let mut map = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = postgres_value_to_database_value(row, index)?;
        map.insert(column.name().to_string(), value.to_json());
    }
    Ok(map)
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: DatabaseValue,
) -> OrmResult<sqlx::query::Query<'q, Postgres, PgArguments>> {
    match value {
        DatabaseValue::Null => Ok(query.bind(Option::<String>::None)),
        DatabaseValue::Bool(b) => Ok(query.bind(b)),
        DatabaseValue::Int32(i) => Ok(query.bind(i)),
        DatabaseValue::Int64(i) => Ok(query.bind(i)),
        DatabaseValue::Float64(f) => Ok(query.bind(f)),
        DatabaseValue::Decimal(d) => Ok(query.bind(d)),
        DatabaseValue::String(s) => Ok(query.bind(s)),
        DatabaseValue::Bytes(b) => Ok(query.bind(b)),
        DatabaseValue::Uuid(u) => Ok(query.bind(u)),
        DatabaseValue::DateTime(dt) => Ok(query.bind(dt)),
        DatabaseValue::Date(d) => Ok(query.bind(d)),
        DatabaseValue::Time(t) => Ok(query.bind(t)),
        DatabaseValue::Json(j) => Ok(query.bind(j)),
        DatabaseValue::Array(_) => Err(OrmError::Query(
            "Array values can only be used with the 'in' operator".to_string(),
        )),
    }
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> OrmResult<DatabaseValue> {
    use sqlx::{TypeInfo, ValueRef};

    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let decode_err = |e: sqlx::Error| {
        OrmError::Serialization(format!("Failed to decode {} column {}: {}", type_name, index, e))
    };

    let value = match type_name.as_str() {
        "BOOL" => DatabaseValue::Bool(row.try_get(index).map_err(decode_err)?),
        "INT2" => DatabaseValue::Int32(row.try_get::<i16, _>(index).map_err(decode_err)? as i32),
        "INT4" => DatabaseValue::Int32(row.try_get(index).map_err(decode_err)?),
        "INT8" => DatabaseValue::Int64(row.try_get(index).map_err(decode_err)?),
        "FLOAT4" => DatabaseValue::Float64(row.try_get::<f32, _>(index).map_err(decode_err)? as f64),
        "FLOAT8" => DatabaseValue::Float64(row.try_get(index).map_err(decode_err)?),
        "NUMERIC" => DatabaseValue::Decimal(row.try_get(index).map_err(decode_err)?),
        "BYTEA" => DatabaseValue::Bytes(row.try_get(index).map_err(decode_err)?),
        "UUID" => DatabaseValue::Uuid(row.try_get(index).map_err(decode_err)?),
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get(index).map_err(decode_err)?),
        "TIMESTAMP" => {
            let naive: chrono::NaiveDateTime = row.try_get(index).map_err(decode_err)?;
            DatabaseValue::DateTime(naive.and_utc())
        }
        "DATE" => DatabaseValue::Date(row.try_get(index).map_err(decode_err)?),
        "TIME" => DatabaseValue::Time(row.try_get(index).map_err(decode_err)?),
        "JSON" | "JSONB" => DatabaseValue::Json(row.try_get::<JsonValue, _>(index).map_err(decode_err)?),
        _ => DatabaseValue::String(row.try_get(index).map_err(decode_err)?),
    };
    Ok(value)
}
