//! Core Database Backend Traits
//!
//! The ORM talks to a database only through [`DatabaseConnection`]: run a
//! statement, get rows addressable by column name, an affected-row count and
//! the generated key.

use crate::config::DatabaseSection;
use crate::error::{OrmError, OrmResult};
use crate::query::Statement;
use crate::schema::TableSchema;
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

use super::DatabaseBackendType;

/// A result row, column -> value in select order
pub type Row = Map<String, JsonValue>;

/// Outcome of a write statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<JsonValue>,
}

/// Shared handle to one routing section's database
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    /// Execute an INSERT, UPDATE or DELETE
    async fn execute(&self, statement: &Statement) -> OrmResult<ExecResult>;

    /// Execute a SELECT and return every row
    async fn fetch_all(&self, statement: &Statement) -> OrmResult<Vec<Row>>;

    /// Execute a SELECT and return the first row
    async fn fetch_optional(&self, statement: &Statement) -> OrmResult<Option<Row>> {
        Ok(self.fetch_all(statement).await?.into_iter().next())
    }

    /// Reflect a table's columns, `None` when the table does not exist
    async fn describe_table(&self, table: &str) -> OrmResult<Option<TableSchema>>;

    /// Run literal SQL and return whatever rows it produces
    async fn execute_raw(&self, sql: &str) -> OrmResult<Vec<Row>>;

    fn is_closed(&self) -> bool;

    async fn close(&self) -> OrmResult<()>;

    fn dialect(&self) -> SqlDialect;
}

/// Opens connections for the URL schemes it handles
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    async fn connect(&self, section: &DatabaseSection) -> OrmResult<Arc<dyn DatabaseConnection>>;

    fn sql_dialect(&self) -> SqlDialect;

    fn backend_type(&self) -> DatabaseBackendType;

    fn validate_database_url(&self, url: &str) -> OrmResult<()>;
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Decimal(rust_decimal::Decimal),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(JsonValue),
    Array(Vec<DatabaseValue>),
}

impl DatabaseValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::from(*i),
            DatabaseValue::Int64(i) => JsonValue::from(*i),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::Decimal(d) => decimal_to_json(d),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(b.iter().map(|&x| JsonValue::from(x)).collect()),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Time(t) => JsonValue::String(t.to_string()),
            DatabaseValue::Json(j) => j.clone(),
            DatabaseValue::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
        }
    }

    /// Strings stay strings. Columns whose type a string cannot be bound to
    /// directly (uuid, timestamps, numeric, ...) get an explicit cast in the
    /// generated SQL instead.
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => DatabaseValue::Null,
            JsonValue::Bool(b) => DatabaseValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                        DatabaseValue::Int32(i as i32)
                    } else {
                        DatabaseValue::Int64(i)
                    }
                } else if let Some(f) = n.as_f64() {
                    DatabaseValue::Float64(f)
                } else {
                    DatabaseValue::Null
                }
            }
            JsonValue::String(s) => DatabaseValue::String(s.clone()),
            JsonValue::Array(arr) => DatabaseValue::Array(arr.iter().map(DatabaseValue::from_json).collect()),
            JsonValue::Object(_) => DatabaseValue::Json(json.clone()),
        }
    }
}

/// Whole decimals become integers; the rest lose precision to f64, or stay
/// text when even that overflows
fn decimal_to_json(decimal: &rust_decimal::Decimal) -> JsonValue {
    use rust_decimal::prelude::ToPrimitive;

    if decimal.fract().is_zero() {
        if let Some(i) = decimal.to_i64() {
            return JsonValue::from(i);
        }
    }
    decimal
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(decimal.to_string()))
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Placeholder for the zero-based parameter `index`
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL => '"',
            SqlDialect::MySQL => '`',
            SqlDialect::SQLite => '"',
        }
    }

    pub fn quote_identifier(&self, identifier: &str) -> String {
        let quote = self.identifier_quote();
        let escaped = identifier.replace(quote, &format!("{}{}", quote, quote));
        format!("{}{}{}", quote, escaped, quote)
    }

    /// LIMIT value meaning "no limit" where OFFSET cannot stand alone
    pub fn unbounded_limit(&self) -> Option<&'static str> {
        match self {
            SqlDialect::PostgreSQL => None,
            SqlDialect::MySQL => Some("18446744073709551615"),
            SqlDialect::SQLite => Some("-1"),
        }
    }

    /// Suffix of an INSERT with no column values
    pub fn empty_insert(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::SQLite => " DEFAULT VALUES",
            SqlDialect::MySQL => " () VALUES ()",
        }
    }

    pub fn supports_returning(&self) -> bool {
        matches!(self, SqlDialect::PostgreSQL)
    }
}

/// Database backend registry, keyed by backend type
pub struct DatabaseBackendRegistry {
    backends: HashMap<DatabaseBackendType, Arc<dyn DatabaseBackend>>,
}

impl DatabaseBackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    pub fn register(&mut self, backend: Arc<dyn DatabaseBackend>) {
        self.backends.insert(backend.backend_type(), backend);
    }

    pub fn get(&self, backend_type: &DatabaseBackendType) -> Option<Arc<dyn DatabaseBackend>> {
        self.backends.get(backend_type).cloned()
    }

    /// Open a connection with whichever backend handles the section's URL
    pub async fn connect(&self, section: &DatabaseSection) -> OrmResult<Arc<dyn DatabaseConnection>> {
        let backend_type = Self::detect_backend_from_url(&section.url)?;
        let backend = self.get(&backend_type).ok_or_else(|| {
            OrmError::Configuration(format!("No backend registered for {}", backend_type))
        })?;

        backend.validate_database_url(&section.url)?;
        backend.connect(section).await
    }

    pub fn detect_backend_from_url(url: &str) -> OrmResult<DatabaseBackendType> {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            Ok(DatabaseBackendType::PostgreSQL)
        } else if url.starts_with("memory://") {
            Ok(DatabaseBackendType::Memory)
        } else {
            Err(OrmError::Configuration(format!(
                "Unable to detect database backend from URL: {}",
                url
            )))
        }
    }

    pub fn registered_backends(&self) -> Vec<DatabaseBackendType> {
        self.backends.keys().cloned().collect()
    }
}

impl Default for DatabaseBackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
