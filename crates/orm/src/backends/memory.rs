//! In-process backend
//!
//! Databases are addressed as `memory://<name>` and live as long as the
//! [`MemoryBackend`] that owns them. Statements are evaluated directly from
//! their [`Statement`] form; every statement is counted so callers can check
//! how many round trips an operation made.

use super::core::*;
use super::DatabaseBackendType;
use crate::config::DatabaseSection;
use crate::error::{OrmError, OrmResult};
use crate::query::types::require_array;
use crate::query::{
    DeleteStatement, InsertStatement, OrderDirection, Predicate, Projection, QueryOperator,
    SelectStatement, SqlExpr, Statement, UpdateStatement,
};
use crate::schema::TableSchema;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
    next_id: i64,
}

/// One named database
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    tables: RwLock<BTreeMap<String, MemoryTable>>,
    statements: AtomicU64,
}

impl MemoryDatabase {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(BTreeMap::new()),
            statements: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create (or replace) a table
    pub fn create_table(&self, schema: TableSchema) {
        self.tables.write().insert(
            schema.name.clone(),
            MemoryTable {
                schema,
                rows: Vec::new(),
                next_id: 1,
            },
        );
    }

    pub fn drop_table(&self, table: &str) -> bool {
        self.tables.write().remove(table).is_some()
    }

    /// Snapshot of a table's rows in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Statements executed against this database so far
    pub fn statement_count(&self) -> u64 {
        self.statements.load(Ordering::SeqCst)
    }

    pub fn reset_statement_count(&self) {
        self.statements.store(0, Ordering::SeqCst);
    }

    fn record_statement(&self) {
        self.statements.fetch_add(1, Ordering::SeqCst);
    }

    fn describe(&self, table: &str) -> Option<TableSchema> {
        self.tables.read().get(table).map(|t| t.schema.clone())
    }

    fn select(&self, select: &SelectStatement) -> OrmResult<Vec<Row>> {
        let tables = self.tables.read();
        let table = lookup(&tables, &select.table)?;
        check_columns(&table.schema, select.filters.iter().map(|p| &p.expr))?;
        check_columns(&table.schema, select.columns.iter().map(|p| &p.expr))?;

        let mut rows = Vec::new();
        for row in &table.rows {
            if matches_all(row, &select.filters)? {
                rows.push(row);
            }
        }

        if select.columns.iter().any(|p| p.expr.is_aggregate()) {
            let aggregated = aggregate_row(&select.columns, &rows)?;
            return Ok(paginate(vec![aggregated], select.limit, select.offset));
        }

        if let Some(order) = &select.order {
            rows.sort_by(|a, b| {
                let ordering = sort_order(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                );
                match order.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            });
        }

        let mut projected = Vec::with_capacity(rows.len());
        for row in paginate(rows, select.limit, select.offset) {
            projected.push(project(row, &select.columns)?);
        }
        Ok(projected)
    }

    fn insert(&self, insert: &InsertStatement) -> OrmResult<ExecResult> {
        let mut tables = self.tables.write();
        let table = lookup_mut(&mut tables, &insert.table)?;
        for column in insert.values.keys() {
            require_column(&table.schema, column)?;
        }

        let primary_key = table.schema.primary_key().map(str::to_string);
        let mut row = Row::new();
        for column in &table.schema.columns {
            let mut value = insert.values.get(&column.name).cloned().unwrap_or(Value::Null);
            if column.primary_key {
                if value.is_null() && column.is_integer() {
                    value = Value::from(table.next_id);
                }
                if let Some(id) = value.as_i64() {
                    table.next_id = table.next_id.max(id + 1);
                }
            }
            row.insert(column.name.clone(), value);
        }

        let last_insert_id = primary_key.and_then(|pk| row.get(&pk).cloned());
        if let (Some(pk), Some(id)) = (table.schema.primary_key(), &last_insert_id) {
            if table.rows.iter().any(|existing| existing.get(pk) == Some(id)) {
                return Err(OrmError::Database(format!(
                    "UNIQUE constraint failed: {}.{}",
                    insert.table, pk
                )));
            }
        }

        table.rows.push(row);
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id,
        })
    }

    fn update(&self, update: &UpdateStatement) -> OrmResult<ExecResult> {
        let mut tables = self.tables.write();
        let table = lookup_mut(&mut tables, &update.table)?;
        for column in update.values.keys() {
            require_column(&table.schema, column)?;
        }
        check_columns(&table.schema, update.filters.iter().map(|p| &p.expr))?;

        let mut rows_affected = 0;
        for row in table.rows.iter_mut() {
            if matches_all(row, &update.filters)? {
                for (column, value) in &update.values {
                    row.insert(column.clone(), value.clone());
                }
                rows_affected += 1;
            }
        }

        Ok(ExecResult {
            rows_affected,
            last_insert_id: None,
        })
    }

    fn delete(&self, delete: &DeleteStatement) -> OrmResult<ExecResult> {
        let mut tables = self.tables.write();
        let table = lookup_mut(&mut tables, &delete.table)?;
        check_columns(&table.schema, delete.filters.iter().map(|p| &p.expr))?;

        let mut kept = Vec::with_capacity(table.rows.len());
        let mut rows_affected = 0;
        for row in table.rows.drain(..) {
            if matches_all(&row, &delete.filters)? {
                rows_affected += 1;
            } else {
                kept.push(row);
            }
        }
        table.rows = kept;

        Ok(ExecResult {
            rows_affected,
            last_insert_id: None,
        })
    }
}

fn lookup<'a>(tables: &'a BTreeMap<String, MemoryTable>, name: &str) -> OrmResult<&'a MemoryTable> {
    tables
        .get(name)
        .ok_or_else(|| OrmError::Database(format!("no such table: {}", name)))
}

fn lookup_mut<'a>(
    tables: &'a mut BTreeMap<String, MemoryTable>,
    name: &str,
) -> OrmResult<&'a mut MemoryTable> {
    tables
        .get_mut(name)
        .ok_or_else(|| OrmError::Database(format!("no such table: {}", name)))
}

fn require_column(schema: &TableSchema, column: &str) -> OrmResult<()> {
    if column == "*" || schema.has_column(column) {
        Ok(())
    } else {
        Err(OrmError::Database(format!(
            "table {} has no column named {}",
            schema.name, column
        )))
    }
}

fn check_columns<'a>(
    schema: &TableSchema,
    exprs: impl Iterator<Item = &'a SqlExpr>,
) -> OrmResult<()> {
    for expr in exprs {
        require_column(schema, expr.column_name())?;
    }
    Ok(())
}

fn paginate<T>(rows: Vec<T>, limit: Option<u64>, offset: u64) -> Vec<T> {
    let rows = rows.into_iter().skip(offset as usize);
    match limit {
        Some(limit) => rows.take(limit as usize).collect(),
        None => rows.collect(),
    }
}

/// SQL comparison: anything against NULL is unknown
fn compare_values(a: &Value, b: &Value) -> Option<CmpOrdering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// NULLs sort first
fn sort_order(a: &Value, b: &Value) -> CmpOrdering {
    match (a.is_null(), b.is_null()) {
        (true, true) => CmpOrdering::Equal,
        (true, false) => CmpOrdering::Less,
        (false, true) => CmpOrdering::Greater,
        (false, false) => compare_values(a, b).unwrap_or(CmpOrdering::Equal),
    }
}

fn scalar(expr: &SqlExpr, row: &Row) -> OrmResult<Value> {
    match expr {
        SqlExpr::Column(column) => Ok(row.get(column).cloned().unwrap_or(Value::Null)),
        SqlExpr::Function { name, column } => {
            let value = row.get(column).cloned().unwrap_or(Value::Null);
            if value.is_null() {
                return Ok(Value::Null);
            }
            match name.as_str() {
                "lower" => Ok(value.as_str().map(|s| Value::from(s.to_lowercase())).unwrap_or(value)),
                "upper" => Ok(value.as_str().map(|s| Value::from(s.to_uppercase())).unwrap_or(value)),
                "length" => Ok(match &value {
                    Value::String(s) => Value::from(s.chars().count() as i64),
                    other => Value::from(other.to_string().chars().count() as i64),
                }),
                "abs" => Ok(match (value.as_i64(), value.as_f64()) {
                    (Some(i), _) => Value::from(i.abs()),
                    (None, Some(f)) => Value::from(f.abs()),
                    _ => Value::Null,
                }),
                other if expr.is_aggregate() => Err(OrmError::Query(format!(
                    "aggregate function {}() is not allowed here",
                    other
                ))),
                other => Err(OrmError::Query(format!("unsupported function {}()", other))),
            }
        }
    }
}

fn matches(row: &Row, predicate: &Predicate) -> OrmResult<bool> {
    let lhs = scalar(&predicate.expr, row)?;
    let result = match (predicate.operator, &predicate.value) {
        (QueryOperator::Equal, Value::Null) => lhs.is_null(),
        (QueryOperator::NotEqual, Value::Null) => !lhs.is_null(),
        (QueryOperator::In, values) => require_array(values)?
            .iter()
            .any(|v| compare_values(&lhs, v) == Some(CmpOrdering::Equal)),
        (operator, rhs) => match compare_values(&lhs, rhs) {
            None => false,
            Some(ordering) => match operator {
                QueryOperator::Equal => ordering == CmpOrdering::Equal,
                QueryOperator::NotEqual => ordering != CmpOrdering::Equal,
                QueryOperator::GreaterThan => ordering == CmpOrdering::Greater,
                QueryOperator::GreaterThanOrEqual => ordering != CmpOrdering::Less,
                QueryOperator::LessThan => ordering == CmpOrdering::Less,
                QueryOperator::LessThanOrEqual => ordering != CmpOrdering::Greater,
                QueryOperator::In => false,
            },
        },
    };
    Ok(result)
}

fn matches_all(row: &Row, filters: &[Predicate]) -> OrmResult<bool> {
    for predicate in filters {
        if !matches(row, predicate)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn project(row: &Row, columns: &[Projection]) -> OrmResult<Row> {
    if columns.is_empty() {
        return Ok(row.clone());
    }
    let mut projected = Row::new();
    for projection in columns {
        projected.insert(projection.output_name(), scalar(&projection.expr, row)?);
    }
    Ok(projected)
}

static PRESENT: Value = Value::Bool(true);

fn aggregate(name: &str, column: &str, rows: &[&Row]) -> OrmResult<Value> {
    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|row| {
            if column == "*" {
                Some(&PRESENT)
            } else {
                row.get(column).filter(|v| !v.is_null())
            }
        })
        .collect();

    match name {
        "count" => Ok(Value::from(values.len() as i64)),
        "min" | "max" => {
            let picked = values.into_iter().fold(None::<&Value>, |best, v| match best {
                None => Some(v),
                Some(current) => {
                    let ordering = sort_order(v, current);
                    let better = if name == "min" {
                        ordering == CmpOrdering::Less
                    } else {
                        ordering == CmpOrdering::Greater
                    };
                    Some(if better { v } else { current })
                }
            });
            Ok(picked.cloned().unwrap_or(Value::Null))
        }
        "sum" | "avg" => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            if name == "sum" && values.iter().all(|v| v.is_i64()) {
                return Ok(Value::from(values.iter().filter_map(|v| v.as_i64()).sum::<i64>()));
            }
            let total: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
            if name == "sum" {
                Ok(Value::from(total))
            } else {
                Ok(Value::from(total / values.len() as f64))
            }
        }
        other => Err(OrmError::Query(format!("unsupported aggregate {}()", other))),
    }
}

fn aggregate_row(columns: &[Projection], rows: &[&Row]) -> OrmResult<Row> {
    let mut result = Row::new();
    for projection in columns {
        let value = match &projection.expr {
            SqlExpr::Function { name, column } if projection.expr.is_aggregate() => {
                aggregate(name, column, rows)?
            }
            expr => match rows.first() {
                Some(row) => scalar(expr, row)?,
                None => Value::Null,
            },
        };
        result.insert(projection.output_name(), value);
    }
    Ok(result)
}

/// Connection handle onto a [`MemoryDatabase`]
pub struct MemoryConnection {
    database: Arc<MemoryDatabase>,
    closed: AtomicBool,
}

impl MemoryConnection {
    pub fn new(database: Arc<MemoryDatabase>) -> Self {
        Self {
            database,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> OrmResult<()> {
        if self.is_closed() {
            return Err(OrmError::Connection(format!(
                "connection to memory://{} is closed",
                self.database.name
            )));
        }
        self.database.record_statement();
        Ok(())
    }
}

#[async_trait]
impl DatabaseConnection for MemoryConnection {
    async fn execute(&self, statement: &Statement) -> OrmResult<ExecResult> {
        self.ensure_open()?;
        debug!("memory://{} {:?}", self.database.name, statement);

        match statement {
            Statement::Insert(insert) => self.database.insert(insert),
            Statement::Update(update) => self.database.update(update),
            Statement::Delete(delete) => self.database.delete(delete),
            Statement::Select(_) => Err(OrmError::Query(
                "SELECT statements must be fetched, not executed".to_string(),
            )),
        }
    }

    async fn fetch_all(&self, statement: &Statement) -> OrmResult<Vec<Row>> {
        self.ensure_open()?;
        debug!("memory://{} {:?}", self.database.name, statement);

        match statement {
            Statement::Select(select) => self.database.select(select),
            _ => Err(OrmError::Query(
                "only SELECT statements return rows".to_string(),
            )),
        }
    }

    async fn describe_table(&self, table: &str) -> OrmResult<Option<TableSchema>> {
        self.ensure_open()?;
        Ok(self.database.describe(table))
    }

    async fn execute_raw(&self, _sql: &str) -> OrmResult<Vec<Row>> {
        self.ensure_open()?;
        Err(OrmError::Query(
            "the memory backend does not execute raw SQL".to_string(),
        ))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> OrmResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }
}

/// Owner of the named in-process databases
#[derive(Debug, Default)]
pub struct MemoryBackend {
    databases: DashMap<String, Arc<MemoryDatabase>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The database called `name`, created empty on first use
    pub fn database(&self, name: &str) -> Arc<MemoryDatabase> {
        self.databases
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryDatabase::new(name)))
            .clone()
    }

    fn database_name(url: &str) -> OrmResult<&str> {
        url.strip_prefix("memory://")
            .map(|rest| rest.trim_end_matches('/'))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| OrmError::Configuration(format!("Invalid memory URL: {}", url)))
    }
}

#[async_trait]
impl DatabaseBackend for MemoryBackend {
    async fn connect(&self, section: &DatabaseSection) -> OrmResult<Arc<dyn DatabaseConnection>> {
        let name = Self::database_name(&section.url)?;
        debug!("Opening memory://{}", name);
        Ok(Arc::new(MemoryConnection::new(self.database(name))))
    }

    fn sql_dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::Memory
    }

    fn validate_database_url(&self, url: &str) -> OrmResult<()> {
        Self::database_name(url).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderBy, SelectStatement};
    use serde_json::json;

    fn member_table() -> TableSchema {
        TableSchema::new("member")
            .with_primary_key("id", "integer")
            .with_column("email", "text")
            .with_column("age", "integer")
    }

    async fn seeded() -> (Arc<MemoryDatabase>, MemoryConnection) {
        let backend = MemoryBackend::new();
        let db = backend.database("unit");
        db.create_table(member_table());
        let conn = MemoryConnection::new(db.clone());

        for (email, age) in [("a@x.com", 17), ("b@x.com", 30), ("c@x.com", 45)] {
            let mut values = Row::new();
            values.insert("email".into(), json!(email));
            values.insert("age".into(), json!(age));
            conn.execute(&Statement::Insert(InsertStatement {
                table: "member".into(),
                values,
                returning: Some("id".into()),
            }))
            .await
            .unwrap();
        }
        (db, conn)
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let (db, _conn) = seeded().await;
        let ids: Vec<Value> = db.rows("member").iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(db.statement_count(), 3);
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_paginates() {
        let (_db, conn) = seeded().await;
        let select = SelectStatement::new("member")
            .filter(Predicate::new(
                SqlExpr::column("age"),
                QueryOperator::GreaterThan,
                json!(18),
            ))
            .order(Some(OrderBy::desc("id")))
            .limit(Some(1))
            .offset(1);

        let rows = conn.fetch_all(&Statement::Select(select)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["email"], json!("b@x.com"));
    }

    #[tokio::test]
    async fn test_aggregate_projection() {
        let (_db, conn) = seeded().await;
        let select = SelectStatement::new("member").columns(vec![
            Projection::aliased(SqlExpr::function("count", "id"), "count"),
            Projection::aliased(SqlExpr::function("max", "age"), "oldest"),
            Projection::aliased(SqlExpr::function("sum", "age"), "total"),
        ]);

        let row = conn
            .fetch_optional(&Statement::Select(select))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["count"], json!(3));
        assert_eq!(row["oldest"], json!(45));
        assert_eq!(row["total"], json!(92));
    }

    #[tokio::test]
    async fn test_scalar_function_filter() {
        let (_db, conn) = seeded().await;
        let select = SelectStatement::new("member").filter(Predicate::new(
            SqlExpr::function("upper", "email"),
            QueryOperator::Equal,
            json!("C@X.COM"),
        ));
        let rows = conn.fetch_all(&Statement::Select(select)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(3));
    }

    #[tokio::test]
    async fn test_update_and_delete_report_counts() {
        let (db, conn) = seeded().await;
        let mut values = Row::new();
        values.insert("age".into(), json!(50));

        let updated = conn
            .execute(&Statement::Update(UpdateStatement {
                table: "member".into(),
                values,
                filters: vec![Predicate::new(
                    SqlExpr::column("id"),
                    QueryOperator::In,
                    json!([1, 2]),
                )],
            }))
            .await
            .unwrap();
        assert_eq!(updated.rows_affected, 2);

        let deleted = conn
            .execute(&Statement::Delete(DeleteStatement {
                table: "member".into(),
                filters: vec![Predicate::eq("age", json!(50))],
            }))
            .await
            .unwrap();
        assert_eq!(deleted.rows_affected, 2);
        assert_eq!(db.rows("member").len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_column_and_duplicate_key() {
        let (_db, conn) = seeded().await;

        let mut values = Row::new();
        values.insert("nickname".into(), json!("x"));
        let err = conn
            .execute(&Statement::Insert(InsertStatement {
                table: "member".into(),
                values,
                returning: None,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Database(_)));

        let mut values = Row::new();
        values.insert("id".into(), json!(1));
        let err = conn
            .execute(&Statement::Insert(InsertStatement {
                table: "member".into(),
                values,
                returning: None,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Database(ref msg) if msg.contains("UNIQUE")));
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_statements() {
        let (_db, conn) = seeded().await;
        conn.close().await.unwrap();
        assert!(conn.is_closed());
        let err = conn
            .fetch_all(&Statement::Select(SelectStatement::new("member")))
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Connection(_)));
    }
}
