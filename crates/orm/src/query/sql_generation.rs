//! SQL text generation per dialect

use super::types::*;
use crate::backends::SqlDialect;
use crate::error::OrmResult;
use crate::schema::TableSchema;
use serde_json::Value;

/// Column types a string parameter binds to without a cast
const TEXT_TYPES: &[&str] = &["text", "varchar", "bpchar", "name", "character varying", "character"];

/// Placeholder rendering state shared by the statement builders
struct Params<'a> {
    dialect: &'a SqlDialect,
    schema: Option<&'a TableSchema>,
    values: Vec<Value>,
}

impl<'a> Params<'a> {
    /// Bind `value` and return its placeholder. On PostgreSQL, strings and
    /// NULLs aimed at a non-text column are cast to the column's type, since
    /// the driver sends them as TEXT.
    fn push(&mut self, column: Option<&str>, value: &Value) -> String {
        let placeholder = self.dialect.parameter_placeholder(self.values.len());
        self.values.push(value.clone());

        match self.cast_type(column, value) {
            Some(data_type) => format!("{}::{}", placeholder, self.dialect.quote_identifier(data_type)),
            None => placeholder,
        }
    }

    fn cast_type(&self, column: Option<&str>, value: &Value) -> Option<&'a str> {
        if *self.dialect != SqlDialect::PostgreSQL || !(value.is_string() || value.is_null()) {
            return None;
        }
        let data_type = self.schema?.column(column?)?.data_type.as_str();
        if TEXT_TYPES.contains(&data_type.to_ascii_lowercase().as_str()) {
            None
        } else {
            Some(data_type)
        }
    }
}

impl Statement {
    /// Render the statement with positional placeholders for `dialect`
    pub fn to_sql(&self, dialect: &SqlDialect) -> OrmResult<CompiledQuery> {
        self.to_sql_for(dialect, None)
    }

    /// Like [`Statement::to_sql`], casting parameters to the column types
    /// in `schema` where the dialect needs it
    pub fn to_sql_for(&self, dialect: &SqlDialect, schema: Option<&TableSchema>) -> OrmResult<CompiledQuery> {
        let mut sql = String::new();
        let mut params = Params {
            dialect,
            schema,
            values: Vec::new(),
        };

        match self {
            Statement::Select(select) => build_select_sql(select, &mut sql, &mut params)?,
            Statement::Insert(insert) => build_insert_sql(insert, &mut sql, &mut params),
            Statement::Update(update) => build_update_sql(update, &mut sql, &mut params)?,
            Statement::Delete(delete) => {
                sql.push_str("DELETE FROM ");
                sql.push_str(&dialect.quote_identifier(&delete.table));
                build_where_clause(&delete.filters, &mut sql, &mut params)?;
            }
        }

        Ok(CompiledQuery {
            sql,
            params: params.values,
        })
    }
}

fn render_expr(expr: &SqlExpr, dialect: &SqlDialect) -> String {
    match expr {
        SqlExpr::Column(column) => dialect.quote_identifier(column),
        SqlExpr::Function { name, column } if column == "*" => format!("{}(*)", name),
        SqlExpr::Function { name, column } => {
            format!("{}({})", name, dialect.quote_identifier(column))
        }
    }
}

fn build_select_sql(select: &SelectStatement, sql: &mut String, params: &mut Params<'_>) -> OrmResult<()> {
    let dialect = params.dialect;
    sql.push_str("SELECT ");
    if select.columns.is_empty() {
        sql.push('*');
    } else {
        let columns: Vec<String> = select
            .columns
            .iter()
            .map(|projection| match &projection.alias {
                Some(alias) => format!(
                    "{} AS {}",
                    render_expr(&projection.expr, dialect),
                    dialect.quote_identifier(alias)
                ),
                None => render_expr(&projection.expr, dialect),
            })
            .collect();
        sql.push_str(&columns.join(", "));
    }

    sql.push_str(" FROM ");
    sql.push_str(&dialect.quote_identifier(&select.table));

    build_where_clause(&select.filters, sql, params)?;

    if let Some(order) = &select.order {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            dialect.quote_identifier(&order.column),
            order.direction
        ));
    }

    match select.limit {
        Some(limit) => sql.push_str(&format!(" LIMIT {}", limit)),
        None if select.offset > 0 => {
            if let Some(unbounded) = dialect.unbounded_limit() {
                sql.push_str(&format!(" LIMIT {}", unbounded));
            }
        }
        None => {}
    }

    if select.offset > 0 {
        sql.push_str(&format!(" OFFSET {}", select.offset));
    }

    Ok(())
}

fn build_insert_sql(insert: &InsertStatement, sql: &mut String, params: &mut Params<'_>) {
    let dialect = params.dialect;
    sql.push_str("INSERT INTO ");
    sql.push_str(&dialect.quote_identifier(&insert.table));

    if insert.values.is_empty() {
        sql.push_str(dialect.empty_insert());
    } else {
        let columns: Vec<String> = insert
            .values
            .keys()
            .map(|column| dialect.quote_identifier(column))
            .collect();
        let placeholders: Vec<String> = insert
            .values
            .iter()
            .map(|(column, value)| params.push(Some(column.as_str()), value))
            .collect();
        sql.push_str(&format!(
            " ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ));
    }

    if let Some(returning) = &insert.returning {
        if dialect.supports_returning() {
            sql.push_str(" RETURNING ");
            sql.push_str(&dialect.quote_identifier(returning));
        }
    }
}

fn build_update_sql(update: &UpdateStatement, sql: &mut String, params: &mut Params<'_>) -> OrmResult<()> {
    let dialect = params.dialect;
    sql.push_str("UPDATE ");
    sql.push_str(&dialect.quote_identifier(&update.table));
    sql.push_str(" SET ");

    let assignments: Vec<String> = update
        .values
        .iter()
        .map(|(column, value)| {
            format!(
                "{} = {}",
                dialect.quote_identifier(column),
                params.push(Some(column.as_str()), value)
            )
        })
        .collect();
    sql.push_str(&assignments.join(", "));

    build_where_clause(&update.filters, sql, params)
}

fn build_where_clause(filters: &[Predicate], sql: &mut String, params: &mut Params<'_>) -> OrmResult<()> {
    if filters.is_empty() {
        return Ok(());
    }

    let mut conditions = Vec::with_capacity(filters.len());
    for predicate in filters {
        let lhs = render_expr(&predicate.expr, params.dialect);
        // Function results have their own type; only bare columns get casts.
        let column = match &predicate.expr {
            SqlExpr::Column(column) => Some(column.as_str()),
            SqlExpr::Function { .. } => None,
        };
        let condition = match (predicate.operator, &predicate.value) {
            (QueryOperator::Equal, Value::Null) => format!("{} IS NULL", lhs),
            (QueryOperator::NotEqual, Value::Null) => format!("{} IS NOT NULL", lhs),
            (QueryOperator::NotEqual, value) => {
                format!("{} <> {}", lhs, params.push(column, value))
            }
            (QueryOperator::In, value) => {
                let values = require_array(value)?;
                if values.is_empty() {
                    "1 = 0".to_string()
                } else {
                    let placeholders: Vec<String> = values
                        .iter()
                        .map(|v| params.push(column, v))
                        .collect();
                    format!("{} IN ({})", lhs, placeholders.join(", "))
                }
            }
            (operator, value) => {
                format!("{} {} {}", lhs, operator, params.push(column, value))
            }
        };
        conditions.push(condition);
    }

    sql.push_str(" WHERE ");
    sql.push_str(&conditions.join(" AND "));
    Ok(())
}
