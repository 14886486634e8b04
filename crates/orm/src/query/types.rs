//! Statement representation shared by the record builder and the backends

use crate::backends::Row;
use crate::error::{OrmError, OrmResult};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operators accepted by `filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    NotEqual,
    In,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::In => write!(f, "IN"),
        }
    }
}

impl FromStr for QueryOperator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" => Ok(QueryOperator::Equal),
            ">" => Ok(QueryOperator::GreaterThan),
            ">=" => Ok(QueryOperator::GreaterThanOrEqual),
            "<" => Ok(QueryOperator::LessThan),
            "<=" => Ok(QueryOperator::LessThanOrEqual),
            "!=" => Ok(QueryOperator::NotEqual),
            op if op.eq_ignore_ascii_case("in") => Ok(QueryOperator::In),
            other => Err(OrmError::Query(format!("Unknown operator '{}'", other))),
        }
    }
}

/// A column, or a single-argument function applied to one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlExpr {
    Column(String),
    Function { name: String, column: String },
}

impl SqlExpr {
    pub fn column(name: impl Into<String>) -> Self {
        SqlExpr::Column(name.into())
    }

    pub fn function(name: impl Into<String>, column: impl Into<String>) -> Self {
        SqlExpr::Function {
            name: name.into().to_lowercase(),
            column: column.into(),
        }
    }

    /// The column the expression reads
    pub fn column_name(&self) -> &str {
        match self {
            SqlExpr::Column(column) => column,
            SqlExpr::Function { column, .. } => column,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        match self {
            SqlExpr::Column(_) => false,
            SqlExpr::Function { name, .. } => {
                matches!(name.as_str(), "count" | "sum" | "min" | "max" | "avg")
            }
        }
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlExpr::Column(column) => write!(f, "{}", column),
            SqlExpr::Function { name, column } => write!(f, "{}({})", name, column),
        }
    }
}

/// One entry of the filter stack
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub expr: SqlExpr,
    pub operator: QueryOperator,
    pub value: Value,
}

impl Predicate {
    pub fn new(expr: SqlExpr, operator: QueryOperator, value: Value) -> Self {
        Self {
            expr,
            operator,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::new(SqlExpr::column(column), QueryOperator::Equal, value)
    }
}

/// One selected expression with an optional alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

impl Projection {
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            expr: SqlExpr::column(name),
            alias: None,
        }
    }

    pub fn aliased(expr: SqlExpr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    /// Key under which the value appears in a result row
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.expr.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub table: String,
    /// Empty selects every column
    pub columns: Vec<Projection>,
    pub filters: Vec<Predicate>,
    pub order: Option<OrderBy>,
    /// `None` is unbounded
    pub limit: Option<u64>,
    pub offset: u64,
}

impl SelectStatement {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: 0,
        }
    }

    pub fn columns(mut self, columns: Vec<Projection>) -> Self {
        self.columns = columns;
        self
    }

    pub fn filters(mut self, filters: Vec<Predicate>) -> Self {
        self.filters = filters;
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    pub fn order(mut self, order: Option<OrderBy>) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub values: Row,
    /// Column to hand back as the generated key, where the dialect can
    pub returning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub values: Row,
    pub filters: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub filters: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl Statement {
    pub fn table(&self) -> &str {
        match self {
            Statement::Select(s) => &s.table,
            Statement::Insert(s) => &s.table,
            Statement::Update(s) => &s.table,
            Statement::Delete(s) => &s.table,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Statement::Select(_))
    }
}

/// Statement text plus positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

pub(crate) fn require_array(value: &Value) -> OrmResult<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| OrmError::Query(format!("'in' expects a list of values, got {}", value)))
}
