//! Statement model, string-form parsing and SQL generation

pub mod expression;
pub mod sql_generation;
pub mod types;

pub use expression::{parse_expr, parse_order, parse_projection};
pub use types::{
    CompiledQuery, DeleteStatement, InsertStatement, OrderBy, OrderDirection, Predicate,
    Projection, QueryOperator, SelectStatement, SqlExpr, Statement, UpdateStatement,
};
