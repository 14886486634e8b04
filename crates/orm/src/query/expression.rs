//! Parsing of the string forms accepted by `filter`, `select` and `order_by`

use super::types::{OrderBy, Projection, SqlExpr};
use crate::error::{OrmError, OrmResult};

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `"email"` or `"func(column)"`; the function name ends at the first `(`
pub fn parse_expr(field: &str) -> OrmResult<SqlExpr> {
    let field = field.trim();

    let Some(open) = field.find('(') else {
        if is_identifier(field) {
            return Ok(SqlExpr::column(field));
        }
        return Err(OrmError::Query(format!("Invalid column name '{}'", field)));
    };

    if !field.ends_with(')') {
        return Err(OrmError::Query(format!(
            "Malformed function expression '{}'",
            field
        )));
    }

    let name = field[..open].trim();
    let column = field[open + 1..field.len() - 1].trim();
    if !is_identifier(name) || !(is_identifier(column) || column == "*") {
        return Err(OrmError::Query(format!(
            "Malformed function expression '{}'",
            field
        )));
    }

    Ok(SqlExpr::function(name, column))
}

/// `"column"`, `"func(column)"` or `"func(column) as alias"`
pub fn parse_projection(entry: &str) -> OrmResult<Projection> {
    let entry = entry.trim();
    let lowered = entry.to_ascii_lowercase();

    match lowered.find(" as ") {
        Some(at) => {
            let expr = parse_expr(&entry[..at])?;
            let alias = entry[at + 4..].trim();
            if !is_identifier(alias) {
                return Err(OrmError::Query(format!("Invalid alias in '{}'", entry)));
            }
            Ok(Projection::aliased(expr, alias))
        }
        None => Ok(Projection {
            expr: parse_expr(entry)?,
            alias: None,
        }),
    }
}

/// `"column"` ascending, `"-column"` descending
pub fn parse_order(spec: &str) -> OrmResult<OrderBy> {
    let spec = spec.trim();
    let (column, descending) = match spec.strip_prefix('-') {
        Some(column) => (column, true),
        None => (spec, false),
    };

    if !is_identifier(column) {
        return Err(OrmError::Query(format!("Invalid order specification '{}'", spec)));
    }

    Ok(if descending {
        OrderBy::desc(column)
    } else {
        OrderBy::asc(column)
    })
}
