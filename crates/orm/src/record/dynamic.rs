//! Name-pattern finders
//!
//! `find_by_<f1>[_and_<f2>...]`, `findall_by_<...>`, `count_by_<...>` and
//! `findall_in_<field>` are parsed once into a [`DynamicCall`] and executed
//! as the equivalent `filter` + `find`/`findall`/`count` chain. The typed
//! helpers (`find_by`, `findall_by`, ...) skip the parsing step.

use super::query_methods::DEFAULT_PAGE_SIZE;
use super::Record;
use crate::error::{OrmError, OrmResult};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicCall {
    FindBy(Vec<String>),
    FindAllBy(Vec<String>),
    CountBy(Vec<String>),
    FindAllIn(String),
}

fn split_fields(rest: &str) -> Option<Vec<String>> {
    let fields: Vec<String> = rest.split("_and_").map(str::to_string).collect();
    if fields.iter().any(|f| f.is_empty()) {
        None
    } else {
        Some(fields)
    }
}

impl DynamicCall {
    /// `None` when the name matches no finder pattern
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(field) = name.strip_prefix("findall_in_") {
            return (!field.is_empty()).then(|| DynamicCall::FindAllIn(field.to_string()));
        }
        if let Some(rest) = name.strip_prefix("findall_by_") {
            return split_fields(rest).map(DynamicCall::FindAllBy);
        }
        if let Some(rest) = name.strip_prefix("find_by_") {
            return split_fields(rest).map(DynamicCall::FindBy);
        }
        if let Some(rest) = name.strip_prefix("count_by_") {
            return split_fields(rest).map(DynamicCall::CountBy);
        }
        None
    }

    /// Number of positional values the call consumes
    pub fn arity(&self) -> usize {
        match self {
            DynamicCall::FindBy(fields)
            | DynamicCall::FindAllBy(fields)
            | DynamicCall::CountBy(fields) => fields.len(),
            DynamicCall::FindAllIn(_) => 1,
        }
    }
}

/// Arguments of a dynamic call: positional values in field order, plus the
/// page used by the `findall` forms
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicArgs {
    pub values: Vec<Value>,
    pub limit: i64,
    pub offset: u64,
}

impl DynamicArgs {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }

    pub fn page(mut self, limit: i64, offset: u64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

impl From<Vec<Value>> for DynamicArgs {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicResult {
    /// The record now holds the found row or result set
    Loaded,
    Count(i64),
}

/// What a name resolves to on a record
#[derive(Debug)]
pub enum Attribute {
    Value(Value),
    Association(Record),
    Dynamic(DynamicCall),
}

impl Record {
    fn stage_equalities(&mut self, fields: &[String], values: &[Value]) -> OrmResult<()> {
        if fields.len() != values.len() {
            return Err(OrmError::Query(format!(
                "expected {} value(s) for {}, got {}",
                fields.len(),
                fields.join(", "),
                values.len()
            )));
        }
        // All or nothing: a rejected field must not leave earlier ones staged.
        let staged = self.filters.len();
        for (field, value) in fields.iter().zip(values) {
            if let Err(e) = self.where_eq(field, value.clone()).map(|_| ()) {
                self.filters.truncate(staged);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Execute a parsed finder
    pub async fn dispatch(&mut self, call: &DynamicCall, args: DynamicArgs) -> OrmResult<DynamicResult> {
        if args.values.len() != call.arity() {
            return Err(OrmError::Query(format!(
                "{:?} takes {} argument(s), got {}",
                call,
                call.arity(),
                args.values.len()
            )));
        }

        match call {
            DynamicCall::FindBy(fields) => {
                self.stage_equalities(fields, &args.values)?;
                self.find().await?;
                Ok(DynamicResult::Loaded)
            }
            DynamicCall::FindAllBy(fields) => {
                self.stage_equalities(fields, &args.values)?;
                self.findall(args.limit, args.offset).await?;
                Ok(DynamicResult::Loaded)
            }
            DynamicCall::CountBy(fields) => {
                self.stage_equalities(fields, &args.values)?;
                let count = self.count().await?;
                Ok(DynamicResult::Count(count))
            }
            DynamicCall::FindAllIn(field) => {
                let values = match &args.values[0] {
                    Value::Array(values) => values.clone(),
                    other => {
                        return Err(OrmError::Query(format!(
                            "findall_in_{} expects a list, got {}",
                            field, other
                        )))
                    }
                };
                self.where_in(field, values)?;
                self.findall(args.limit, args.offset).await?;
                Ok(DynamicResult::Loaded)
            }
        }
    }

    /// Call a finder by name, e.g. `"find_by_email_and_status"`
    pub async fn call(&mut self, name: &str, args: impl Into<DynamicArgs>) -> OrmResult<DynamicResult> {
        let call = DynamicCall::parse(name)
            .ok_or_else(|| OrmError::attribute_not_found(self.model_name(), name))?;
        self.dispatch(&call, args.into()).await
    }

    /// Pending field, loaded field, association or finder pattern, in that
    /// order
    pub async fn resolve(&self, name: &str) -> OrmResult<Attribute> {
        if let Ok(value) = self.get(name) {
            return Ok(Attribute::Value(value));
        }
        if self.definition.association(name).is_some() {
            return Ok(Attribute::Association(self.association(name).await?));
        }
        DynamicCall::parse(name)
            .map(Attribute::Dynamic)
            .ok_or_else(|| OrmError::attribute_not_found(self.model_name(), name))
    }

    pub async fn find_by(&mut self, field: &str, value: impl Into<Value>) -> OrmResult<&mut Self> {
        self.where_eq(field, value)?;
        self.find().await
    }

    pub async fn findall_by(&mut self, field: &str, value: impl Into<Value>, limit: i64, offset: u64) -> OrmResult<&mut Self> {
        self.where_eq(field, value)?;
        self.findall(limit, offset).await
    }

    pub async fn count_by(&mut self, field: &str, value: impl Into<Value>) -> OrmResult<i64> {
        self.where_eq(field, value)?;
        self.count().await
    }

    pub async fn findall_in(&mut self, field: &str, values: Vec<Value>) -> OrmResult<&mut Self> {
        self.where_in(field, values)?;
        self.findall(DEFAULT_PAGE_SIZE, 0).await
    }
}
