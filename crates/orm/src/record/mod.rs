//! Record - one use-site of a model
//!
//! A record carries three kinds of state:
//!
//! - row state: the pending changes set by [`Record::set`], the row last
//!   loaded by a `find`, and the result set of the last `findall` with its
//!   cursor
//! - builder state: filters, projection and ordering, consumed by the query
//!   methods in [`query_methods`]
//! - the error map filled by validation and observers
//!
//! Records are cheap to clone and are not meant to be shared between
//! concurrent call chains.

pub mod associations;
pub mod dynamic;
pub mod lifecycle;
pub mod query_methods;

pub use dynamic::{Attribute, DynamicArgs, DynamicCall, DynamicResult};
pub use lifecycle::SaveOutcome;
pub use query_methods::DEFAULT_PAGE_SIZE;

use crate::backends::Row;
use crate::context::Context;
use crate::error::{FieldErrors, OrmError, OrmResult};
use crate::model::ModelDefinition;
use crate::persistence::{Persistence, Target};
use crate::query::{OrderBy, Predicate, Projection};
use crate::schema::TableSchema;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Record {
    ctx: Arc<Context>,
    definition: Arc<ModelDefinition>,
    schema: Arc<TableSchema>,
    store: Arc<dyn Persistence>,
    unsaved: Row,
    current: Row,
    results: Vec<Row>,
    cursor: isize,
    filters: Vec<Predicate>,
    projection: Vec<Projection>,
    ordering: OrderBy,
    errors: FieldErrors,
}

impl Record {
    /// Bind a record to its model, reflecting the table on first use
    pub(crate) async fn open(ctx: Arc<Context>, definition: Arc<ModelDefinition>) -> OrmResult<Self> {
        let schema = ctx
            .schemas()
            .get_table(&definition.table, ctx.router())
            .await?;

        if !schema.has_column(&definition.primary_key) {
            return Err(OrmError::Schema(format!(
                "Primary key '{}' of model {} is not a column of '{}'",
                definition.primary_key, definition.name, definition.table
            )));
        }

        let store = ctx.store_for(&definition);
        let ordering = OrderBy::desc(definition.primary_key.clone());

        Ok(Self {
            ctx,
            definition,
            schema,
            store,
            unsaved: Row::new(),
            current: Row::new(),
            results: Vec::new(),
            cursor: -1,
            filters: Vec::new(),
            projection: Vec::new(),
            ordering,
            errors: FieldErrors::new(),
        })
    }

    /// Seed the pending changes, as a constructor with field values would
    pub fn with_fields(mut self, fields: Row) -> Self {
        self.unsaved.extend(fields);
        self
    }

    pub fn model_name(&self) -> &str {
        &self.definition.name
    }

    pub fn table_name(&self) -> &str {
        &self.definition.table
    }

    pub fn primary_key(&self) -> &str {
        &self.definition.primary_key
    }

    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Stage a field change for the next `save`
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.unsaved.insert(field.into(), value.into());
        self
    }

    /// Pending value first, then the loaded row
    pub fn get(&self, field: &str) -> OrmResult<Value> {
        self.unsaved
            .get(field)
            .or_else(|| self.current.get(field))
            .cloned()
            .ok_or_else(|| OrmError::attribute_not_found(self.model_name(), field))
    }

    /// Drop a field from the loaded row, or else from the pending changes
    pub fn unset(&mut self, field: &str) -> bool {
        self.current.remove(field).is_some() || self.unsaved.remove(field).is_some()
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(field.into(), message.into());
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// No pending changes
    pub fn is_saved(&self) -> bool {
        self.unsaved.is_empty()
    }

    pub fn pending(&self) -> &Row {
        &self.unsaved
    }

    pub fn current_row(&self) -> &Row {
        &self.current
    }

    /// Size of the result set, else 1 when a row is loaded
    pub fn len(&self) -> usize {
        if !self.results.is_empty() {
            self.results.len()
        } else if !self.current.is_empty() {
            1
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The loaded row restricted to table columns
    pub fn to_dict(&self) -> Row {
        self.schema
            .column_names()
            .filter_map(|name| self.current.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }

    pub fn to_list(&self) -> Vec<Row> {
        self.results.clone()
    }

    /// One column across the result set
    pub fn get_field(&self, column: &str) -> Vec<Value> {
        self.results
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.results.iter()
    }

    /// Move the cursor and load the next result into the current row.
    /// Returns `false` once the result set is exhausted.
    pub fn advance(&mut self) -> bool {
        let next = self.cursor + 1;
        match self.results.get(next as usize) {
            Some(row) => {
                self.current = row.clone();
                self.cursor = next;
                true
            }
            None => false,
        }
    }

    /// Back to the state of a freshly opened record
    pub fn reset(&mut self) -> &mut Self {
        self.unsaved.clear();
        self.current.clear();
        self.results.clear();
        self.cursor = -1;
        self.filters.clear();
        self.projection.clear();
        self.ordering = OrderBy::desc(self.definition.primary_key.clone());
        self.errors.clear();
        self
    }

    pub fn filters(&self) -> &[Predicate] {
        &self.filters
    }

    pub fn projection(&self) -> &[Projection] {
        &self.projection
    }

    pub fn ordering(&self) -> &OrderBy {
        &self.ordering
    }

    pub(crate) fn target(&self) -> Target {
        Target::new(
            self.definition.name.clone(),
            self.definition.table.clone(),
            self.definition.primary_key.clone(),
        )
        .with_shard((self.definition.shard)(self))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.definition.name)
            .field("unsaved", &self.unsaved)
            .field("current", &self.current)
            .field("results", &self.results.len())
            .field("filters", &self.filters)
            .field("errors", &self.errors)
            .finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = if !self.results.is_empty() {
            serde_json::to_string(&self.results)
        } else if !self.current.is_empty() {
            serde_json::to_string(&self.current)
        } else {
            return write!(f, "<{}>", self.definition.name);
        };
        f.write_str(&rendered.map_err(|_| fmt::Error)?)
    }
}
