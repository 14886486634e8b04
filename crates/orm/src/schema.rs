//! Reflected table metadata, fetched once per table and shared

use crate::connection::ConnectionRouter;
use crate::error::{OrmError, OrmResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
        }
    }

    pub fn is_integer(&self) -> bool {
        let data_type = self.data_type.to_ascii_lowercase();
        data_type.contains("int") || data_type.contains("serial")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.columns.push(ColumnInfo::new(name, data_type));
        self
    }

    pub fn with_primary_key(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let mut column = ColumnInfo::new(name, data_type);
        column.primary_key = true;
        column.nullable = false;
        self.columns.push(column);
        self
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Table name -> schema, populated on first use
#[derive(Debug, Default)]
pub struct SchemaCache {
    tables: DashMap<String, Arc<TableSchema>>,
    reflections: AtomicU64,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.tables.get(table).map(|entry| entry.value().clone())
    }

    /// Cached schema, or reflect it over a read connection
    pub async fn get_table(&self, table: &str, router: &ConnectionRouter) -> OrmResult<Arc<TableSchema>> {
        if let Some(schema) = self.get(table) {
            return Ok(schema);
        }

        let conn = router.get_connection(table, true, None).await?;
        let schema = conn
            .describe_table(table)
            .await?
            .ok_or_else(|| OrmError::Schema(format!("Table '{}' does not exist", table)))?;

        if schema.primary_key().is_none() {
            return Err(OrmError::Schema(format!(
                "Table '{}' has no primary key",
                table
            )));
        }

        self.reflections.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Reflected table '{}' ({} columns)",
            table,
            schema.columns.len()
        );

        Ok(self
            .tables
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(schema))
            .clone())
    }

    pub fn insert(&self, schema: TableSchema) {
        self.tables.insert(schema.name.clone(), Arc::new(schema));
    }

    /// Forget every table; the next access reflects again
    pub fn reset(&self) {
        self.tables.clear();
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of reflective reads performed
    pub fn reflections(&self) -> u64 {
        self.reflections.load(Ordering::Relaxed)
    }
}
