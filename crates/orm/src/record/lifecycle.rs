//! Save and delete
//!
//! `save` runs: merge of the loaded row into the pending changes,
//! `before_validation`, rule validation, `after_validation`, then either the
//! update branch (`before_update`, UPDATE, re-read, `after_update`) or the
//! insert branch (`before_insert`, INSERT, re-read, `after_insert`). Errors
//! reported at any step stop the save there and are left on the record.

use super::Record;
use crate::backends::Row;
use crate::error::{field_errors_from, FieldErrors, OrmError, OrmResult};
use crate::events::ModelEvent;
use serde_json::Value;
use tracing::debug;

/// Result of [`Record::save`]
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Primary key of the written row
    Saved(Value),
    /// Errors that stopped the save, also available from `Record::errors`
    Rejected(FieldErrors),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }

    pub fn primary_key(&self) -> Option<&Value> {
        match self {
            SaveOutcome::Saved(pk) => Some(pk),
            SaveOutcome::Rejected(_) => None,
        }
    }
}

impl Record {
    /// Run observers for `event`; any reported error lands in `errors`
    async fn emit(&mut self, event: ModelEvent, data: &Row) -> bool {
        let reported = self.ctx.observers().trigger(event, self, data).await;
        if reported.is_empty() {
            return true;
        }

        debug!(
            "{} rejected with {} error(s)",
            event.event_name(&self.definition.table),
            reported.len()
        );
        for (field, message) in reported {
            self.errors.entry(field).or_insert(message);
        }
        false
    }

    fn rejected(&self) -> SaveOutcome {
        SaveOutcome::Rejected(self.errors.clone())
    }

    /// Validate and write the pending changes.
    ///
    /// A record holding errors from an earlier attempt is rejected without
    /// touching the database; call [`Record::clear_errors`] first to retry.
    pub async fn save(&mut self) -> OrmResult<SaveOutcome> {
        if !self.errors.is_empty() {
            return Ok(self.rejected());
        }

        for (column, value) in &self.current {
            if !self.unsaved.contains_key(column) {
                self.unsaved.insert(column.clone(), value.clone());
            }
        }
        let schema = self.schema.clone();
        self.unsaved.retain(|column, _| schema.has_column(column));

        let data = self.unsaved.clone();
        if !self.emit(ModelEvent::BeforeValidation, &data).await {
            return Ok(self.rejected());
        }

        if let Err(errors) = self.definition.rules.validate(&self.unsaved).await {
            self.errors.extend(field_errors_from(&errors));
            return Ok(self.rejected());
        }

        let data = self.unsaved.clone();
        if !self.emit(ModelEvent::AfterValidation, &data).await {
            return Ok(self.rejected());
        }

        let pk_column = self.definition.primary_key.clone();
        let has_pk = self
            .unsaved
            .get(&pk_column)
            .map_or(false, |pk| !pk.is_null());

        let pk = if has_pk {
            match self.save_update(&pk_column).await? {
                Some(pk) => pk,
                None => return Ok(self.rejected()),
            }
        } else {
            match self.save_insert(&pk_column).await? {
                Some(pk) => pk,
                None => return Ok(self.rejected()),
            }
        };

        self.unsaved.clear();
        Ok(SaveOutcome::Saved(pk))
    }

    async fn save_update(&mut self, pk_column: &str) -> OrmResult<Option<Value>> {
        let pk = self
            .unsaved
            .remove(pk_column)
            .ok_or_else(|| OrmError::Query(format!("Missing primary key '{}'", pk_column)))?;

        let data = self.unsaved.clone();
        if !self.emit(ModelEvent::BeforeUpdate, &data).await {
            self.unsaved.insert(pk_column.to_string(), pk);
            return Ok(None);
        }

        let row = self
            .store
            .update_by_pk(&self.target(), &pk, &self.unsaved)
            .await?;
        self.current = row.unwrap_or_default();

        let data = self.current.clone();
        if !self.emit(ModelEvent::AfterUpdate, &data).await {
            return Ok(None);
        }
        Ok(Some(pk))
    }

    async fn save_insert(&mut self, pk_column: &str) -> OrmResult<Option<Value>> {
        self.unsaved.remove(pk_column);

        let data = self.unsaved.clone();
        if !self.emit(ModelEvent::BeforeInsert, &data).await {
            return Ok(None);
        }

        let row = self.store.insert(&self.target(), &self.unsaved).await?;
        let pk = row.get(pk_column).cloned().unwrap_or(Value::Null);
        self.current = row;

        let data = self.current.clone();
        if !self.emit(ModelEvent::AfterInsert, &data).await {
            return Ok(None);
        }
        Ok(Some(pk))
    }

    /// Delete the loaded row, or every row matching the filter stack when no
    /// row is loaded. Returns the number of rows removed.
    pub async fn delete(&mut self) -> OrmResult<u64> {
        let pk_column = self.definition.primary_key.clone();
        let loaded_pk = self
            .current
            .get(&pk_column)
            .filter(|pk| !pk.is_null())
            .cloned();

        match loaded_pk {
            Some(pk) => {
                let data = self.current.clone();
                if !self.emit(ModelEvent::BeforeDelete, &data).await {
                    return Ok(0);
                }

                let deleted = self.store.delete_by_pk(&self.target(), &pk).await?;
                self.current.clear();
                self.emit(ModelEvent::AfterDelete, &data).await;
                Ok(deleted)
            }
            None => {
                let data = Row::new();
                if !self.emit(ModelEvent::BeforeDelete, &data).await {
                    return Ok(0);
                }

                let filters = std::mem::take(&mut self.filters);
                let deleted = self.store.delete_where(&self.target(), &filters).await?;
                self.emit(ModelEvent::AfterDelete, &data).await;
                Ok(deleted)
            }
        }
    }
}
