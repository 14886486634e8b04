use crate::backends::Row;
use crate::error::FieldErrors;
use crate::record::Record;
use async_trait::async_trait;
use std::fmt;

/// Points in the save/delete lifecycle where observers run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelEvent {
    BeforeValidation,
    AfterValidation,
    BeforeUpdate,
    AfterUpdate,
    BeforeInsert,
    AfterInsert,
    BeforeDelete,
    AfterDelete,
}

impl ModelEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelEvent::BeforeValidation => "before_validation",
            ModelEvent::AfterValidation => "after_validation",
            ModelEvent::BeforeUpdate => "before_update",
            ModelEvent::AfterUpdate => "after_update",
            ModelEvent::BeforeInsert => "before_insert",
            ModelEvent::AfterInsert => "after_insert",
            ModelEvent::BeforeDelete => "before_delete",
            ModelEvent::AfterDelete => "after_delete",
        }
    }

    /// `"<table>.<event>"`
    pub fn event_name(&self, table: &str) -> String {
        format!("{}.{}", table, self.as_str())
    }
}

impl fmt::Display for ModelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle callbacks. Each receives the record and the data being written;
/// returning field errors aborts the operation at that step.
#[async_trait]
pub trait ModelObserver: Send + Sync {
    async fn before_validation(&self, _record: &Record, _data: &Row) -> Result<(), FieldErrors> {
        Ok(())
    }

    async fn after_validation(&self, _record: &Record, _data: &Row) -> Result<(), FieldErrors> {
        Ok(())
    }

    async fn before_update(&self, _record: &Record, _data: &Row) -> Result<(), FieldErrors> {
        Ok(())
    }

    async fn after_update(&self, _record: &Record, _data: &Row) -> Result<(), FieldErrors> {
        Ok(())
    }

    async fn before_insert(&self, _record: &Record, _data: &Row) -> Result<(), FieldErrors> {
        Ok(())
    }

    async fn after_insert(&self, _record: &Record, _data: &Row) -> Result<(), FieldErrors> {
        Ok(())
    }

    async fn before_delete(&self, _record: &Record, _data: &Row) -> Result<(), FieldErrors> {
        Ok(())
    }

    async fn after_delete(&self, _record: &Record, _data: &Row) -> Result<(), FieldErrors> {
        Ok(())
    }
}
