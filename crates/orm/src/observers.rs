use crate::backends::Row;
use crate::error::FieldErrors;
use crate::events::{ModelEvent, ModelObserver};
use crate::record::Record;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Ordered observers for one dispatch
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn ModelObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn ModelObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Run every observer in order and collect the errors they report.
    /// On a field reported twice the first message wins.
    pub async fn trigger(&self, event: ModelEvent, record: &Record, data: &Row) -> FieldErrors {
        let mut errors = FieldErrors::new();

        for observer in &self.observers {
            let result = match event {
                ModelEvent::BeforeValidation => observer.before_validation(record, data).await,
                ModelEvent::AfterValidation => observer.after_validation(record, data).await,
                ModelEvent::BeforeUpdate => observer.before_update(record, data).await,
                ModelEvent::AfterUpdate => observer.after_update(record, data).await,
                ModelEvent::BeforeInsert => observer.before_insert(record, data).await,
                ModelEvent::AfterInsert => observer.after_insert(record, data).await,
                ModelEvent::BeforeDelete => observer.before_delete(record, data).await,
                ModelEvent::AfterDelete => observer.after_delete(record, data).await,
            };

            if let Err(reported) = result {
                for (field, message) in reported {
                    errors.entry(field).or_insert(message);
                }
            }
        }

        errors
    }
}

/// Observers registered per table, plus global ones that see every table
#[derive(Default)]
pub struct ObserverManager {
    table_observers: DashMap<String, Vec<Arc<dyn ModelObserver>>>,
    global_observers: RwLock<Vec<Arc<dyn ModelObserver>>>,
}

impl ObserverManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_for_table(&self, table: &str, observer: Arc<dyn ModelObserver>) {
        self.table_observers
            .entry(table.to_string())
            .or_default()
            .push(observer);
    }

    pub fn register_global(&self, observer: Arc<dyn ModelObserver>) {
        self.global_observers.write().push(observer);
    }

    /// Table observers first, then global ones, each in registration order
    pub fn observers_for(&self, table: &str) -> ObserverRegistry {
        let mut registry = ObserverRegistry::new();
        if let Some(observers) = self.table_observers.get(table) {
            for observer in observers.iter() {
                registry.register(observer.clone());
            }
        }
        for observer in self.global_observers.read().iter() {
            registry.register(observer.clone());
        }
        registry
    }

    pub async fn trigger(&self, event: ModelEvent, record: &Record, data: &Row) -> FieldErrors {
        let registry = self.observers_for(record.table_name());
        if registry.observer_count() == 0 {
            return FieldErrors::new();
        }

        debug!("Dispatching {}", event.event_name(record.table_name()));
        registry.trigger(event, record, data).await
    }

    pub fn has_observers(&self, table: &str) -> bool {
        self.table_observers
            .get(table)
            .map_or(false, |observers| !observers.is_empty())
            || !self.global_observers.read().is_empty()
    }
}
