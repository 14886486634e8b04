//! # thing-orm: active-record data access
//!
//! Declare a model per table, then find, filter, page, count, save and
//! delete rows without writing SQL for the common cases. Table structure is
//! reflected from the database, not declared.
//!
//! The pieces, leaf first:
//!
//! - [`connection::ConnectionRouter`] maps (table, read/write, shard) to a
//!   cached connection per configuration section
//! - [`schema::SchemaCache`] reflects each table once
//! - [`record::Record`] holds the row state and query builder of one model use
//! - [`persistence`] issues the statements, optionally through the
//!   cache-aside [`persistence::CachedStore`]
//! - [`context::Context`] owns all of the above and hands out records

pub mod backends;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod events;
pub mod model;
pub mod observers;
pub mod persistence;
pub mod query;
pub mod record;
pub mod schema;

// Re-export core traits and types
pub use backends::{DatabaseBackend, DatabaseConnection, MemoryBackend, PostgresBackend, Row};
pub use config::{DatabaseSection, RedisSection, ThingConfig};
pub use context::{Context, ContextBuilder};
pub use error::{FieldErrors, OrmError, OrmResult};
pub use events::{ModelEvent, ModelObserver};
pub use model::{Association, AssociationKind, Model, ModelDefinition};
pub use persistence::{CachedStore, DatabaseStore, Persistence};
pub use record::{DynamicArgs, DynamicResult, Record, SaveOutcome};
pub use schema::{SchemaCache, TableSchema};

pub use thing_validation::Rules;
