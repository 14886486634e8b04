//! Model declarations
//!
//! - `core_trait`: the `Model` trait applications implement
//! - `definition`: the runtime `ModelDefinition` the context registers

pub mod core_trait;
pub mod definition;

pub use core_trait::Model;
pub use definition::{Association, AssociationKind, ModelDefinition, ShardFn};
