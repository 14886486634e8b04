//! Core Model Trait - static description of a table-bound entity

use super::definition::{Association, ModelDefinition};
use crate::record::Record;
use thing_validation::Rules;

/// Declares a model. Everything but the name has a default; the context
/// turns the declaration into a [`ModelDefinition`] when it is registered.
///
/// ```rust,ignore
/// struct Member;
///
/// impl Model for Member {
///     fn model_name() -> &'static str {
///         "Member"
///     }
///
///     fn associations() -> Vec<Association> {
///         vec![Association::has_many("votes", "Vote", "member_id")]
///     }
///
///     fn rules() -> Rules {
///         Rules::new().field("email", EmailValidator::new().message("invalid email"))
///     }
/// }
/// ```
pub trait Model: Send + Sync + 'static {
    fn model_name() -> &'static str;

    /// Table name for this model
    fn table_name() -> String {
        Self::model_name().to_lowercase()
    }

    /// Primary key field name
    fn primary_key_name() -> &'static str {
        "id"
    }

    fn associations() -> Vec<Association> {
        Vec::new()
    }

    fn rules() -> Rules {
        Rules::new()
    }

    /// Opt in to the cache-aside store
    fn cached() -> bool {
        false
    }

    /// Shard argument for the router; `None` routes by table and role only
    fn shard(_record: &Record) -> Option<String> {
        None
    }

    fn definition() -> ModelDefinition {
        let mut definition = ModelDefinition::new(Self::model_name())
            .with_table(Self::table_name())
            .with_primary_key(Self::primary_key_name())
            .with_rules(Self::rules())
            .cached(Self::cached())
            .with_shard(Self::shard);
        definition.associations = Self::associations();
        definition
    }
}
