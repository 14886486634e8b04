//! Runtime description of a model: table, key, associations, rules

use crate::record::Record;
use thing_validation::Rules;

/// Picks the shard argument handed to the router for a record
pub type ShardFn = fn(&Record) -> Option<String>;

fn no_shard(_record: &Record) -> Option<String> {
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// Rows of the target whose foreign key equals this record's primary key
    HasMany,
    /// The target row whose primary key equals this record's foreign key
    BelongsTo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub name: String,
    pub kind: AssociationKind,
    /// Model name of the target, as registered on the context
    pub target: String,
    pub foreign_key: String,
}

impl Association {
    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: AssociationKind::HasMany,
            target: target.into(),
            foreign_key: foreign_key.into(),
        }
    }

    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: AssociationKind::BelongsTo,
            target: target.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

#[derive(Clone)]
pub struct ModelDefinition {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub associations: Vec<Association>,
    pub rules: Rules,
    /// Route reads and writes through the cache-aside store
    pub cached: bool,
    pub shard: ShardFn,
}

impl std::fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("associations", &self.associations)
            .field("rules", &self.rules)
            .field("cached", &self.cached)
            .finish()
    }
}

impl ModelDefinition {
    /// Table defaults to the lowercased name, primary key to `id`
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: name.to_lowercase(),
            name,
            primary_key: "id".to_string(),
            associations: Vec::new(),
            rules: Rules::new(),
            cached: false,
            shard: no_shard,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    pub fn has_many(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.with_association(Association::has_many(name, target, foreign_key))
    }

    pub fn belongs_to(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.with_association(Association::belongs_to(name, target, foreign_key))
    }

    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn with_shard(mut self, shard: ShardFn) -> Self {
        self.shard = shard;
        self
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let definition = ModelDefinition::new("Member");
        assert_eq!(definition.table, "member");
        assert_eq!(definition.primary_key, "id");
        assert!(!definition.cached);
        assert!(definition.associations.is_empty());
    }

    #[test]
    fn test_association_lookup() {
        let definition = ModelDefinition::new("Member")
            .has_many("votes", "Vote", "member_id")
            .belongs_to("team", "Team", "team_id");

        let votes = definition.association("votes").unwrap();
        assert_eq!(votes.kind, AssociationKind::HasMany);
        assert_eq!(votes.target, "Vote");
        assert_eq!(definition.association("team").unwrap().foreign_key, "team_id");
        assert!(definition.association("comments").is_none());
    }
}
