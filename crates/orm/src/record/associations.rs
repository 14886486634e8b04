//! has-many / belongs-to lookups
//!
//! Both return a fresh record of the target model, independent of `self`.
//! A has-many record comes back with its foreign-key filter staged and
//! nothing loaded; a belongs-to record comes back with the parent loaded, or
//! empty when the foreign key is null.

use super::Record;
use crate::error::{OrmError, OrmResult};
use crate::model::AssociationKind;

impl Record {
    /// Look up an association declared on the model
    pub async fn association(&self, name: &str) -> OrmResult<Record> {
        let association = self
            .definition
            .association(name)
            .ok_or_else(|| OrmError::attribute_not_found(self.model_name(), name))?;

        match association.kind {
            AssociationKind::HasMany => self.has_many(name).await,
            AssociationKind::BelongsTo => self.belongs_to(name).await,
        }
    }

    /// Target records whose foreign key equals this record's primary key
    pub async fn has_many(&self, name: &str) -> OrmResult<Record> {
        let association = self
            .definition
            .association(name)
            .filter(|a| a.kind == AssociationKind::HasMany)
            .ok_or_else(|| OrmError::attribute_not_found(self.model_name(), name))?;

        let pk = self.get(self.primary_key()).map_err(|_| {
            OrmError::Query(format!(
                "{}.{} needs a loaded or assigned primary key",
                self.model_name(),
                name
            ))
        })?;

        let mut target = self.ctx.record_named(&association.target).await?;
        target.where_eq(&association.foreign_key, pk)?;
        Ok(target)
    }

    /// The target record whose primary key equals this record's foreign key
    pub async fn belongs_to(&self, name: &str) -> OrmResult<Record> {
        let association = self
            .definition
            .association(name)
            .filter(|a| a.kind == AssociationKind::BelongsTo)
            .ok_or_else(|| OrmError::attribute_not_found(self.model_name(), name))?;

        let fk = self.get(&association.foreign_key)?;
        let mut target = self.ctx.record_named(&association.target).await?;
        if fk.is_null() {
            return Ok(target);
        }
        target.find_by_primary_key(fk).await?;
        Ok(target)
    }
}
