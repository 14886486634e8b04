//! Error types for the ORM
//!
//! Hard failures (configuration, schema, query syntax, driver errors) are
//! returned as [`OrmError`]. Soft outcomes such as validation failures or a
//! `find` that matched nothing are kept as state on the record instead.

use std::collections::BTreeMap;
use thiserror::Error;

pub type OrmResult<T> = Result<T, OrmError>;

/// Field name -> message, as carried by a record after a rejected save
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrmError {
    /// Missing routing section, unsupported URL scheme, unregistered model
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Table reflection failed or the table has no primary key
    #[error("Schema error: {0}")]
    Schema(String),

    /// Unknown operator, malformed function expression, bad arguments
    #[error("Query error: {0}")]
    Query(String),

    #[error("Attribute '{attribute}' not found on model {model}")]
    AttributeNotFound { model: String, attribute: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrmError {
    pub fn attribute_not_found(model: impl Into<String>, attribute: impl Into<String>) -> Self {
        OrmError::AttributeNotFound {
            model: model.into(),
            attribute: attribute.into(),
        }
    }
}

impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                OrmError::Connection(err.to_string())
            }
            other => OrmError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for OrmError {
    fn from(err: serde_yaml::Error) -> Self {
        OrmError::Configuration(format!("Invalid YAML configuration: {}", err))
    }
}

impl From<thing_cache::CacheError> for OrmError {
    fn from(err: thing_cache::CacheError) -> Self {
        OrmError::Connection(format!("Cache unavailable: {}", err))
    }
}

/// Fold validator output into the record's error map, keeping the first
/// message reported for each field.
pub fn field_errors_from(errors: &thing_validation::ValidationErrors) -> FieldErrors {
    errors.first_messages()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            OrmError::Configuration("no section 'master'".into()).to_string(),
            "Configuration error: no section 'master'"
        );
        assert_eq!(
            OrmError::attribute_not_found("Member", "nickname").to_string(),
            "Attribute 'nickname' not found on model Member"
        );
    }

    #[test]
    fn test_validation_errors_fold_to_first_message() {
        let mut errors = thing_validation::ValidationErrors::new();
        errors.add_error("email", "invalid email");
        errors.add_error("email", "too long");

        let folded = field_errors_from(&errors);
        assert_eq!(folded.get("email").map(String::as_str), Some("invalid email"));
    }
}
