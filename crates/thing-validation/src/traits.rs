//! Core validation trait

use crate::error::ValidationResult;
use async_trait::async_trait;
use serde_json::Value;

/// A single validation check applied to one field value
#[async_trait]
pub trait ValidationRule: Send + Sync {
    /// Validate a value; `field` is used to build messages
    async fn validate(&self, value: &Value, field: &str) -> ValidationResult<()>;

    /// Rule identifier, used in logs
    fn rule_name(&self) -> &'static str;
}
