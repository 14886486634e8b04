//! Required field validator

use crate::error::{ValidationError, ValidationResult};
use crate::traits::ValidationRule;
use async_trait::async_trait;
use serde_json::Value;

/// Fails when a field is absent, `null`, or a blank string
#[derive(Debug, Clone, Default)]
pub struct RequiredValidator {
    pub message: Option<String>,
}

impl RequiredValidator {
    pub fn new() -> Self {
        Self { message: None }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    fn is_empty(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(arr) => arr.is_empty(),
            _ => false,
        }
    }
}

#[async_trait]
impl ValidationRule for RequiredValidator {
    async fn validate(&self, value: &Value, field: &str) -> ValidationResult<()> {
        if !Self::is_empty(value) {
            return Ok(());
        }
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| format!("{} is required", field));
        Err(ValidationError::with_code(field, message, "required").into())
    }

    fn rule_name(&self) -> &'static str {
        "required"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_required_rejects_null_and_blank() {
        let validator = RequiredValidator::new();
        assert!(validator.validate(&Value::Null, "email").await.is_err());
        assert!(validator.validate(&json!("   "), "email").await.is_err());
    }

    #[tokio::test]
    async fn test_required_accepts_values() {
        let validator = RequiredValidator::new();
        assert!(validator.validate(&json!("x"), "email").await.is_ok());
        assert!(validator.validate(&json!(0), "count").await.is_ok());
        assert!(validator.validate(&json!(false), "flag").await.is_ok());
    }

    #[tokio::test]
    async fn test_required_custom_message() {
        let validator = RequiredValidator::with_message("give us an email");
        let errors = validator.validate(&Value::Null, "email").await.unwrap_err();
        assert_eq!(errors.get_field_errors("email").unwrap()[0].message, "give us an email");
    }
}
