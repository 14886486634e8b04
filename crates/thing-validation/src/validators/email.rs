//! Email format validator

use crate::error::{ValidationError, ValidationResult};
use crate::traits::ValidationRule;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

const EMAIL_PATTERN: &str =
    r"^[a-zA-Z0-9]([a-zA-Z0-9._%+-]*[a-zA-Z0-9])?@[a-zA-Z0-9]([a-zA-Z0-9.-]*[a-zA-Z0-9])?\.[a-zA-Z]{2,}$";

/// Validator for email address format. `null` values are skipped.
#[derive(Debug, Clone, Default)]
pub struct EmailValidator {
    pub message: Option<String>,
}

impl EmailValidator {
    pub fn new() -> Self {
        Self { message: None }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn is_valid(email: &str) -> bool {
        let Some((local, domain)) = email.split_once('@') else {
            return false;
        };
        // RFC 5321 limits
        if local.is_empty() || local.len() > 64 || domain.is_empty() || domain.len() > 255 {
            return false;
        }
        if domain.contains('@') || email.contains("..") {
            return false;
        }
        match Regex::new(EMAIL_PATTERN) {
            Ok(regex) => regex.is_match(email),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ValidationRule for EmailValidator {
    async fn validate(&self, value: &Value, field: &str) -> ValidationResult<()> {
        if value.is_null() {
            return Ok(());
        }

        let Some(email) = value.as_str() else {
            return Err(ValidationError::with_code(
                field,
                format!("{} must be a string for email validation", field),
                "invalid_type",
            )
            .into());
        };

        if Self::is_valid(email) {
            return Ok(());
        }
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| format!("{} must be a valid email address", field));
        Err(ValidationError::with_code(field, message, "invalid_email").into())
    }

    fn rule_name(&self) -> &'static str {
        "email"
    }
}
