//! Per-field rule sets

use crate::error::{ValidationErrors, ValidationResult};
use crate::traits::ValidationRule;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Validation rules keyed by field name.
///
/// Fields with rules are checked whether or not they are present in the data;
/// an absent field is validated as `null`, which lets [`RequiredValidator`]
/// catch missing values while format validators skip them.
///
/// [`RequiredValidator`]: crate::RequiredValidator
#[derive(Clone, Default)]
pub struct Rules {
    field_rules: BTreeMap<String, Vec<Arc<dyn ValidationRule>>>,
}

impl std::fmt::Debug for Rules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: BTreeMap<&String, Vec<&'static str>> = self
            .field_rules
            .iter()
            .map(|(field, rules)| (field, rules.iter().map(|r| r.rule_name()).collect()))
            .collect();
        f.debug_struct("Rules").field("fields", &fields).finish()
    }
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for a field
    pub fn field<R>(mut self, field: impl Into<String>, rule: R) -> Self
    where
        R: ValidationRule + 'static,
    {
        self.field_rules
            .entry(field.into())
            .or_default()
            .push(Arc::new(rule));
        self
    }

    pub fn get_field_rules(&self, field: &str) -> Option<&Vec<Arc<dyn ValidationRule>>> {
        self.field_rules.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.field_rules.is_empty()
    }

    pub fn validated_fields(&self) -> impl Iterator<Item = &str> {
        self.field_rules.keys().map(String::as_str)
    }

    /// Validate a flat column -> value mapping
    pub async fn validate(&self, data: &Map<String, Value>) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();

        for (field, rules) in &self.field_rules {
            let value = data.get(field).unwrap_or(&Value::Null);
            for rule in rules {
                if let Err(rule_errors) = rule.validate(value, field).await {
                    errors.merge(rule_errors);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
