//! # thing-validation
//!
//! Field-level validation for `thing-orm` records. A model declares a [`Rules`]
//! set (field name -> validators); the persistence lifecycle runs it against the
//! pending changes of a record before any write is issued.

pub mod error;
pub mod rules;
pub mod traits;
pub mod validators;

pub use error::{ValidationError, ValidationErrors, ValidationResult};
pub use rules::Rules;
pub use traits::ValidationRule;

pub use validators::{
    email::EmailValidator, length::LengthValidator, pattern::PatternValidator,
    required::RequiredValidator,
};
