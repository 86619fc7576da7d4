//! Member-level and object-level validation.
//!
//! Validators are opaque predicates attached to fields ([`Validator`]) or to a
//! whole record ([`RecordValidator`]). [`ValidationMode`] on the record policy
//! decides when they run: member-level validation checks each field right
//! after conversion, object-level validation checks the fully resolved record
//! once all its fields are known.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;

use crate::descriptor::RecordDescriptor;
use crate::error::{RecfmtError, Result};
use crate::value::Value;

define_flags! {
    /// When validators run.
    ValidationMode {
        /// Validate each field as it is resolved
        MEMBER_LEVEL = 0b01,
        /// Validate the whole record after every field is resolved
        OBJECT_LEVEL = 0b10,
    }
}

type CheckFn = dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync;
type RecordCheckFn = dyn Fn(&IndexMap<String, Value>) -> std::result::Result<(), String> + Send + Sync;

/// A named field predicate.
#[derive(Clone)]
pub struct Validator {
    name: String,
    check: Arc<CheckFn>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").field("name", &self.name).finish()
    }
}

impl Validator {
    /// Wrap a predicate returning a failure message on rejection.
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Validator {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Validator name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the predicate.
    ///
    /// # Errors
    ///
    /// Returns the validator's failure message.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        (self.check)(value)
    }

    /// Rejects nulls and blank text.
    #[must_use]
    pub fn required() -> Self {
        Validator::new("required", |value| match value {
            Value::Null | Value::DbNull => Err("value is required".to_string()),
            Value::Text(s) if s.trim().is_empty() => Err("value is required".to_string()),
            _ => Ok(()),
        })
    }

    /// Rejects text longer than `max` characters.
    #[must_use]
    pub fn max_length(max: usize) -> Self {
        Validator::new("max_length", move |value| {
            let len = value.to_text().chars().count();
            if len > max {
                Err(format!("length {len} exceeds {max}"))
            } else {
                Ok(())
            }
        })
    }

    /// Rejects numbers outside `min..=max`. Nulls pass.
    #[must_use]
    pub fn range(min: f64, max: f64) -> Self {
        Validator::new("range", move |value| {
            #[allow(clippy::cast_precision_loss)]
            let number = match value {
                Value::Int(i) => *i as f64,
                Value::Float(f) => *f,
                Value::Null | Value::DbNull => return Ok(()),
                other => return Err(format!("'{other}' is not a number")),
            };
            if number < min || number > max {
                Err(format!("{number} is outside [{min}, {max}]"))
            } else {
                Ok(())
            }
        })
    }

    /// Rejects values whose text does not match `pattern`. Nulls pass.
    #[must_use]
    pub fn pattern(pattern: Regex) -> Self {
        Validator::new("pattern", move |value| {
            if value.is_null() || pattern.is_match(&value.to_text()) {
                Ok(())
            } else {
                Err(format!("'{value}' does not match /{pattern}/"))
            }
        })
    }
}

/// A named predicate over a fully resolved record.
#[derive(Clone)]
pub struct RecordValidator {
    name: String,
    check: Arc<RecordCheckFn>,
}

impl fmt::Debug for RecordValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordValidator")
            .field("name", &self.name)
            .finish()
    }
}

impl RecordValidator {
    /// Wrap a record predicate.
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&IndexMap<String, Value>) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        RecordValidator {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Validator name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the predicate.
    ///
    /// # Errors
    ///
    /// Returns the validator's failure message.
    pub fn validate(&self, values: &IndexMap<String, Value>) -> std::result::Result<(), String> {
        (self.check)(values)
    }
}

/// Run every validator of one field against `value`.
///
/// # Errors
///
/// Returns [`RecfmtError::Validation`] for the first rejecting validator.
pub fn validate_member(field: &str, validators: &[Validator], value: &Value) -> Result<()> {
    for validator in validators {
        validator
            .validate(value)
            .map_err(|message| RecfmtError::Validation {
                field: field.to_string(),
                message: format!("{}: {message}", validator.name()),
            })?;
    }
    Ok(())
}

/// Run the record's full validator set once over its resolved values.
///
/// Every field validator sees its field's value (a field that was omitted is
/// checked as [`Value::Null`]), then every record validator sees the whole map.
///
/// # Errors
///
/// Returns [`RecfmtError::ObjectValidation`] describing the first failure.
pub fn validate_object(
    descriptor: &RecordDescriptor,
    values: &IndexMap<String, Value>,
) -> Result<()> {
    for field in descriptor.fields() {
        let value = values.get(field.name()).unwrap_or(&Value::Null);
        validate_member(field.name(), &field.validators, value)
            .map_err(|e| RecfmtError::ObjectValidation(e.to_string()))?;
    }
    for validator in descriptor.record_validators() {
        validator.validate(values).map_err(|message| {
            RecfmtError::ObjectValidation(format!("{}: {message}", validator.name()))
        })?;
    }
    Ok(())
}
