//! Value converters.
//!
//! A [`Converter`] is an opaque `convert(value) -> value | error` function with a
//! name for diagnostics. A field carries an ordered chain of converters; the
//! chain stops at the first failure.

use std::fmt;
use std::sync::Arc;

use crate::culture;
use crate::error::{RecfmtError, Result};
use crate::value::Value;

type ConvertFn = dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync;

/// A named value conversion.
#[derive(Clone)]
pub struct Converter {
    name: String,
    func: Arc<ConvertFn>,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter").field("name", &self.name).finish()
    }
}

impl Converter {
    /// Wrap a conversion function.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Converter {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Converter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the conversion.
    ///
    /// # Errors
    ///
    /// Returns the converter's failure message.
    pub fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        (self.func)(value)
    }

    /// Trim surrounding whitespace from text values.
    #[must_use]
    pub fn trim() -> Self {
        Converter::new("trim", |value| {
            Ok(match value {
                Value::Text(s) => Value::Text(s.trim().to_string()),
                other => other,
            })
        })
    }

    /// Uppercase text values.
    #[must_use]
    pub fn uppercase() -> Self {
        Converter::new("uppercase", |value| {
            Ok(match value {
                Value::Text(s) => Value::Text(s.to_uppercase()),
                other => other,
            })
        })
    }

    /// Parse text into [`Value::Int`]. Empty text becomes [`Value::Null`].
    #[must_use]
    pub fn parse_int() -> Self {
        Converter::new("parse_int", |value| match value {
            Value::Text(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| format!("'{s}' is not an integer: {e}")),
            other => Ok(other),
        })
    }

    /// Parse text into [`Value::Float`] using the active culture.
    #[must_use]
    pub fn parse_float() -> Self {
        Converter::new("parse_float", |value| match value {
            Value::Text(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::Text(s) => culture::with_current(|c| c.parse_float(&s))
                .map(Value::Float)
                .ok_or_else(|| format!("'{s}' is not a number")),
            other => Ok(other),
        })
    }
}

/// Run `value` through `converters` in order, stopping at the first failure.
///
/// # Errors
///
/// Returns [`RecfmtError::Conversion`] naming `field` and the failing converter.
pub fn apply_chain(field: &str, converters: &[Converter], value: Value) -> Result<Value> {
    converters.iter().try_fold(value, |value, converter| {
        converter
            .convert(value)
            .map_err(|message| RecfmtError::Conversion {
                field: field.to_string(),
                message: format!("{} converter: {message}", converter.name()),
            })
    })
}
