//! Field values flowing through the resolution pipeline.
//!
//! [`Value`] is the dynamically-typed cell the engine works with: records hand
//! out values, converters transform them, validators inspect them, and the
//! normalizer renders them to text using the active [`Culture`](crate::culture::Culture).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::culture;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value
    #[default]
    Null,
    /// Explicit database null, distinct from an absent value
    DbNull,
    /// Boolean value
    Bool(bool),
    /// Signed integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    Text(String),
}

/// Type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// [`Value::Bool`]
    Bool,
    /// [`Value::Int`]
    Int,
    /// [`Value::Float`]
    Float,
    /// [`Value::Text`]
    Text,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
        };
        write!(f, "{name}")
    }
}

impl Value {
    /// Returns `true` for [`Value::Null`] and [`Value::DbNull`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::DbNull)
    }

    /// Type tag of this value; nulls infer [`ValueType::Text`].
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Null | Self::DbNull | Self::Text(_) => ValueType::Text,
        }
    }

    /// Borrow the text of a [`Value::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value to text with the active culture. Nulls render empty.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null | Self::DbNull => String::new(),
            Self::Bool(b) => culture::with_current(|c| {
                if *b {
                    c.true_text.clone()
                } else {
                    c.false_text.clone()
                }
            }),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => culture::with_current(|c| c.format_float(*f)),
            Self::Text(s) => s.clone(),
        }
    }

    /// Coerce this value into `target`, parsing text with the active culture.
    ///
    /// Nulls are passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns a message describing the mismatch if the value cannot be
    /// represented as `target`.
    pub fn coerce(self, target: ValueType) -> std::result::Result<Value, String> {
        if self.is_null() || self.value_type() == target {
            return Ok(self);
        }
        match (self, target) {
            (value, ValueType::Text) => Ok(Value::Text(value.to_text())),
            (Value::Text(s), ValueType::Int) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("'{s}' is not a valid {target}")),
            (Value::Text(s), ValueType::Float) => culture::with_current(|c| c.parse_float(&s))
                .map(Value::Float)
                .ok_or_else(|| format!("'{s}' is not a valid {target}")),
            (Value::Text(s), ValueType::Bool) => culture::with_current(|c| c.parse_bool(&s))
                .map(Value::Bool)
                .ok_or_else(|| format!("'{s}' is not a valid {target}")),
            #[allow(clippy::cast_precision_loss)]
            (Value::Int(i), ValueType::Float) => Ok(Value::Float(i as f64)),
            (value, target) => Err(format!(
                "cannot convert {} value to {target}",
                value.value_type()
            )),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::culture::{self, Culture};

    #[test]
    fn test_null_renders_empty() {
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::DbNull.to_text(), "");
        assert!(Value::DbNull.is_null());
    }

    #[test]
    fn test_float_uses_active_culture() {
        assert_eq!(Value::Float(1.25).to_text(), "1.25");
        let _scope = culture::enter(Culture {
            decimal_separator: ',',
            ..Culture::default()
        });
        assert_eq!(Value::Float(1.25).to_text(), "1,25");
        assert_eq!(
            Value::from("2,5").coerce(ValueType::Float),
            Ok(Value::Float(2.5))
        );
    }

    #[test]
    fn test_coerce_text_to_int() {
        assert_eq!(Value::from(" 42 ").coerce(ValueType::Int), Ok(Value::Int(42)));
        assert!(Value::from("forty").coerce(ValueType::Int).is_err());
        assert_eq!(Value::Null.coerce(ValueType::Int), Ok(Value::Null));
        assert_eq!(
            Value::Int(7).coerce(ValueType::Text),
            Ok(Value::Text("7".to_string()))
        );
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({"a": 1, "b": "x", "c": null, "d": 1.5, "e": [1]});
        let obj = json.as_object().unwrap();
        assert_eq!(Value::from(obj["a"].clone()), Value::Int(1));
        assert_eq!(Value::from(obj["b"].clone()), Value::from("x"));
        assert_eq!(Value::from(obj["c"].clone()), Value::Null);
        assert_eq!(Value::from(obj["d"].clone()), Value::Float(1.5));
        assert_eq!(Value::from(obj["e"].clone()), Value::from("[1]"));
    }

    #[test]
    fn test_value_type_inference() {
        assert_eq!(Value::Null.value_type(), ValueType::Text);
        assert_eq!(Value::Int(1).value_type(), ValueType::Int);
        assert_eq!(Value::from(Some(true)).value_type(), ValueType::Bool);
    }
}
