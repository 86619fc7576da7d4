//! Field descriptors: the schema of one named value.
//!
//! A [`FieldDescriptor`] describes how a single field is looked up, converted,
//! validated, recovered and formatted. Descriptors are assembled with fluent
//! setters and then added to a [`RecordDescriptor`](crate::descriptor::RecordDescriptor):
//!
//! ```
//! use recfmt::field::{FieldDescriptor, Justification};
//! use recfmt::recovery::ErrorMode;
//!
//! let amount = FieldDescriptor::fixed("amount", 10, 8)
//!     .justification(Justification::Right)
//!     .fill_char('0')
//!     .error_mode(ErrorMode::ReportAndContinue)
//!     .fallback_value(0);
//!
//! assert_eq!(amount.size, Some(8));
//! assert_eq!(amount.start_index(), Some(10));
//! ```

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::convert::Converter;
use crate::error::Result;
use crate::recovery::ErrorMode;
use crate::validation::Validator;
use crate::value::{Value, ValueType};
use crate::xml_query::CompiledQuery;

define_flags! {
    /// Values that suppress a field instead of writing it.
    IgnoreValueMode {
        /// Suppress [`Value::Null`]
        NULL = 0b0001,
        /// Suppress [`Value::DbNull`]
        DB_NULL = 0b0010,
        /// Suppress empty text
        EMPTY = 0b0100,
        /// Suppress empty or whitespace-only text
        WHITE_SPACE = 0b1000,
    }
}

impl IgnoreValueMode {
    /// Returns `true` if `value` matches any flag in this mode.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match value {
            Value::Null => self.contains(Self::NULL),
            Value::DbNull => self.contains(Self::DB_NULL),
            Value::Text(s) => {
                (self.contains(Self::EMPTY) && s.is_empty())
                    || (self.contains(Self::WHITE_SPACE) && s.trim().is_empty())
            },
            _ => false,
        }
    }
}

/// Alignment of a value's text inside its padded size.
///
/// `Right` pads on the left, `Left` pads on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Justification {
    /// Text is left-aligned (default)
    #[default]
    Left,
    /// Text is right-aligned
    Right,
}

/// XML-specific field settings.
#[derive(Debug, Clone, Default)]
pub struct XmlFieldSettings {
    /// Render as an attribute of the node element instead of a child element
    pub is_attribute: bool,
    query_expression: Option<String>,
    compiled: OnceLock<CompiledQuery>,
}

impl XmlFieldSettings {
    /// Query expression locating the field inside a node when reading.
    #[must_use]
    pub fn query_expression(&self) -> Option<&str> {
        self.query_expression.as_deref()
    }

    /// Replace the query expression, discarding any compiled form.
    pub fn set_query_expression(&mut self, expression: Option<String>) {
        self.query_expression = expression;
        self.compiled = OnceLock::new();
    }

    /// Compiled query, computed on first use and memoized.
    ///
    /// Compilation is a pure function of the expression, so a second caller
    /// racing the first computes the same value.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the expression is missing or invalid.
    pub fn compiled_query(&self) -> Result<&CompiledQuery> {
        if let Some(query) = self.compiled.get() {
            return Ok(query);
        }
        let query = CompiledQuery::compile(self.query_expression.as_deref().unwrap_or(""))?;
        Ok(self.compiled.get_or_init(|| query))
    }

    /// Returns `true` once the query has been compiled.
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }
}

/// Format-specific extension of a field.
#[derive(Debug, Clone, Default)]
pub enum FormatSettings {
    /// No format-specific settings
    #[default]
    Generic,
    /// Fixed-length column
    FixedLength {
        /// Zero-based character offset of the column
        start_index: usize,
    },
    /// XML element or attribute
    Xml(XmlFieldSettings),
}

/// Schema of one field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    /// Emitted tag, attribute or column label
    pub external_name: String,
    /// Alternative value-source names tried when `name` is missing
    pub aliases: Vec<String>,
    /// Rendered width
    pub size: Option<usize>,
    /// Cut values longer than `size` instead of failing
    pub truncate: bool,
    /// Alignment inside `size`; `Left` when unset
    pub justification: Option<Justification>,
    /// Padding character; space when unset
    pub fill_char: Option<char>,
    /// Force (`Some(true)`) or auto-detect quoting
    pub quote: Option<bool>,
    /// Field error mode; inherited from the record when unset
    pub error_mode: Option<ErrorMode>,
    /// Suppressed values; inherited from the record when unset
    pub ignore_value_mode: Option<IgnoreValueMode>,
    /// Value used when the source is absent, and as the second recovery substitute
    pub default_value: Option<Value>,
    /// First recovery substitute
    pub fallback_value: Option<Value>,
    /// Conversion chain
    pub converters: Vec<Converter>,
    /// Member-level validators
    pub validators: Vec<Validator>,
    /// Format-specific settings
    pub format: FormatSettings,
    value_type: OnceLock<ValueType>,
}

impl FieldDescriptor {
    /// Create a generic field named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        FieldDescriptor {
            external_name: name.clone(),
            name,
            aliases: Vec::new(),
            size: None,
            truncate: false,
            justification: None,
            fill_char: None,
            quote: None,
            error_mode: None,
            ignore_value_mode: None,
            default_value: None,
            fallback_value: None,
            converters: Vec::new(),
            validators: Vec::new(),
            format: FormatSettings::Generic,
            value_type: OnceLock::new(),
        }
    }

    /// Create a fixed-length column occupying `[start_index, start_index + size)`.
    pub fn fixed(name: impl Into<String>, start_index: usize, size: usize) -> Self {
        let mut field = Self::new(name);
        field.size = Some(size);
        field.format = FormatSettings::FixedLength { start_index };
        field
    }

    /// Create an XML child-element field queried by its own name.
    pub fn xml_element(name: impl Into<String>) -> Self {
        let mut field = Self::new(name);
        let settings = XmlFieldSettings {
            is_attribute: false,
            query_expression: Some(field.name.clone()),
            compiled: OnceLock::new(),
        };
        field.format = FormatSettings::Xml(settings);
        field
    }

    /// Create an XML attribute field queried as `@name`.
    pub fn xml_attribute(name: impl Into<String>) -> Self {
        let mut field = Self::new(name);
        let settings = XmlFieldSettings {
            is_attribute: true,
            query_expression: Some(format!("@{}", field.name)),
            compiled: OnceLock::new(),
        };
        field.format = FormatSettings::Xml(settings);
        field
    }

    /// Logical field name, unique within its record descriptor.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the emitted name. An XML field still querying by the previous name
    /// follows the new one; an explicit query expression is kept.
    #[must_use]
    pub fn external_name(mut self, external_name: impl Into<String>) -> Self {
        let external_name = external_name.into();
        if let FormatSettings::Xml(settings) = &mut self.format {
            let is_attribute = settings.is_attribute;
            let default_query = |name: &str| {
                if is_attribute {
                    format!("@{name}")
                } else {
                    name.to_string()
                }
            };
            if settings.query_expression() == Some(default_query(&self.external_name).as_str()) {
                let query = default_query(&external_name);
                settings.set_query_expression(Some(query));
            }
        }
        self.external_name = external_name;
        self
    }

    /// Add an alternative value-source name.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Set the rendered width.
    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Enable or disable truncation of overlong values.
    #[must_use]
    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Set the alignment inside `size`.
    #[must_use]
    pub fn justification(mut self, justification: Justification) -> Self {
        self.justification = Some(justification);
        self
    }

    /// Set the padding character.
    #[must_use]
    pub fn fill_char(mut self, fill_char: char) -> Self {
        self.fill_char = Some(fill_char);
        self
    }

    /// Force quoting on or off.
    #[must_use]
    pub fn quote(mut self, quote: bool) -> Self {
        self.quote = Some(quote);
        self
    }

    /// Set the field error mode.
    #[must_use]
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = Some(mode);
        self
    }

    /// Set the suppressed values.
    #[must_use]
    pub fn ignore_value_mode(mut self, mode: IgnoreValueMode) -> Self {
        self.ignore_value_mode = Some(mode);
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Set the fallback value.
    #[must_use]
    pub fn fallback_value(mut self, value: impl Into<Value>) -> Self {
        self.fallback_value = Some(value.into());
        self
    }

    /// Declare the value type up front instead of inferring it.
    #[must_use]
    pub fn value_type(self, value_type: ValueType) -> Self {
        self.infer_value_type(value_type);
        self
    }

    /// Append a converter to the chain.
    #[must_use]
    pub fn converter(mut self, converter: Converter) -> Self {
        self.converters.push(converter);
        self
    }

    /// Append a validator.
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Set the XML query expression. Has no effect on non-XML fields.
    #[must_use]
    pub fn query_expression(mut self, expression: impl Into<String>) -> Self {
        if let FormatSettings::Xml(settings) = &mut self.format {
            settings.set_query_expression(Some(expression.into()));
        }
        self
    }

    /// Declared or inferred value type.
    #[must_use]
    pub fn declared_type(&self) -> Option<ValueType> {
        self.value_type.get().copied()
    }

    /// Record the value type if none is known yet; later calls are no-ops.
    pub fn infer_value_type(&self, value_type: ValueType) -> ValueType {
        *self.value_type.get_or_init(|| value_type)
    }

    /// Alignment, `Left` when unset.
    #[must_use]
    pub fn effective_justification(&self) -> Justification {
        self.justification.unwrap_or_default()
    }

    /// Padding character, space when unset.
    #[must_use]
    pub fn effective_fill_char(&self) -> char {
        self.fill_char.unwrap_or(' ')
    }

    /// Field error mode, falling back to `record_mode` when unset.
    #[must_use]
    pub fn effective_error_mode(&self, record_mode: ErrorMode) -> ErrorMode {
        self.error_mode.unwrap_or(record_mode)
    }

    /// Returns `true` if `value` should be suppressed instead of written.
    #[must_use]
    pub fn ignores(&self, value: &Value) -> bool {
        self.ignore_value_mode
            .is_some_and(|mode| mode.matches(value))
    }

    /// XML settings, if this is an XML field.
    #[must_use]
    pub fn xml(&self) -> Option<&XmlFieldSettings> {
        match &self.format {
            FormatSettings::Xml(settings) => Some(settings),
            _ => None,
        }
    }

    /// Returns `true` for XML attribute fields.
    #[must_use]
    pub fn is_attribute(&self) -> bool {
        self.xml().is_some_and(|settings| settings.is_attribute)
    }

    /// Turn a generic field into an XML child element queried by its external name.
    pub(crate) fn ensure_xml(&mut self) {
        if matches!(self.format, FormatSettings::Generic) {
            self.format = FormatSettings::Xml(XmlFieldSettings {
                is_attribute: false,
                query_expression: Some(self.external_name.clone()),
                compiled: OnceLock::new(),
            });
        }
    }

    /// Column offset of fixed-length fields.
    #[must_use]
    pub fn start_index(&self) -> Option<usize> {
        match self.format {
            FormatSettings::FixedLength { start_index } => Some(start_index),
            _ => None,
        }
    }
}

/// Closure-free field configuration, loadable with serde.
///
/// The format extension is chosen from the optional settings: `start_index`
/// makes a fixed-length column, `is_attribute` or `query_expression` an XML
/// field, otherwise a generic field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSettings {
    /// Logical name
    pub name: String,
    /// Emitted name; `name` when unset
    pub external_name: Option<String>,
    /// Alternative value-source names
    pub aliases: Vec<String>,
    /// Rendered width
    pub size: Option<usize>,
    /// Cut overlong values
    pub truncate: bool,
    /// Alignment
    pub justification: Option<Justification>,
    /// Padding character
    pub fill_char: Option<char>,
    /// Quoting
    pub quote: Option<bool>,
    /// Error mode
    pub error_mode: Option<ErrorMode>,
    /// Suppressed values
    pub ignore_value_mode: Option<IgnoreValueMode>,
    /// Default value
    pub default_value: Option<Value>,
    /// Fallback value
    pub fallback_value: Option<Value>,
    /// Declared value type
    pub value_type: Option<ValueType>,
    /// Fixed-length column offset
    pub start_index: Option<usize>,
    /// XML attribute placement
    pub is_attribute: Option<bool>,
    /// XML query expression
    pub query_expression: Option<String>,
}

impl From<FieldSettings> for FieldDescriptor {
    fn from(settings: FieldSettings) -> Self {
        let mut field = if let Some(start_index) = settings.start_index {
            let mut field = FieldDescriptor::new(settings.name);
            field.format = FormatSettings::FixedLength { start_index };
            field
        } else if settings.is_attribute == Some(true) {
            FieldDescriptor::xml_attribute(settings.name)
        } else if settings.is_attribute.is_some() || settings.query_expression.is_some() {
            FieldDescriptor::xml_element(settings.name)
        } else {
            FieldDescriptor::new(settings.name)
        };

        if let Some(external_name) = settings.external_name {
            field = field.external_name(external_name);
        }
        if let (Some(expression), FormatSettings::Xml(xml)) =
            (settings.query_expression, &mut field.format)
        {
            xml.set_query_expression(Some(expression));
        }
        field.aliases = settings.aliases;
        field.size = settings.size;
        field.truncate = settings.truncate;
        field.justification = settings.justification;
        field.fill_char = settings.fill_char;
        field.quote = settings.quote;
        field.error_mode = settings.error_mode;
        field.ignore_value_mode = settings.ignore_value_mode;
        field.default_value = settings.default_value;
        field.fallback_value = settings.fallback_value;
        if let Some(value_type) = settings.value_type {
            field.infer_value_type(value_type);
        }
        field
    }
}
