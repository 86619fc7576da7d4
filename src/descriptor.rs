//! Record descriptors: the ordered schema of one whole record.
//!
//! A [`RecordDescriptor`] owns the [`FieldDescriptor`]s of a record plus the
//! record-level [`RecordPolicy`]. Field order is significant: it is the output
//! order of columns and elements.
//!
//! The descriptor goes through a short lifecycle:
//!
//! 1. built explicitly with [`DescriptorBuilder`], or loaded from
//!    [`DescriptorSettings`];
//! 2. optionally bound to a static shape with [`RecordDescriptor::bind_static`];
//! 3. [`validated`](RecordDescriptor::validate) once before the first record,
//!    which fills unset field policies from the record policy;
//! 4. [`locked`](RecordDescriptor::lock) by the writer or reader, after which
//!    the field set can no longer change.
//!
//! ```
//! use recfmt::descriptor::RecordDescriptor;
//! use recfmt::field::FieldDescriptor;
//! use recfmt::recovery::ErrorMode;
//!
//! let descriptor = RecordDescriptor::builder()
//!     .error_mode(ErrorMode::ReportAndContinue)
//!     .field(FieldDescriptor::xml_attribute("id"))
//!     .field(FieldDescriptor::xml_element("name"))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(descriptor.field_names(), vec!["id", "name"]);
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::culture::Culture;
use crate::error::{RecfmtError, Result};
use crate::field::{FieldDescriptor, FieldSettings, IgnoreValueMode};
use crate::record::{AccessorTable, FieldMeta, RecordShape};
use crate::recovery::ErrorMode;
use crate::validation::{RecordValidator, ValidationMode};

/// Record-level policies shared by every field of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordPolicy {
    /// Record error mode; also the default for fields without their own
    pub error_mode: ErrorMode,
    /// Default suppressed values for fields without their own
    pub ignore_value_mode: IgnoreValueMode,
    /// Derive the field list from the first record when none is configured
    pub auto_discover_columns: bool,
    /// Fail when a configured field has no value source in a record
    pub throw_on_missing_field: bool,
    /// When validators run
    pub validation_mode: ValidationMode,
    /// Invoke the progress hook every `notify_after` records; 0 disables it
    pub notify_after: u64,
    /// Require each record to carry exactly the configured fields
    pub column_count_strict: bool,
    /// Default quoting for fields without their own
    pub quote_all_fields: Option<bool>,
    /// Culture used to render and parse values during a run
    pub culture: Culture,
}

impl Default for RecordPolicy {
    fn default() -> Self {
        RecordPolicy {
            error_mode: ErrorMode::ThrowAndStop,
            ignore_value_mode: IgnoreValueMode::NONE,
            auto_discover_columns: true,
            throw_on_missing_field: true,
            validation_mode: ValidationMode::MEMBER_LEVEL,
            notify_after: 0,
            column_count_strict: false,
            quote_all_fields: None,
            culture: Culture::default(),
        }
    }
}

/// Schema of one record.
#[derive(Debug, Clone, Default)]
pub struct RecordDescriptor {
    /// Record-level policies
    pub policy: RecordPolicy,
    shape: Option<RecordShape>,
    fields: IndexMap<String, FieldDescriptor>,
    record_validators: Vec<RecordValidator>,
    static_meta: IndexMap<String, FieldMeta>,
    validated: bool,
    locked: bool,
}

impl RecordDescriptor {
    /// Create an empty descriptor with default policies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty descriptor with `policy`.
    #[must_use]
    pub fn with_policy(policy: RecordPolicy) -> Self {
        RecordDescriptor {
            policy,
            ..Self::default()
        }
    }

    /// Start a [`DescriptorBuilder`].
    #[must_use]
    pub fn builder() -> DescriptorBuilder {
        DescriptorBuilder::default()
    }

    /// Append a field.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a field with the same name exists or
    /// the schema is already locked.
    pub fn add_field(&mut self, mut field: FieldDescriptor) -> Result<()> {
        if self.locked {
            return Err(RecfmtError::Configuration(format!(
                "Cannot add '{}' field: the record schema is locked",
                field.name()
            )));
        }
        if self.fields.contains_key(field.name()) {
            return Err(RecfmtError::Configuration(format!(
                "Duplicate '{}' field found",
                field.name()
            )));
        }
        if let Some(meta) = self.static_meta.get(field.name()) {
            apply_meta(&mut field, meta);
        }
        self.fields.insert(field.name().to_string(), field);
        self.validated = false;
        Ok(())
    }

    /// Append a record-level validator.
    pub fn add_record_validator(&mut self, validator: RecordValidator) {
        self.record_validators.push(validator);
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl ExactSizeIterator<Item = &FieldDescriptor> + '_ {
        self.fields.values()
    }

    /// Mutable fields, only reachable before the schema locks.
    pub(crate) fn fields_mut(&mut self) -> impl Iterator<Item = &mut FieldDescriptor> + '_ {
        let locked = self.locked;
        self.fields.values_mut().filter(move |_| !locked)
    }

    /// Field by logical name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    /// Logical field names in declaration order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// Record-level validators.
    #[must_use]
    pub fn record_validators(&self) -> &[RecordValidator] {
        &self.record_validators
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no field is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The bound record shape, if any.
    #[must_use]
    pub fn shape(&self) -> Option<RecordShape> {
        self.shape
    }

    /// Bind to a static type in one pass.
    ///
    /// Declared types, defaults, fallbacks, converters and validators of the
    /// table fill the matching configured fields where those are unset, and are
    /// remembered for fields discovered later.
    pub fn bind_static<T>(&mut self, table: &AccessorTable<T>) {
        self.shape = Some(RecordShape::Static(table.type_name()));
        self.static_meta = table
            .names()
            .filter_map(|name| {
                table
                    .accessor(name)
                    .map(|accessor| (name.to_string(), accessor.meta.clone()))
            })
            .collect();
        for field in self.fields.values_mut() {
            if let Some(meta) = self.static_meta.get(field.name()) {
                apply_meta(field, meta);
            }
        }
    }

    /// Bind to open key/value records.
    pub fn bind_dynamic(&mut self) {
        self.shape = Some(RecordShape::Dynamic);
    }

    /// Derive the field list from `names` when no field is configured.
    ///
    /// A statically bound descriptor discovers its table's fields instead of
    /// `names`. `make` builds the format-specific descriptor of each name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the schema is locked.
    pub fn discover_fields<I, F>(&mut self, names: I, mut make: F) -> Result<()>
    where
        I: IntoIterator<Item = String>,
        F: FnMut(&str) -> FieldDescriptor,
    {
        if !self.fields.is_empty() || !self.policy.auto_discover_columns {
            return Ok(());
        }
        let names: Vec<String> = if self.static_meta.is_empty() {
            names.into_iter().collect()
        } else {
            self.static_meta.keys().cloned().collect()
        };
        for name in names {
            if !self.fields.contains_key(&name) {
                self.add_field(make(&name))?;
            }
        }
        tracing::debug!(fields = self.fields.len(), "Discovered record fields");
        Ok(())
    }

    /// Check the schema contract and fill unset field policies from the record policy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty schema, a zero size or a
    /// NUL fill character.
    pub fn validate(&mut self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(RecfmtError::Configuration(
                "No record fields specified.".to_string(),
            ));
        }
        let policy = &self.policy;
        for field in self.fields.values_mut() {
            if field.size == Some(0) {
                return Err(RecfmtError::Configuration(format!(
                    "Size must be greater than zero for '{}' field",
                    field.name()
                )));
            }
            if field.fill_char == Some('\0') {
                return Err(RecfmtError::Configuration(format!(
                    "Invalid '\\0' fill character specified for '{}' field",
                    field.name()
                )));
            }
            field.error_mode.get_or_insert(policy.error_mode);
            field
                .ignore_value_mode
                .get_or_insert(policy.ignore_value_mode);
            if field.quote.is_none() {
                field.quote = policy.quote_all_fields;
            }
        }
        self.validated = true;
        Ok(())
    }

    /// Returns `true` once [`validate`](Self::validate) succeeded.
    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Freeze the field set.
    pub fn lock(&mut self) {
        if !self.locked {
            tracing::debug!(
                fields = self.fields.len(),
                shape = ?self.shape,
                "Record schema locked"
            );
        }
        self.locked = true;
    }

    /// Returns `true` once the schema is frozen.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

fn apply_meta(field: &mut FieldDescriptor, meta: &FieldMeta) {
    if let Some(value_type) = meta.value_type {
        field.infer_value_type(value_type);
    }
    if field.default_value.is_none() {
        field.default_value = meta.default_value.clone();
    }
    if field.fallback_value.is_none() {
        field.fallback_value = meta.fallback_value.clone();
    }
    if field.converters.is_empty() {
        field.converters = meta.converters.clone();
    }
    if field.validators.is_empty() {
        field.validators = meta.validators.clone();
    }
}

/// Fluent builder for [`RecordDescriptor`].
#[derive(Debug, Default)]
pub struct DescriptorBuilder {
    policy: RecordPolicy,
    fields: Vec<FieldDescriptor>,
    record_validators: Vec<RecordValidator>,
}

impl DescriptorBuilder {
    /// Replace every record policy at once.
    #[must_use]
    pub fn policy(mut self, policy: RecordPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the record error mode.
    #[must_use]
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.policy.error_mode = mode;
        self
    }

    /// Set the default suppressed values.
    #[must_use]
    pub fn ignore_value_mode(mut self, mode: IgnoreValueMode) -> Self {
        self.policy.ignore_value_mode = mode;
        self
    }

    /// Enable or disable field discovery from the first record.
    #[must_use]
    pub fn auto_discover_columns(mut self, enabled: bool) -> Self {
        self.policy.auto_discover_columns = enabled;
        self
    }

    /// Enable or disable failing on missing value sources.
    #[must_use]
    pub fn throw_on_missing_field(mut self, enabled: bool) -> Self {
        self.policy.throw_on_missing_field = enabled;
        self
    }

    /// Set when validators run.
    #[must_use]
    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.policy.validation_mode = mode;
        self
    }

    /// Set the progress-notification interval.
    #[must_use]
    pub fn notify_after(mut self, every: u64) -> Self {
        self.policy.notify_after = every;
        self
    }

    /// Enable or disable strict column counts.
    #[must_use]
    pub fn column_count_strict(mut self, strict: bool) -> Self {
        self.policy.column_count_strict = strict;
        self
    }

    /// Set the default quoting of every field.
    #[must_use]
    pub fn quote_all_fields(mut self, quote: bool) -> Self {
        self.policy.quote_all_fields = Some(quote);
        self
    }

    /// Set the culture of the run.
    #[must_use]
    pub fn culture(mut self, culture: Culture) -> Self {
        self.policy.culture = culture;
        self
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a record-level validator.
    #[must_use]
    pub fn record_validator(mut self, validator: RecordValidator) -> Self {
        self.record_validators.push(validator);
        self
    }

    /// Build the descriptor.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if two fields share a name.
    pub fn build(self) -> Result<RecordDescriptor> {
        let mut descriptor = RecordDescriptor::with_policy(self.policy);
        for field in self.fields {
            descriptor.add_field(field)?;
        }
        descriptor.record_validators = self.record_validators;
        Ok(descriptor)
    }
}

/// Closure-free record configuration, loadable with serde.
///
/// ```
/// use recfmt::descriptor::{DescriptorSettings, RecordDescriptor};
///
/// let settings: DescriptorSettings = serde_json::from_str(
///     r#"{"error_mode": "IgnoreAndContinue",
///         "fields": [{"name": "id", "is_attribute": true}, {"name": "name"}]}"#,
/// ).unwrap();
/// let descriptor = RecordDescriptor::try_from(settings).unwrap();
/// assert_eq!(descriptor.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorSettings {
    /// Record policies
    #[serde(flatten)]
    pub policy: RecordPolicy,
    /// Fields in output order
    pub fields: Vec<FieldSettings>,
}

impl TryFrom<DescriptorSettings> for RecordDescriptor {
    type Error = RecfmtError;

    fn try_from(settings: DescriptorSettings) -> Result<Self> {
        settings
            .fields
            .into_iter()
            .map(FieldDescriptor::from)
            .fold(RecordDescriptor::builder().policy(settings.policy), DescriptorBuilder::field)
            .build()
    }
}
