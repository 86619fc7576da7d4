//! Record shapes: the capability the engine reads values from and writes values to.
//!
//! The engine never inspects types at runtime. A record is anything
//! implementing [`Record`] (and [`RecordMut`] for the read direction):
//!
//! - [`DynamicRecord`] is an open, insertion-ordered key/value structure.
//! - [`AccessorTable`] is a table of getter/setter closures for a static Rust
//!   type, built once and bound to instances with [`AccessorTable::bind`].
//!
//! ```
//! use recfmt::record::{AccessorTable, DynamicRecord, Record};
//! use recfmt::value::{Value, ValueType};
//!
//! struct Employee {
//!     id: i64,
//!     name: String,
//! }
//!
//! let table = AccessorTable::<Employee>::new()
//!     .field("id", ValueType::Int, |e| Value::Int(e.id))
//!     .field("name", ValueType::Text, |e| Value::from(e.name.as_str()));
//!
//! let ada = Employee { id: 1, name: "Ada".to_string() };
//! let bound = table.bind(&ada);
//! assert_eq!(bound.get("name"), Some(Value::from("Ada")));
//!
//! let dynamic = DynamicRecord::new().with("id", 1).with("name", "Ada");
//! assert_eq!(dynamic.field_names(), vec!["id", "name"]);
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::convert::Converter;
use crate::error::{RecfmtError, Result};
use crate::validation::Validator;
use crate::value::{Value, ValueType};

/// Whether a record is a statically-typed object or an open key/value structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    /// Static Rust type, identified by its type name
    Static(&'static str),
    /// Open key/value structure
    Dynamic,
}

/// Read access to a record's values by field name.
pub trait Record {
    /// Value of `name`, or `None` when the record has no value source for it.
    fn get(&self, name: &str) -> Option<Value>;

    /// Returns `true` when the record has a value source for `name`.
    fn has_field(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names of all value sources, in declaration or insertion order.
    fn field_names(&self) -> Vec<String>;

    /// Shape of this record.
    fn shape(&self) -> RecordShape;
}

/// Write access to a record's values by field name.
pub trait RecordMut: Record {
    /// Store `value` under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot hold a value named `name`.
    fn set(&mut self, name: &str, value: Value) -> Result<()>;
}

impl<R: Record + ?Sized> Record for &R {
    fn get(&self, name: &str) -> Option<Value> {
        (**self).get(name)
    }

    fn has_field(&self, name: &str) -> bool {
        (**self).has_field(name)
    }

    fn field_names(&self) -> Vec<String> {
        (**self).field_names()
    }

    fn shape(&self) -> RecordShape {
        (**self).shape()
    }
}

impl<R: Record + ?Sized> Record for Box<R> {
    fn get(&self, name: &str) -> Option<Value> {
        (**self).get(name)
    }

    fn has_field(&self, name: &str) -> bool {
        (**self).has_field(name)
    }

    fn field_names(&self) -> Vec<String> {
        (**self).field_names()
    }

    fn shape(&self) -> RecordShape {
        (**self).shape()
    }
}

// ---------------------------------------------------------------------------
// Dynamic records
// ---------------------------------------------------------------------------

/// Open key/value record preserving insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicRecord {
    values: IndexMap<String, Value>,
}

impl DynamicRecord {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    /// Borrow a value.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Remove a value, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the record holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Consume the record into its ordered map.
    #[must_use]
    pub fn into_map(self) -> IndexMap<String, Value> {
        self.values
    }

    /// Build a record from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`RecfmtError::Parser`] if `json` is not an object.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(RecfmtError::Parser(format!(
                "Expected a JSON object for a dynamic record, found {other}"
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DynamicRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        DynamicRecord {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<IndexMap<String, Value>> for DynamicRecord {
    fn from(values: IndexMap<String, Value>) -> Self {
        DynamicRecord { values }
    }
}

impl Record for DynamicRecord {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn has_field(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn shape(&self) -> RecordShape {
        RecordShape::Dynamic
    }
}

impl RecordMut for DynamicRecord {
    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        self.values.insert(name.to_string(), value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Static records
// ---------------------------------------------------------------------------

type Getter<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, Value) -> std::result::Result<(), String> + Send + Sync>;

/// Per-field metadata a static type contributes to a descriptor at bind time.
#[derive(Debug, Clone, Default)]
pub struct FieldMeta {
    /// Declared value type
    pub value_type: Option<ValueType>,
    /// Default value
    pub default_value: Option<Value>,
    /// Fallback value
    pub fallback_value: Option<Value>,
    /// Converters
    pub converters: Vec<Converter>,
    /// Validators
    pub validators: Vec<Validator>,
}

/// Getter, optional setter and metadata for one field of `T`.
pub struct FieldAccessor<T> {
    getter: Getter<T>,
    setter: Option<Setter<T>>,
    /// Metadata copied into the descriptor by `bind_static`
    pub meta: FieldMeta,
}

impl<T> Clone for FieldAccessor<T> {
    fn clone(&self) -> Self {
        FieldAccessor {
            getter: Arc::clone(&self.getter),
            setter: self.setter.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<T> fmt::Debug for FieldAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("settable", &self.setter.is_some())
            .field("meta", &self.meta)
            .finish()
    }
}

/// Accessor table for a static type `T`, built once and reused for every record.
pub struct AccessorTable<T> {
    type_name: &'static str,
    accessors: IndexMap<String, FieldAccessor<T>>,
}

impl<T> Clone for AccessorTable<T> {
    fn clone(&self) -> Self {
        AccessorTable {
            type_name: self.type_name,
            accessors: self.accessors.clone(),
        }
    }
}

impl<T> fmt::Debug for AccessorTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorTable")
            .field("type_name", &self.type_name)
            .field("accessors", &self.accessors)
            .finish()
    }
}

impl<T> Default for AccessorTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AccessorTable<T> {
    /// Create an empty table for `T`.
    #[must_use]
    pub fn new() -> Self {
        AccessorTable {
            type_name: std::any::type_name::<T>(),
            accessors: IndexMap::new(),
        }
    }

    /// Register a read-only field.
    #[must_use]
    pub fn field<G>(mut self, name: impl Into<String>, value_type: ValueType, getter: G) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let accessor = FieldAccessor {
            getter: Arc::new(getter),
            setter: None,
            meta: FieldMeta {
                value_type: Some(value_type),
                ..FieldMeta::default()
            },
        };
        self.accessors.insert(name.into(), accessor);
        self
    }

    /// Attach a setter to a registered field. Unknown names are ignored.
    #[must_use]
    pub fn setter<S>(mut self, name: &str, setter: S) -> Self
    where
        S: Fn(&mut T, Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        if let Some(accessor) = self.accessors.get_mut(name) {
            accessor.setter = Some(Arc::new(setter));
        }
        self
    }

    /// Adjust the metadata of a registered field. Unknown names are ignored.
    #[must_use]
    pub fn meta(mut self, name: &str, update: impl FnOnce(&mut FieldMeta)) -> Self {
        if let Some(accessor) = self.accessors.get_mut(name) {
            update(&mut accessor.meta);
        }
        self
    }

    /// Type name of `T`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Field names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    /// Accessor for `name`.
    #[must_use]
    pub fn accessor(&self, name: &str) -> Option<&FieldAccessor<T>> {
        self.accessors.get(name)
    }

    /// Adapt `target` to [`Record`].
    pub fn bind<'a>(&'a self, target: &'a T) -> Bound<'a, T> {
        Bound {
            table: self,
            target,
        }
    }

    /// Adapt `target` to [`RecordMut`].
    pub fn bind_mut<'a>(&'a self, target: &'a mut T) -> BoundMut<'a, T> {
        BoundMut {
            table: self,
            target,
        }
    }

    fn read(&self, target: &T, name: &str) -> Option<Value> {
        self.accessors.get(name).map(|a| (a.getter)(target))
    }

    fn write(&self, target: &mut T, name: &str, value: Value) -> Result<()> {
        let accessor = self
            .accessors
            .get(name)
            .ok_or_else(|| RecfmtError::MissingField(name.to_string()))?;
        let setter = accessor.setter.as_ref().ok_or_else(|| {
            RecfmtError::Configuration(format!(
                "Field '{name}' of {} has no setter",
                self.type_name
            ))
        })?;
        setter(target, value).map_err(|message| RecfmtError::Conversion {
            field: name.to_string(),
            message,
        })
    }
}

/// A static record bound to its accessor table for reading.
pub struct Bound<'a, T> {
    table: &'a AccessorTable<T>,
    target: &'a T,
}

impl<T> fmt::Debug for Bound<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound")
            .field("type_name", &self.table.type_name)
            .finish_non_exhaustive()
    }
}

impl<T> Record for Bound<'_, T> {
    fn get(&self, name: &str) -> Option<Value> {
        self.table.read(self.target, name)
    }

    fn has_field(&self, name: &str) -> bool {
        self.table.accessors.contains_key(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.table.accessors.keys().cloned().collect()
    }

    fn shape(&self) -> RecordShape {
        RecordShape::Static(self.table.type_name)
    }
}

/// A static record bound to its accessor table for writing.
pub struct BoundMut<'a, T> {
    table: &'a AccessorTable<T>,
    target: &'a mut T,
}

impl<T> fmt::Debug for BoundMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMut")
            .field("type_name", &self.table.type_name)
            .finish_non_exhaustive()
    }
}

impl<T> Record for BoundMut<'_, T> {
    fn get(&self, name: &str) -> Option<Value> {
        self.table.read(self.target, name)
    }

    fn has_field(&self, name: &str) -> bool {
        self.table.accessors.contains_key(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.table.accessors.keys().cloned().collect()
    }

    fn shape(&self) -> RecordShape {
        RecordShape::Static(self.table.type_name)
    }
}

impl<T> RecordMut for BoundMut<'_, T> {
    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        self.table.write(self.target, name, value)
    }
}
