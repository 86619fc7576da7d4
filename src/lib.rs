#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! ## Crate Layout
//!
//! | Stage | Modules |
//! |-------|---------|
//! | Schema | [`field`], [`descriptor`], [`record`], [`xml_query`] |
//! | Values | [`value`], [`culture`], [`convert`], [`validation`] |
//! | Pipeline | [`resolve`], [`recovery`], [`normalize`], [`notify`] |
//! | Formats | [`formats`], [`writer`], [`xml`], [`xml_reader`], [`fixed_length`] |
//!
//! Every failure surfaces as a [`RecfmtError`]; see [`error`] for which
//! categories are fatal and which follow the configured error modes.

#[macro_use]
mod macros;

pub mod convert;
pub mod culture;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod fixed_length;
/// Unified reader, writer and emitter traits.
///
/// See the [`formats`] module documentation for the supported formats and
/// how to write format-agnostic code.
pub mod formats;
pub mod normalize;
pub mod notify;
mod reader;
/// Record shapes: dynamic key/value records and static accessor tables.
pub mod record;
pub mod recovery;
pub mod resolve;
pub mod validation;
pub mod value;
pub mod writer;
pub mod xml;
pub mod xml_query;
pub mod xml_reader;

pub use convert::Converter;
pub use culture::Culture;
pub use descriptor::{DescriptorBuilder, DescriptorSettings, RecordDescriptor, RecordPolicy};
pub use error::{RecfmtError, RecoveryStage, Result};
pub use field::{FieldDescriptor, FieldSettings, IgnoreValueMode, Justification};
pub use fixed_length::{FixedLengthOptions, FixedLengthReader, FixedLengthWriter};
pub use formats::{FormatReader, FormatReaderExt, FormatWriter, WriteStatus};
pub use notify::{Decision, FieldDecision, Flow, LineDecision, ReadObserver, WriteObserver};
pub use record::{AccessorTable, DynamicRecord, Record, RecordMut, RecordShape};
pub use recovery::ErrorMode;
pub use validation::{RecordValidator, ValidationMode, Validator};
pub use value::{Value, ValueType};
pub use writer::{RecordWriter, WriterState};
pub use xml::{XmlOptions, XmlWriter};
pub use xml_reader::XmlReader;
