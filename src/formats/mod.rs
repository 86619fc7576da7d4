//! Multi-format support.
//!
//! Every format plugs into the same resolution pipeline and exposes the same
//! traits, so format-agnostic code works unchanged across them.
//!
//! # Supported Formats
//!
//! | Format | Writer | Reader |
//! |--------|--------|--------|
//! | XML | [`XmlWriter`](crate::xml::XmlWriter) | [`XmlReader`](crate::xml_reader::XmlReader) |
//! | Fixed-length | [`FixedLengthWriter`](crate::fixed_length::FixedLengthWriter) | [`FixedLengthReader`](crate::fixed_length::FixedLengthReader) |
//!
//! # Writing Records
//!
//! ```
//! use recfmt::descriptor::RecordDescriptor;
//! use recfmt::formats::FormatWriter;
//! use recfmt::record::DynamicRecord;
//! use recfmt::xml::{XmlOptions, XmlWriter};
//!
//! let mut out = Vec::new();
//! let mut writer = XmlWriter::xml(&mut out, RecordDescriptor::new(), XmlOptions::default());
//! writer.write_record(&DynamicRecord::new().with("id", 1))?;
//! writer.finish()?;
//! assert!(String::from_utf8(out).unwrap().starts_with("<Root>"));
//! # Ok::<(), recfmt::RecfmtError>(())
//! ```

mod traits;

pub use traits::{
    FormatEmitter, FormatReader, FormatReaderExt, FormatWriter, RecordIterator, RenderedField,
    WriteStatus,
};
