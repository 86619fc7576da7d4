//! XML output: element and attribute framing of records.
//!
//! Each record becomes one node element under a single root element. Fields
//! flagged as attributes render as `name="value"` on the node; every other
//! field renders as a child element in descriptor order:
//!
//! ```text
//! <Root xmlns:a="urn:a">
//!   <Node id="1">
//!     <name>x</name>
//!   </Node>
//! </Root>
//! ```
//!
//! Values are entity-encoded unless they begin with a CDATA marker. Nothing at
//! all is written for a stream without records.
//!
//! # Examples
//!
//! ```
//! use recfmt::descriptor::RecordDescriptor;
//! use recfmt::field::FieldDescriptor;
//! use recfmt::record::DynamicRecord;
//! use recfmt::xml::{XmlOptions, XmlWriter};
//!
//! let descriptor = RecordDescriptor::builder()
//!     .field(FieldDescriptor::xml_element("title"))
//!     .build()?;
//! let options = XmlOptions {
//!     root_name: "Books".to_string(),
//!     node_name: "Book".to_string(),
//!     ..XmlOptions::default()
//! };
//!
//! let mut out = Vec::new();
//! XmlWriter::xml(&mut out, descriptor, options)
//!     .write_all(vec![DynamicRecord::new().with("title", "Dune & more")])?;
//!
//! let xml = String::from_utf8(out).unwrap();
//! assert!(xml.contains("<title>Dune &amp; more</title>"));
//! # Ok::<(), recfmt::RecfmtError>(())
//! ```

use std::fmt::Write as _;
use std::io::Write;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::descriptor::RecordDescriptor;
use crate::error::{RecfmtError, Result};
use crate::field::FieldDescriptor;
use crate::formats::{FormatEmitter, RenderedField};
use crate::normalize::Escaping;
use crate::writer::RecordWriter;
use crate::xml_query::is_valid_name;

const RESERVED_PREFIX: &str = "xml";

/// Document-level XML settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XmlOptions {
    /// Name of the root element
    pub root_name: String,
    /// Name of the element wrapping each record
    pub node_name: String,
    /// Indentation unit
    pub indent: String,
    /// Text written between lines
    pub line_delimiter: String,
    /// Namespace prefix to URI bindings, declared on the root in insertion order
    pub namespaces: IndexMap<String, String>,
}

impl Default for XmlOptions {
    fn default() -> Self {
        XmlOptions {
            root_name: "Root".to_string(),
            node_name: "Node".to_string(),
            indent: "  ".to_string(),
            line_delimiter: "\n".to_string(),
            namespaces: IndexMap::new(),
        }
    }
}

impl XmlOptions {
    /// Bind `prefix` to `uri`.
    #[must_use]
    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    /// Namespace declarations of the root element, each preceded by a space.
    ///
    /// The reserved `xml` prefix is never declared.
    #[must_use]
    pub fn namespace_declarations(&self) -> String {
        self.namespaces
            .iter()
            .filter(|(prefix, _)| prefix.as_str() != RESERVED_PREFIX)
            .fold(String::new(), |mut out, (prefix, uri)| {
                let _ = write!(out, " xmlns:{prefix}=\"{uri}\"");
                out
            })
    }

    /// Check the root and node names.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for names that are not valid XML names.
    pub fn validate(&self) -> Result<()> {
        for (what, name) in [("root", &self.root_name), ("node", &self.node_name)] {
            if !is_valid_name(name) {
                return Err(RecfmtError::Configuration(format!(
                    "Invalid {what} element name '{name}'"
                )));
            }
        }
        Ok(())
    }
}

/// Turn every field into an XML field and compile its query.
///
/// # Errors
///
/// Returns a configuration error for invalid external names and for missing
/// or malformed query expressions.
pub(crate) fn prepare_fields(descriptor: &mut RecordDescriptor) -> Result<()> {
    for field in descriptor.fields_mut() {
        field.ensure_xml();
        if !is_valid_name(&field.external_name) {
            return Err(RecfmtError::Configuration(format!(
                "Invalid XML name '{}' for '{}' field",
                field.external_name,
                field.name()
            )));
        }
        if let Some(settings) = field.xml() {
            settings.compiled_query().map_err(|e| {
                RecfmtError::Configuration(format!("'{}' field: {e}", field.name()))
            })?;
        }
    }
    Ok(())
}

/// [`FormatEmitter`] producing XML.
#[derive(Debug, Clone, Default)]
pub struct XmlFormat {
    options: XmlOptions,
}

impl XmlFormat {
    /// Create an emitter with `options`.
    #[must_use]
    pub fn new(options: XmlOptions) -> Self {
        XmlFormat { options }
    }

    /// Document settings.
    #[must_use]
    pub fn options(&self) -> &XmlOptions {
        &self.options
    }
}

impl FormatEmitter for XmlFormat {
    fn escaping(&self) -> Escaping {
        Escaping::Xml
    }

    fn line_delimiter(&self) -> &str {
        &self.options.line_delimiter
    }

    fn discovered_field(&self, name: &str) -> FieldDescriptor {
        FieldDescriptor::xml_element(name)
    }

    fn prepare(&mut self, descriptor: &mut RecordDescriptor) -> Result<()> {
        self.options.validate()?;
        prepare_fields(descriptor)
    }

    fn open(&mut self, _descriptor: &RecordDescriptor) -> Result<String> {
        Ok(format!(
            "<{}{}>",
            self.options.root_name,
            self.options.namespace_declarations()
        ))
    }

    fn render_record(&mut self, fields: &[RenderedField<'_>]) -> Result<String> {
        let XmlOptions {
            node_name,
            indent,
            line_delimiter: eol,
            ..
        } = &self.options;

        let mut out = format!("{eol}{indent}<{node_name}");
        for rendered in fields.iter().filter(|r| r.field.is_attribute()) {
            let _ = write!(out, " {}=\"{}\"", rendered.field.external_name, rendered.text);
        }
        out.push('>');
        out.push_str(eol);
        for rendered in fields.iter().filter(|r| !r.field.is_attribute()) {
            let name = &rendered.field.external_name;
            let _ = write!(out, "{indent}{indent}<{name}>{}</{name}>{eol}", rendered.text);
        }
        let _ = write!(out, "{indent}</{node_name}>");
        Ok(out)
    }

    fn close(&mut self) -> Result<String> {
        Ok(format!(
            "{}</{}>",
            self.options.line_delimiter, self.options.root_name
        ))
    }
}

/// Writer producing XML.
pub type XmlWriter<W> = RecordWriter<W, XmlFormat>;

impl<W: Write> RecordWriter<W, XmlFormat> {
    /// Create an XML writer over `sink`.
    pub fn xml(sink: W, descriptor: RecordDescriptor, options: XmlOptions) -> Self {
        RecordWriter::new(sink, XmlFormat::new(options), descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::IgnoreValueMode;
    use crate::record::DynamicRecord;

    fn compact() -> XmlOptions {
        XmlOptions {
            indent: String::new(),
            line_delimiter: String::new(),
            ..XmlOptions::default()
        }
    }

    fn write(descriptor: RecordDescriptor, options: XmlOptions, records: Vec<DynamicRecord>) -> String {
        let mut out = Vec::new();
        XmlWriter::xml(&mut out, descriptor, options)
            .write_all(records)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_pretty_layout() {
        let descriptor = RecordDescriptor::builder()
            .field(FieldDescriptor::xml_attribute("id"))
            .field(FieldDescriptor::xml_element("name"))
            .field(FieldDescriptor::xml_element("city"))
            .build()
            .unwrap();
        let records = vec![
            DynamicRecord::new().with("id", 1).with("name", "Ada").with("city", "London"),
            DynamicRecord::new().with("id", 2).with("name", "Bob").with("city", "Paris"),
        ];
        let expected = "<Root>\n  <Node id=\"1\">\n    <name>Ada</name>\n    <city>London</city>\n  </Node>\n  <Node id=\"2\">\n    <name>Bob</name>\n    <city>Paris</city>\n  </Node>\n</Root>";
        assert_eq!(write(descriptor, XmlOptions::default(), records), expected);
    }

    #[test]
    fn test_discovered_fields_are_elements() {
        let records = vec![DynamicRecord::new().with("a", 1).with("b", true)];
        assert_eq!(
            write(RecordDescriptor::new(), compact(), records),
            "<Root><Node><a>1</a><b>true</b></Node></Root>"
        );
    }

    #[test]
    fn test_generic_fields_become_elements() {
        let descriptor = RecordDescriptor::builder()
            .field(FieldDescriptor::new("title").external_name("Title"))
            .build()
            .unwrap();
        let records = vec![DynamicRecord::new().with("title", "x")];
        assert_eq!(
            write(descriptor, compact(), records),
            "<Root><Node><Title>x</Title></Node></Root>"
        );
    }

    #[test]
    fn test_escaping_and_cdata() {
        let descriptor = RecordDescriptor::builder()
            .field(FieldDescriptor::xml_attribute("note"))
            .field(FieldDescriptor::xml_element("body"))
            .build()
            .unwrap();
        let records = vec![DynamicRecord::new()
            .with("note", "a \"b\" & c")
            .with("body", "<![CDATA[<b>raw</b>]]>")];
        assert_eq!(
            write(descriptor, compact(), records),
            "<Root><Node note=\"a &quot;b&quot; &amp; c\"><body><![CDATA[<b>raw</b>]]></body></Node></Root>"
        );
    }

    #[test]
    fn test_namespace_declarations_skip_reserved_prefix() {
        let options = XmlOptions::default()
            .namespace("a", "urn:a")
            .namespace("xml", "urn:ignored")
            .namespace("b", "urn:b");
        assert_eq!(
            options.namespace_declarations(),
            r#" xmlns:a="urn:a" xmlns:b="urn:b""#
        );
        let only_reserved = XmlOptions::default().namespace("xml", "urn:ignored");
        assert_eq!(only_reserved.namespace_declarations(), "");
    }

    #[test]
    fn test_ignored_values_are_not_written() {
        let descriptor = RecordDescriptor::builder()
            .ignore_value_mode(IgnoreValueMode::NULL | IgnoreValueMode::EMPTY)
            .field(FieldDescriptor::xml_attribute("id"))
            .field(FieldDescriptor::xml_element("name"))
            .build()
            .unwrap();
        let records = vec![DynamicRecord::new().with("id", "").with("name", "x")];
        assert_eq!(
            write(descriptor, compact(), records),
            "<Root><Node><name>x</name></Node></Root>"
        );
    }

    #[test]
    fn test_invalid_names_are_configuration_errors() {
        let descriptor = RecordDescriptor::builder()
            .field(FieldDescriptor::xml_element("a").external_name("1bad"))
            .build()
            .unwrap();
        let mut out = Vec::new();
        let err = XmlWriter::xml(&mut out, descriptor, compact())
            .write_all(vec![DynamicRecord::new().with("a", 1)])
            .unwrap_err();
        assert!(matches!(err, RecfmtError::Configuration(_)));
        assert!(out.is_empty());

        let options = XmlOptions {
            root_name: "bad root".to_string(),
            ..XmlOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_options_from_json() {
        let options: XmlOptions = serde_json::from_str(
            r#"{"root_name": "Items", "namespaces": {"x": "urn:x"}}"#,
        )
        .unwrap();
        assert_eq!(options.root_name, "Items");
        assert_eq!(options.node_name, "Node");
        assert_eq!(options.namespace_declarations(), r#" xmlns:x="urn:x""#);
    }
}
