//! Streaming XML input.
//!
//! [`XmlReader`] pulls events from a quick-xml parser and materializes one
//! node element at a time into an [`XmlNode`]. Each field's compiled query
//! locates its raw text inside the node; the text then goes through the same
//! resolution pipeline as written values, in the read direction.
//!
//! # Examples
//!
//! ```
//! use recfmt::descriptor::RecordDescriptor;
//! use recfmt::formats::FormatReader;
//! use recfmt::value::Value;
//! use recfmt::xml::XmlOptions;
//! use recfmt::xml_reader::XmlReader;
//!
//! let xml = r#"<Root>
//!   <Node id="7"><name>Ada</name></Node>
//! </Root>"#;
//!
//! let mut reader = XmlReader::new(xml.as_bytes(), RecordDescriptor::new(), XmlOptions::default());
//! let record = reader.read_record()?.unwrap();
//! assert_eq!(record.value("id"), Some(&Value::from("7")));
//! assert_eq!(record.value("name"), Some(&Value::from("Ada")));
//! assert!(reader.read_record()?.is_none());
//! # Ok::<(), recfmt::RecfmtError>(())
//! ```

use std::io::BufRead;

use indexmap::IndexSet;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::culture;
use crate::descriptor::RecordDescriptor;
use crate::error::{RecfmtError, Result};
use crate::field::FieldDescriptor;
use crate::formats::FormatReader;
use crate::normalize::{unrender, Escaping};
use crate::notify::ReadObserver;
use crate::reader::{ReadSession, ReadStep};
use crate::record::DynamicRecord;
use crate::value::Value;
use crate::xml::{prepare_fields, XmlOptions};
use crate::xml_query::XmlNode;

/// Reader for the XML layout written by [`XmlWriter`](crate::xml::XmlWriter).
///
/// Every element named [`XmlOptions::node_name`] is one record, wherever it
/// appears below the root. When no field is configured, the attributes and
/// child elements of the first node become the fields.
pub struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    options: XmlOptions,
    session: ReadSession,
}

impl<R: BufRead> std::fmt::Debug for XmlReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlReader")
            .field("options", &self.options)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

fn parse_error(e: impl std::fmt::Display) -> RecfmtError {
    RecfmtError::Parser(format!("XML parse error: {e}"))
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(parse_error)
}

fn start_node(start: &BytesStart<'_>) -> Result<XmlNode> {
    let mut node = XmlNode::new(utf8(start.name().as_ref())?);
    for attr in start.attributes() {
        let attr = attr.map_err(parse_error)?;
        let key = utf8(attr.key.as_ref())?;
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr.unescape_value().map_err(parse_error)?;
        node.attributes.insert(key, value.into_owned());
    }
    Ok(node)
}

/// Drop indentation-only text of elements that have children.
fn close_node(mut node: XmlNode) -> XmlNode {
    if !node.children.is_empty() && node.text.trim().is_empty() {
        node.text.clear();
    }
    node
}

impl<R: BufRead> XmlReader<R> {
    /// Create a reader over `source`.
    pub fn new(source: R, descriptor: RecordDescriptor, options: XmlOptions) -> Self {
        XmlReader {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            options,
            session: ReadSession::new(descriptor),
        }
    }

    /// Attach an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl ReadObserver + 'static) -> Self {
        self.session.set_observer(Box::new(observer));
        self
    }

    /// The descriptor driving this reader.
    #[must_use]
    pub fn descriptor(&self) -> &RecordDescriptor {
        &self.session.descriptor
    }

    /// Read the next record.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed XML, configuration problems found when
    /// the schema locks, and failures the error modes do not recover.
    pub fn read_record(&mut self) -> Result<Option<DynamicRecord>> {
        let _culture = culture::enter(self.session.descriptor.policy.culture.clone());
        while self.session.proceed() {
            let Some(node) = self.next_node()? else {
                self.session.finish();
                return Ok(None);
            };
            let index = self.session.next_index();
            if !self.session.descriptor.is_locked() {
                self.lock_schema(&node)?;
            }
            let step = self.session.process(index, |field| {
                let Some(settings) = field.xml() else {
                    return Ok(None);
                };
                match settings.compiled_query()?.evaluate(&node) {
                    Some(text) => Ok(Some(Value::Text(unrender(text, field, Escaping::None)?))),
                    None => Ok(None),
                }
            })?;
            match step {
                ReadStep::Record(record) => return Ok(Some(record)),
                ReadStep::Skipped => {},
                ReadStep::Stopped => self.session.finish(),
            }
        }
        Ok(None)
    }

    fn lock_schema(&mut self, first: &XmlNode) -> Result<()> {
        let attributes: IndexSet<&str> = first.attributes.keys().map(String::as_str).collect();
        let mut names: IndexSet<String> = first.attributes.keys().cloned().collect();
        names.extend(first.children.iter().map(|child| child.name.clone()));

        let options = &self.options;
        self.session.lock_schema(
            names.into_iter().collect(),
            |name| {
                if attributes.contains(name) {
                    FieldDescriptor::xml_attribute(name)
                } else {
                    FieldDescriptor::xml_element(name)
                }
            },
            |descriptor| {
                options.validate()?;
                prepare_fields(descriptor)
            },
        )
    }

    /// Parse events up to the end of the next node element.
    fn next_node(&mut self) -> Result<Option<XmlNode>> {
        let mut stack: Vec<XmlNode> = Vec::new();
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(parse_error)?;
            match event {
                Event::Start(start) => {
                    if !stack.is_empty() || start.name().as_ref() == self.options.node_name.as_bytes() {
                        stack.push(start_node(&start)?);
                    }
                },
                Event::Empty(start) => {
                    let is_node = start.name().as_ref() == self.options.node_name.as_bytes();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(start_node(&start)?);
                    } else if is_node {
                        return start_node(&start).map(Some);
                    }
                },
                Event::End(_) => {
                    if let Some(node) = stack.pop() {
                        let node = close_node(node);
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(node),
                            None => return Ok(Some(node)),
                        }
                    }
                },
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape().map_err(parse_error)?);
                    }
                },
                Event::CData(cdata) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&utf8(&cdata.into_inner())?);
                    }
                },
                Event::Eof => {
                    if stack.is_empty() {
                        return Ok(None);
                    }
                    return Err(RecfmtError::Parser(format!(
                        "Unexpected end of XML inside '{}' element",
                        self.options.node_name
                    )));
                },
                _ => {},
            }
        }
    }
}

impl<R: BufRead> FormatReader for XmlReader<R> {
    fn read_record(&mut self) -> Result<Option<DynamicRecord>> {
        XmlReader::read_record(self)
    }

    fn records_read(&self) -> Option<usize> {
        Some(self.session.records_read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Converter;
    use crate::notify::{Decision, FieldDecision};
    use crate::recovery::ErrorMode;
    use crate::value::ValueType;

    fn read_all(xml: &str, descriptor: RecordDescriptor) -> Result<Vec<DynamicRecord>> {
        XmlReader::new(xml.as_bytes(), descriptor, XmlOptions::default()).read_all()
    }

    #[test]
    fn test_discovers_attributes_and_elements() {
        let xml = r#"<Root xmlns:a="urn:a"><Node id="1"><name>x</name></Node><Node id="2"><name>y</name></Node></Root>"#;
        let mut reader = XmlReader::new(xml.as_bytes(), RecordDescriptor::new(), XmlOptions::default());
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].value("name"), Some(&Value::from("y")));
        assert!(reader.descriptor().field("id").unwrap().is_attribute());
        assert!(!reader.descriptor().field("name").unwrap().is_attribute());
        assert_eq!(reader.records_read(), Some(2));
    }

    #[test]
    fn test_entities_cdata_and_queries() {
        let xml = r#"<Root>
  <Node>
    <info><title>A &amp; B</title></info>
    <body><![CDATA[<b>raw</b>]]></body>
  </Node>
</Root>"#;
        let descriptor = RecordDescriptor::builder()
            .field(FieldDescriptor::xml_element("title").query_expression("info/title"))
            .field(FieldDescriptor::xml_element("body"))
            .build()
            .unwrap();
        let records = read_all(xml, descriptor).unwrap();
        assert_eq!(records[0].value("title"), Some(&Value::from("A & B")));
        assert_eq!(records[0].value("body"), Some(&Value::from("<b>raw</b>")));
    }

    #[test]
    fn test_declared_types_are_coerced() {
        let xml = r#"<Root><Node><qty> 12 </qty></Node></Root>"#;
        let descriptor = RecordDescriptor::builder()
            .field(
                FieldDescriptor::xml_element("qty")
                    .converter(Converter::trim())
                    .value_type(ValueType::Int),
            )
            .build()
            .unwrap();
        let records = read_all(xml, descriptor).unwrap();
        assert_eq!(records[0].value("qty"), Some(&Value::Int(12)));
    }

    #[test]
    fn test_conversion_failure_uses_fallback() {
        let xml = r#"<Root><Node><qty>many</qty></Node></Root>"#;
        let descriptor = RecordDescriptor::builder()
            .error_mode(ErrorMode::ReportAndContinue)
            .field(
                FieldDescriptor::xml_element("qty")
                    .value_type(ValueType::Int)
                    .fallback_value(0),
            )
            .build()
            .unwrap();
        let records = read_all(xml, descriptor).unwrap();
        assert_eq!(records[0].value("qty"), Some(&Value::Int(0)));
    }

    #[test]
    fn test_missing_element() {
        let xml = r#"<Root><Node><a>1</a></Node></Root>"#;
        let strict = RecordDescriptor::builder()
            .field(FieldDescriptor::xml_element("a"))
            .field(FieldDescriptor::xml_element("b"))
            .build()
            .unwrap();
        assert!(matches!(
            read_all(xml, strict),
            Err(RecfmtError::MissingField(ref name)) if name == "b"
        ));

        let lenient = RecordDescriptor::builder()
            .throw_on_missing_field(false)
            .field(FieldDescriptor::xml_element("a"))
            .field(FieldDescriptor::xml_element("b").default_value("none"))
            .build()
            .unwrap();
        let records = read_all(xml, lenient).unwrap();
        assert_eq!(records[0].value("b"), Some(&Value::from("none")));
    }

    #[test]
    fn test_truncated_document_is_parser_error() {
        let xml = r#"<Root><Node><a>1</a>"#;
        assert!(matches!(
            read_all(xml, RecordDescriptor::new()),
            Err(RecfmtError::Parser(_))
        ));
    }

    #[test]
    fn test_empty_root_reads_nothing() {
        assert!(read_all("<Root/>", RecordDescriptor::new()).unwrap().is_empty());
        assert!(read_all("", RecordDescriptor::new()).unwrap().is_empty());
    }

    #[test]
    fn test_hooks_skip_and_replace() {
        struct Hooks;
        impl ReadObserver for Hooks {
            fn before_record(&mut self, index: usize) -> Decision {
                if index == 1 {
                    Decision::Skip
                } else {
                    Decision::Proceed
                }
            }

            fn before_field(&mut self, _index: usize, field: &str, value: &Value) -> FieldDecision {
                if field == "a" {
                    FieldDecision::Replace(Value::from(format!("<{value}>")))
                } else {
                    FieldDecision::Proceed
                }
            }
        }
        let xml = r#"<Root><Node a="1"/><Node a="2"/></Root>"#;
        let records = XmlReader::new(xml.as_bytes(), RecordDescriptor::new(), XmlOptions::default())
            .with_observer(Hooks)
            .read_all()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value("a"), Some(&Value::from("<2>")));
    }
}
