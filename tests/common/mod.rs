//! Common test helpers shared across the integration suite.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use recfmt::{
    Decision, DynamicRecord, FieldDescriptor, Flow, RecfmtError, Record, RecordDescriptor,
    WriteObserver, XmlOptions,
};

/// XML options without indentation or line breaks.
#[allow(dead_code)]
pub fn compact_xml() -> XmlOptions {
    XmlOptions {
        indent: String::new(),
        line_delimiter: String::new(),
        ..XmlOptions::default()
    }
}

/// An `id` attribute followed by `name` and `city` elements.
#[allow(dead_code)]
pub fn people_descriptor() -> RecordDescriptor {
    RecordDescriptor::builder()
        .field(FieldDescriptor::xml_attribute("id"))
        .field(FieldDescriptor::xml_element("name"))
        .field(FieldDescriptor::xml_element("city"))
        .build()
        .expect("valid descriptor")
}

/// A three-column fixed-length layout, 12 characters wide.
#[allow(dead_code)]
pub fn fixed_descriptor() -> RecordDescriptor {
    RecordDescriptor::builder()
        .field(FieldDescriptor::fixed("id", 0, 3))
        .field(FieldDescriptor::fixed("name", 3, 5))
        .field(FieldDescriptor::fixed("city", 8, 4))
        .build()
        .expect("valid descriptor")
}

/// Creates a person record.
#[allow(dead_code)]
pub fn person(id: i64, name: &str, city: &str) -> DynamicRecord {
    DynamicRecord::new()
        .with("id", id)
        .with("name", name)
        .with("city", city)
}

/// Observer that logs every hook it sees into a shared list.
#[derive(Debug, Default, Clone)]
#[allow(dead_code)]
pub struct EventLog(pub Rc<RefCell<Vec<String>>>);

#[allow(dead_code)]
impl EventLog {
    /// Snapshot of the logged events.
    pub fn events(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    fn push(&self, event: String) {
        self.0.borrow_mut().push(event);
    }
}

impl WriteObserver for EventLog {
    fn begin_write(&mut self, _sink: &mut dyn Write) -> Flow {
        self.push("begin".to_string());
        Flow::Continue
    }

    fn end_write(&mut self, _sink: &mut dyn Write) {
        self.push("end".to_string());
    }

    fn before_record(&mut self, _record: &dyn Record, index: usize) -> Decision {
        self.push(format!("before {index}"));
        Decision::Proceed
    }

    fn record_error(&mut self, _record: &dyn Record, index: usize, cause: &RecfmtError) -> bool {
        self.push(format!("error {index}: {}", cause.field().unwrap_or("-")));
        true
    }
}
