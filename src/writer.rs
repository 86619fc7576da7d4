//! The format-independent writer state machine.
//!
//! [`RecordWriter`] drives the per-record loop for any [`FormatEmitter`]:
//!
//! ```text
//! NotStarted --first record--> SchemaLocked --record--> PerRecord --finish--> Closed
//! ```
//!
//! On the first record that passes the predicate the writer discovers fields
//! (when none are configured), validates the descriptor, writes the opening
//! boundary and locks the schema. Each record is then resolved field by field,
//! normalized, framed by the emitter and written to the sink before the next
//! one is requested, so memory use does not grow with the stream.
//!
//! A run that never locks the schema writes nothing at all: not even the
//! opening and closing boundaries.
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
//!     .field(FieldDescriptor::xml_attribute("id"))
//!     .field(FieldDescriptor::xml_element("name"))
//!     .build()?;
//! let options = XmlOptions {
//!     indent: String::new(),
//!     line_delimiter: String::new(),
//!     ..XmlOptions::default()
//! };
//!
//! let mut out = Vec::new();
//! let mut writer = XmlWriter::xml(&mut out, descriptor, options);
//! writer.write_all(vec![DynamicRecord::new().with("id", 1).with("name", "x")])?;
//!
//! assert_eq!(
//!     String::from_utf8(out).unwrap(),
//!     r#"<Root><Node id="1"><name>x</name></Node></Root>"#
//! );
//! # Ok::<(), recfmt::RecfmtError>(())
//! ```

use std::fmt;
use std::io::Write;

use indexmap::IndexMap;

use crate::culture;
use crate::descriptor::RecordDescriptor;
use crate::error::{RecfmtError, Result};
use crate::formats::{FormatEmitter, FormatWriter, RenderedField};
use crate::normalize::{self, RenderContext};
use crate::notify::{guard, Decision, Flow, WriteFieldHooks, WriteObserver};
use crate::record::{Record, RecordShape};
use crate::recovery::recover_record;
use crate::resolve::{resolve_field, FieldOutcome};
use crate::validation::{validate_object, ValidationMode};
use crate::value::Value;

pub use crate::formats::WriteStatus;

/// Lifecycle state of a [`RecordWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No record has been accepted yet
    NotStarted,
    /// The schema is locked and the opening boundary written
    SchemaLocked,
    /// At least one record has been written
    PerRecord,
    /// The closing boundary has been written
    Closed,
}

type Predicate = Box<dyn Fn(&dyn Record) -> bool>;

/// Writer for any [`FormatEmitter`].
pub struct RecordWriter<W: Write, E: FormatEmitter> {
    sink: W,
    emitter: E,
    descriptor: RecordDescriptor,
    state: WriterState,
    index: usize,
    records_written: usize,
    begun: bool,
    stopped: bool,
    observer: Option<Box<dyn WriteObserver>>,
    predicate: Option<Predicate>,
}

impl<W: Write, E: FormatEmitter> fmt::Debug for RecordWriter<W, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordWriter")
            .field("emitter", &self.emitter)
            .field("state", &self.state)
            .field("index", &self.index)
            .field("records_written", &self.records_written)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl<W: Write, E: FormatEmitter> RecordWriter<W, E> {
    /// Create a writer over `sink`.
    pub fn new(sink: W, emitter: E, descriptor: RecordDescriptor) -> Self {
        RecordWriter {
            sink,
            emitter,
            descriptor,
            state: WriterState::NotStarted,
            index: 0,
            records_written: 0,
            begun: false,
            stopped: false,
            observer: None,
            predicate: None,
        }
    }

    /// Attach an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl WriteObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Only write records accepted by `predicate`.
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Fn(&dyn Record) -> bool + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// The descriptor driving this writer.
    #[must_use]
    pub fn descriptor(&self) -> &RecordDescriptor {
        &self.descriptor
    }

    /// Returns `true` once a hook stopped the run.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Borrow the sink.
    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Consume the writer, returning the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Write every record of `records`, then close the document.
    ///
    /// Records are pulled one at a time. The begin hook runs before the first
    /// record is requested; a stop from any hook ends the loop early.
    ///
    /// # Errors
    ///
    /// Returns the first error that is not recovered. The document is left
    /// unclosed in that case.
    pub fn write_all<I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Record,
    {
        let _culture = culture::enter(self.descriptor.policy.culture.clone());
        if self.begin() {
            for record in records {
                if self.write(&record)? == WriteStatus::Stopped {
                    break;
                }
            }
        }
        self.finish()?;
        Ok(self.records_written)
    }

    /// Write one record.
    ///
    /// # Errors
    ///
    /// Returns an error after [`finish`](Self::finish), for fatal failures, and
    /// for failures the error modes do not recover.
    pub fn write(&mut self, record: &dyn Record) -> Result<WriteStatus> {
        if self.state == WriterState::Closed {
            return Err(RecfmtError::Format("Writer already finished".to_string()));
        }
        if self.stopped || !self.begin() {
            return Ok(WriteStatus::Stopped);
        }
        let _culture = culture::enter(self.descriptor.policy.culture.clone());
        self.index += 1;
        let index = self.index;

        let status = self.process(record, index)?;
        tracing::trace!(index, status = ?status, "Processed record");
        if !self.stopped {
            self.notify_progress(index);
        }
        Ok(status)
    }

    /// Write the closing boundary (only if the schema ever locked) and flush.
    ///
    /// Calling `finish` more than once has no further effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the closing boundary or the flush fails.
    pub fn finish(&mut self) -> Result<()> {
        if self.state == WriterState::Closed {
            return Ok(());
        }
        if self.state != WriterState::NotStarted {
            let closing = self.emitter.close()?;
            self.sink.write_all(closing.as_bytes())?;
        }
        if self.begun {
            if let Some(observer) = self.observer.as_mut() {
                let sink = &mut self.sink;
                guard("end_write", (), || observer.end_write(sink));
            }
        }
        self.sink.flush()?;
        self.state = WriterState::Closed;
        tracing::debug!(records = self.records_written, "Writer closed");
        Ok(())
    }

    /// Fire the begin hook once. Returns `false` if the run is stopped.
    fn begin(&mut self) -> bool {
        if !self.begun {
            self.begun = true;
            if let Some(observer) = self.observer.as_mut() {
                let sink = &mut self.sink;
                if guard("begin_write", Flow::Stop, || observer.begin_write(sink)) == Flow::Stop {
                    self.stopped = true;
                }
            }
        }
        !self.stopped
    }

    fn process(&mut self, record: &dyn Record, index: usize) -> Result<WriteStatus> {
        if let Some(predicate) = &self.predicate {
            if !predicate(record) {
                return Ok(WriteStatus::Skipped);
            }
        }
        if self.state == WriterState::NotStarted {
            self.lock_schema(record)?;
        }
        if self.descriptor.policy.column_count_strict {
            check_columns(&self.descriptor, record, index)?;
        }

        let decision = match self.observer.as_mut() {
            Some(observer) => guard("before_record", Decision::Stop, || {
                observer.before_record(record, index)
            }),
            None => Decision::Proceed,
        };
        match decision {
            Decision::Proceed => {},
            Decision::Skip => return Ok(WriteStatus::Skipped),
            Decision::Stop => {
                self.stopped = true;
                return Ok(WriteStatus::Stopped);
            },
        }

        let text = match self.render(record, index) {
            Ok(Some(text)) => text,
            Ok(None) => {
                self.stopped = true;
                return Ok(WriteStatus::Stopped);
            },
            Err(cause) => {
                let observer = &mut self.observer;
                recover_record(self.descriptor.policy.error_mode, cause, |cause| {
                    match observer.as_mut() {
                        Some(observer) => guard("record_error", false, || {
                            observer.record_error(record, index, cause)
                        }),
                        None => false,
                    }
                })?;
                return Ok(WriteStatus::Skipped);
            },
        };

        self.sink.write_all(text.as_bytes())?;
        self.records_written += 1;
        self.state = WriterState::PerRecord;

        if let Some(observer) = self.observer.as_mut() {
            let flow = guard("after_record", Flow::Stop, || {
                observer.after_record(record, index, &text)
            });
            if flow == Flow::Stop {
                self.stopped = true;
            }
        }
        Ok(WriteStatus::Written)
    }

    fn lock_schema(&mut self, record: &dyn Record) -> Result<()> {
        if self.descriptor.shape().is_none() && record.shape() == RecordShape::Dynamic {
            self.descriptor.bind_dynamic();
        }
        let emitter = &mut self.emitter;
        self.descriptor
            .discover_fields(record.field_names(), |name| emitter.discovered_field(name))?;
        self.descriptor.validate()?;
        emitter.prepare(&mut self.descriptor)?;
        let opening = emitter.open(&self.descriptor)?;
        self.sink.write_all(opening.as_bytes())?;
        self.descriptor.lock();
        self.state = WriterState::SchemaLocked;
        Ok(())
    }

    /// Resolve, validate, normalize and frame one record.
    ///
    /// Returns `None` when a field hook stopped the run; the partial record is
    /// discarded.
    fn render(&mut self, record: &dyn Record, index: usize) -> Result<Option<String>> {
        let descriptor = &self.descriptor;
        let emitter = &mut self.emitter;
        let mut hooks = WriteFieldHooks {
            observer: self.observer.as_mut(),
            record,
        };

        let mut resolved: Vec<(_, Value)> = Vec::with_capacity(descriptor.len());
        for field in descriptor.fields() {
            match resolve_field(record, field, &descriptor.policy, index, &mut hooks)? {
                FieldOutcome::Resolved(value) => resolved.push((field, value)),
                FieldOutcome::Omitted => {},
                FieldOutcome::Stop => return Ok(None),
            }
        }

        if descriptor
            .policy
            .validation_mode
            .contains(ValidationMode::OBJECT_LEVEL)
        {
            let values: IndexMap<String, Value> = resolved
                .iter()
                .map(|(field, value)| (field.name().to_string(), value.clone()))
                .collect();
            validate_object(descriptor, &values)?;
        }

        let ctx = RenderContext::new(emitter.line_delimiter(), emitter.escaping());
        let rendered = resolved
            .iter()
            .map(|(field, value)| {
                Ok(RenderedField {
                    field,
                    text: normalize::render(&value.to_text(), field, &ctx)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        emitter.render_record(&rendered).map(Some)
    }

    fn notify_progress(&mut self, index: usize) {
        let every = self.descriptor.policy.notify_after;
        let due = every > 0 && u64::try_from(index).is_ok_and(|i| i % every == 0);
        if !due {
            return;
        }
        if let Some(observer) = self.observer.as_mut() {
            if guard("records_written", Flow::Stop, || observer.records_written(index))
                == Flow::Stop
            {
                self.stopped = true;
            }
        }
    }
}

/// Strict mode: the record must carry exactly the configured fields.
fn check_columns(descriptor: &RecordDescriptor, record: &dyn Record, index: usize) -> Result<()> {
    let actual = record.field_names().len();
    if actual != descriptor.len() {
        return Err(RecfmtError::Parser(format!(
            "Incorrect number of fields found in record {index}. [Expected: {}, Actual: {actual}]",
            descriptor.len()
        )));
    }
    for field in descriptor.fields() {
        let present = std::iter::once(field.name())
            .chain(field.aliases.iter().map(String::as_str))
            .any(|name| record.has_field(name));
        if !present {
            return Err(RecfmtError::Parser(format!(
                "No matching value source found in record {index} for '{}' field",
                field.name()
            )));
        }
    }
    Ok(())
}

impl<W: Write, E: FormatEmitter> FormatWriter for RecordWriter<W, E> {
    fn write_record(&mut self, record: &dyn Record) -> Result<WriteStatus> {
        self.write(record)
    }

    fn finish(&mut self) -> Result<()> {
        RecordWriter::finish(self)
    }

    fn records_written(&self) -> Option<usize> {
        Some(self.records_written)
    }
}
