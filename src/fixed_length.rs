//! Fixed-length text: every field at a fixed character span of its line.
//!
//! Each field occupies `[start_index, start_index + size)` of its record line.
//! Values are padded or truncated to their size by the normalizer, gaps between
//! fields are filled with spaces, and every line, the optional header
//! included, ends with the line delimiter.
//!
//! ```
//! use recfmt::descriptor::RecordDescriptor;
//! use recfmt::field::{FieldDescriptor, Justification};
//! use recfmt::fixed_length::{FixedLengthOptions, FixedLengthReader, FixedLengthWriter};
//! use recfmt::formats::FormatReader;
//! use recfmt::record::DynamicRecord;
//! use recfmt::value::Value;
//!
//! let descriptor = || {
//!     RecordDescriptor::builder()
//!         .field(FieldDescriptor::fixed("id", 0, 4).justification(Justification::Right).fill_char('0'))
//!         .field(FieldDescriptor::fixed("name", 4, 6))
//!         .build()
//! };
//!
//! let mut out = Vec::new();
//! FixedLengthWriter::fixed_length(&mut out, descriptor()?, FixedLengthOptions::default())
//!     .write_all(vec![DynamicRecord::new().with("id", 42).with("name", "Ada")])?;
//! assert_eq!(out, b"0042Ada   \n");
//!
//! let mut reader = FixedLengthReader::new(out.as_slice(), descriptor()?, FixedLengthOptions::default());
//! let record = reader.read_record()?.unwrap();
//! assert_eq!(record.value("id"), Some(&Value::from("42")));
//! assert_eq!(record.value("name"), Some(&Value::from("Ada")));
//! # Ok::<(), recfmt::RecfmtError>(())
//! ```

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::culture;
use crate::descriptor::RecordDescriptor;
use crate::error::{RecfmtError, Result};
use crate::field::FieldDescriptor;
use crate::formats::{FormatEmitter, FormatReader, RenderedField};
use crate::normalize::{self, unrender, Escaping, RenderContext};
use crate::notify::{LineDecision, ReadObserver};
use crate::reader::{ReadSession, ReadStep};
use crate::record::{AccessorTable, DynamicRecord, RecordMut};
use crate::value::Value;
use crate::writer::RecordWriter;

/// Document-level fixed-length settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedLengthOptions {
    /// Text terminating every line
    pub line_delimiter: String,
    /// Write, or expect, a header line of external names
    pub has_header: bool,
    /// Prefixes marking comment lines skipped by the reader
    pub comments: Vec<String>,
}

impl Default for FixedLengthOptions {
    fn default() -> Self {
        FixedLengthOptions {
            line_delimiter: "\n".to_string(),
            has_header: false,
            comments: Vec::new(),
        }
    }
}

/// Check the field spans against `options` and return the record width.
///
/// # Errors
///
/// Returns a configuration error for fields without a span, fill characters
/// colliding with the line delimiter or a comment prefix, and overlapping spans.
pub fn layout(descriptor: &RecordDescriptor, options: &FixedLengthOptions) -> Result<usize> {
    if options.line_delimiter.is_empty() {
        return Err(RecfmtError::Configuration(
            "Line delimiter must not be empty".to_string(),
        ));
    }
    let mut spans = Vec::with_capacity(descriptor.len());
    for field in descriptor.fields() {
        let name = field.name();
        let start = field.start_index().ok_or_else(|| {
            RecfmtError::Configuration(format!("Missing start index for '{name}' field"))
        })?;
        let size = field
            .size
            .ok_or_else(|| RecfmtError::Configuration(format!("Missing size for '{name}' field")))?;

        let fill = field.effective_fill_char();
        if options.line_delimiter.contains(fill) {
            return Err(RecfmtError::Configuration(format!(
                "Fill character {fill:?} of '{name}' field is one of the line delimiter characters {:?}",
                options.line_delimiter
            )));
        }
        for comment in &options.comments {
            if comment.contains(fill) {
                return Err(RecfmtError::Configuration(format!(
                    "Comment {comment:?} contains the fill character of '{name}' field"
                )));
            }
            if comment.contains(options.line_delimiter.as_str()) {
                return Err(RecfmtError::Configuration(format!(
                    "Comment {comment:?} contains the line delimiter"
                )));
            }
        }
        let end = start.checked_add(size).ok_or_else(|| {
            RecfmtError::Configuration(format!("Span of '{name}' field overflows the line"))
        })?;
        spans.push((start, end, name));
    }

    spans.sort_by_key(|&(start, end, _)| (start, end));
    for pair in spans.windows(2) {
        let (_, prev_end, prev) = pair[0];
        let (start, _, next) = pair[1];
        if start < prev_end {
            return Err(RecfmtError::Configuration(format!(
                "'{prev}' and '{next}' fields overlap"
            )));
        }
    }
    Ok(spans.iter().map(|&(_, end, _)| end).max().unwrap_or(0))
}

/// Place each text at its field's span of a space-filled line.
fn place<'a>(width: usize, texts: impl Iterator<Item = (usize, &'a str)>) -> String {
    let mut line = vec![' '; width];
    for (start, text) in texts {
        for (slot, c) in line.iter_mut().skip(start).zip(text.chars()) {
            *slot = c;
        }
    }
    line.into_iter().collect()
}

/// [`FormatEmitter`] producing fixed-length lines.
#[derive(Debug, Clone, Default)]
pub struct FixedLengthFormat {
    options: FixedLengthOptions,
    width: usize,
}

impl FixedLengthFormat {
    /// Create an emitter with `options`.
    #[must_use]
    pub fn new(options: FixedLengthOptions) -> Self {
        FixedLengthFormat { options, width: 0 }
    }

    /// Record width, known once the schema is locked.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }
}

impl FormatEmitter for FixedLengthFormat {
    fn escaping(&self) -> Escaping {
        Escaping::None
    }

    fn line_delimiter(&self) -> &str {
        &self.options.line_delimiter
    }

    fn prepare(&mut self, descriptor: &mut RecordDescriptor) -> Result<()> {
        self.width = layout(descriptor, &self.options)?;
        Ok(())
    }

    fn open(&mut self, descriptor: &RecordDescriptor) -> Result<String> {
        if !self.options.has_header {
            return Ok(String::new());
        }
        let ctx = RenderContext::new(&self.options.line_delimiter, Escaping::None).header();
        let names = descriptor
            .fields()
            .map(|field| {
                let text = normalize::render(&field.external_name, field, &ctx)?;
                Ok((field.start_index().unwrap_or_default(), text))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut header = place(
            self.width,
            names.iter().map(|(start, text)| (*start, text.as_str())),
        );
        header.push_str(&self.options.line_delimiter);
        Ok(header)
    }

    fn render_record(&mut self, fields: &[RenderedField<'_>]) -> Result<String> {
        let mut line = place(
            self.width,
            fields.iter().filter_map(|rendered| {
                rendered
                    .field
                    .start_index()
                    .map(|start| (start, rendered.text.as_str()))
            }),
        );
        line.push_str(&self.options.line_delimiter);
        Ok(line)
    }

    fn close(&mut self) -> Result<String> {
        Ok(String::new())
    }
}

/// Writer producing fixed-length lines.
pub type FixedLengthWriter<W> = RecordWriter<W, FixedLengthFormat>;

impl<W: Write> RecordWriter<W, FixedLengthFormat> {
    /// Create a fixed-length writer over `sink`.
    pub fn fixed_length(sink: W, descriptor: RecordDescriptor, options: FixedLengthOptions) -> Self {
        RecordWriter::new(sink, FixedLengthFormat::new(options), descriptor)
    }
}

/// Reader of fixed-length lines.
///
/// Blank lines, comment lines and the header line are skipped. Fields whose
/// span starts beyond the end of a short line have no value source; a span cut
/// short by the line end yields the characters present.
pub struct FixedLengthReader<R: BufRead> {
    source: R,
    options: FixedLengthOptions,
    session: ReadSession,
    width: usize,
    line_number: usize,
    header_pending: bool,
}

impl<R: BufRead> std::fmt::Debug for FixedLengthReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedLengthReader")
            .field("options", &self.options)
            .field("width", &self.width)
            .field("line_number", &self.line_number)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> FixedLengthReader<R> {
    /// Create a reader over `source`.
    pub fn new(source: R, descriptor: RecordDescriptor, options: FixedLengthOptions) -> Self {
        let header_pending = options.has_header;
        FixedLengthReader {
            source,
            options,
            session: ReadSession::new(descriptor),
            width: 0,
            line_number: 0,
            header_pending,
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
    /// Returns an error for I/O failures, configuration problems found when the
    /// schema locks, lines of the wrong width in strict mode, and failures the
    /// error modes do not recover.
    pub fn read_record(&mut self) -> Result<Option<DynamicRecord>> {
        let _culture = culture::enter(self.session.descriptor.policy.culture.clone());
        while self.session.proceed() {
            let Some(line) = self.next_line()? else {
                self.session.finish();
                return Ok(None);
            };
            if line.trim().is_empty() || self.is_comment(&line) {
                continue;
            }
            if !self.session.descriptor.is_locked() {
                self.lock_schema()?;
            }
            if self.header_pending {
                self.header_pending = false;
                continue;
            }

            let index = self.session.next_index();
            let line = match self.session.before_line(index, &line) {
                LineDecision::Proceed => line,
                LineDecision::Replace(replacement) => replacement,
                LineDecision::Skip | LineDecision::Stop => continue,
            };
            let chars: Vec<char> = line.chars().collect();
            if self.session.descriptor.policy.column_count_strict && chars.len() != self.width {
                return Err(RecfmtError::Parser(format!(
                    "Incorrect record length found at line {}. [Expected: {}, Actual: {}]",
                    self.line_number,
                    self.width,
                    chars.len()
                )));
            }

            let step = self.session.process(index, |field| {
                let (Some(start), Some(size)) = (field.start_index(), field.size) else {
                    return Ok(None);
                };
                if start >= chars.len() {
                    return Ok(None);
                }
                let end = start.saturating_add(size).min(chars.len());
                let token: String = chars[start..end].iter().collect();
                Ok(Some(Value::Text(unrender(&token, field, Escaping::None)?)))
            })?;
            match step {
                ReadStep::Record(record) => return Ok(Some(record)),
                ReadStep::Skipped => {},
                ReadStep::Stopped => self.session.finish(),
            }
        }
        Ok(None)
    }

    /// Read the next record into a static record through `table`'s setters.
    ///
    /// Returns `false` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`read_record`](Self::read_record), and setter
    /// failures.
    pub fn read_into<T>(&mut self, table: &AccessorTable<T>, target: &mut T) -> Result<bool> {
        let Some(record) = self.read_record()? else {
            return Ok(false);
        };
        let mut bound = table.bind_mut(target);
        for (name, value) in record.into_map() {
            bound.set(&name, value)?;
        }
        Ok(true)
    }

    fn is_comment(&self, line: &str) -> bool {
        self.options
            .comments
            .iter()
            .any(|prefix| !prefix.is_empty() && line.starts_with(prefix.as_str()))
    }

    fn lock_schema(&mut self) -> Result<()> {
        let options = &self.options;
        let width = &mut self.width;
        self.session.lock_schema(
            Vec::new(),
            |name| FieldDescriptor::new(name),
            |descriptor| {
                *width = layout(descriptor, options)?;
                Ok(())
            },
        )
    }

    /// Next line without its delimiter, or `None` at the end of the source.
    fn next_line(&mut self) -> Result<Option<String>> {
        let delimiter = self.options.line_delimiter.as_bytes();
        let Some(&last) = delimiter.last() else {
            return Err(RecfmtError::Configuration(
                "Line delimiter must not be empty".to_string(),
            ));
        };
        let mut buf = Vec::new();
        let mut terminated = false;
        while self.source.read_until(last, &mut buf)? > 0 {
            if buf.ends_with(delimiter) {
                buf.truncate(buf.len() - delimiter.len());
                terminated = true;
                break;
            }
        }
        if buf.is_empty() && !terminated {
            return Ok(None);
        }
        self.line_number += 1;
        String::from_utf8(buf).map(Some).map_err(|e| {
            RecfmtError::Parser(format!("Invalid UTF-8 at line {}: {e}", self.line_number))
        })
    }
}

impl<R: BufRead> FormatReader for FixedLengthReader<R> {
    fn read_record(&mut self) -> Result<Option<DynamicRecord>> {
        FixedLengthReader::read_record(self)
    }

    fn records_read(&self) -> Option<usize> {
        Some(self.session.records_read())
    }
}
