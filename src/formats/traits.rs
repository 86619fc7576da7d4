//! Format reader, writer and emitter traits.
//!
//! This module defines the seams every format implements:
//!
//! - [`FormatEmitter`] supplies the structural text of a format (document
//!   boundaries, record framing) to the shared
//!   [`RecordWriter`](crate::writer::RecordWriter) state machine.
//! - [`FormatWriter`] and [`FormatReader`] are the uniform streaming interfaces
//!   callers program against, regardless of the format.
//!
//! # Example
//!
//! ```
//! use recfmt::formats::{FormatReader, FormatWriter, WriteStatus};
//!
//! fn copy<R: FormatReader, W: FormatWriter>(
//!     reader: &mut R,
//!     writer: &mut W,
//! ) -> recfmt::Result<usize> {
//!     let mut count = 0;
//!     while let Some(record) = reader.read_record()? {
//!         if writer.write_record(&record)? == WriteStatus::Stopped {
//!             break;
//!         }
//!         count += 1;
//!     }
//!     writer.finish()?;
//!     Ok(count)
//! }
//! ```

use crate::descriptor::RecordDescriptor;
use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::normalize::Escaping;
use crate::record::{DynamicRecord, Record};

/// What happened to a record handed to a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The record was written
    Written,
    /// The record was skipped by the predicate, a hook or an error mode
    Skipped,
    /// The run is stopped; nothing more will be written
    Stopped,
}

/// A normalized field value ready for framing.
#[derive(Debug, Clone)]
pub struct RenderedField<'a> {
    /// Field the text belongs to
    pub field: &'a FieldDescriptor,
    /// Normalized text
    pub text: String,
}

/// Structural text of one output format.
///
/// The writer calls [`prepare`](Self::prepare) and [`open`](Self::open) once
/// when the schema locks, [`render_record`](Self::render_record) per record and
/// [`close`](Self::close) once at the end, and writes whatever they return.
pub trait FormatEmitter: std::fmt::Debug {
    /// Escaping applied to field text.
    fn escaping(&self) -> Escaping;

    /// Line delimiter of the format; text containing it gets quoted.
    fn line_delimiter(&self) -> &str;

    /// Descriptor of a field discovered from the first record.
    fn discovered_field(&self, name: &str) -> FieldDescriptor {
        FieldDescriptor::new(name)
    }

    /// Check format-specific configuration and complete field settings.
    ///
    /// Called after the descriptor validated and before it locks.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the schema does not fit the format.
    fn prepare(&mut self, descriptor: &mut RecordDescriptor) -> Result<()> {
        let _ = descriptor;
        Ok(())
    }

    /// Opening boundary of the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundary cannot be rendered.
    fn open(&mut self, descriptor: &RecordDescriptor) -> Result<String>;

    /// Framed text of one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be framed.
    fn render_record(&mut self, fields: &[RenderedField<'_>]) -> Result<String>;

    /// Closing boundary of the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundary cannot be rendered.
    fn close(&mut self) -> Result<String>;
}

/// Trait for readers producing records from a source.
///
/// Implementations return `Ok(None)` once the source is exhausted or a hook
/// stopped the run; that is not an error.
pub trait FormatReader: std::fmt::Debug {
    /// Read the next record.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is malformed, I/O fails, or a field or
    /// record failure is not recovered.
    fn read_record(&mut self) -> Result<Option<DynamicRecord>>;

    /// Read all remaining records into a vector.
    ///
    /// For large sources, prefer streaming with [`read_record`](Self::read_record).
    ///
    /// # Errors
    ///
    /// Returns the first error; records read before it are discarded.
    fn read_all(&mut self) -> Result<Vec<DynamicRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_record()? {
            records.push(record);
        }
        Ok(records)
    }

    /// Number of records read so far, if tracked.
    fn records_read(&self) -> Option<usize> {
        None
    }
}

/// Trait for writers serializing records to a sink.
///
/// [`finish`](Self::finish) MUST be called to emit the closing boundary and
/// flush the sink.
pub trait FormatWriter: std::fmt::Debug {
    /// Write a single record.
    ///
    /// # Errors
    ///
    /// Returns an error for fatal failures and for failures the error modes
    /// do not recover.
    fn write_record(&mut self, record: &dyn Record) -> Result<WriteStatus>;

    /// Write records until the slice ends or the run stops, returning how many
    /// were written.
    ///
    /// # Errors
    ///
    /// Returns the first error of [`write_record`](Self::write_record).
    fn write_batch<R: Record>(&mut self, records: &[R]) -> Result<usize>
    where
        Self: Sized,
    {
        let mut written = 0;
        for record in records {
            match self.write_record(record)? {
                WriteStatus::Written => written += 1,
                WriteStatus::Skipped => {},
                WriteStatus::Stopped => break,
            }
        }
        Ok(written)
    }

    /// Close the document and flush the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the closing boundary or the flush fails.
    fn finish(&mut self) -> Result<()>;

    /// Number of records written so far, if tracked.
    fn records_written(&self) -> Option<usize> {
        None
    }
}

/// Extension trait providing iterator-style access for format readers.
///
/// Automatically implemented for all types implementing [`FormatReader`].
pub trait FormatReaderExt: FormatReader {
    /// Iterate over the remaining records.
    fn records(&mut self) -> RecordIterator<'_, Self>
    where
        Self: Sized,
    {
        RecordIterator { reader: self }
    }
}

impl<T: FormatReader> FormatReaderExt for T {}

/// Iterator adapter for [`FormatReader`].
///
/// Created by the [`records`](FormatReaderExt::records) method.
#[derive(Debug)]
pub struct RecordIterator<'a, R: FormatReader> {
    reader: &'a mut R,
}

impl<R: FormatReader> Iterator for RecordIterator<'_, R> {
    type Item = Result<DynamicRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecfmtError;

    fn sample(id: i64) -> DynamicRecord {
        DynamicRecord::new().with("id", id)
    }

    /// Mock reader for testing trait implementations
    #[derive(Debug)]
    struct MockReader {
        records: Vec<DynamicRecord>,
        index: usize,
    }

    impl FormatReader for MockReader {
        fn read_record(&mut self) -> Result<Option<DynamicRecord>> {
            let record = self.records.get(self.index).cloned();
            if record.is_some() {
                self.index += 1;
            }
            Ok(record)
        }

        fn records_read(&self) -> Option<usize> {
            Some(self.index)
        }
    }

    /// Mock writer that stops after `limit` records
    #[derive(Debug)]
    struct MockWriter {
        ids: Vec<String>,
        limit: usize,
        finished: bool,
    }

    impl FormatWriter for MockWriter {
        fn write_record(&mut self, record: &dyn Record) -> Result<WriteStatus> {
            if self.finished {
                return Err(RecfmtError::Format("Writer already finished".to_string()));
            }
            if self.ids.len() == self.limit {
                return Ok(WriteStatus::Stopped);
            }
            match record.get("id") {
                Some(id) => {
                    self.ids.push(id.to_text());
                    Ok(WriteStatus::Written)
                },
                None => Ok(WriteStatus::Skipped),
            }
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }

        fn records_written(&self) -> Option<usize> {
            Some(self.ids.len())
        }
    }

    #[test]
    fn test_reader_read_all() {
        let mut reader = MockReader {
            records: vec![sample(1), sample(2), sample(3)],
            index: 0,
        };
        assert_eq!(reader.read_all().unwrap().len(), 3);
        assert_eq!(reader.records_read(), Some(3));
    }

    #[test]
    fn test_reader_iterator() {
        let mut reader = MockReader {
            records: vec![sample(1), sample(2)],
            index: 0,
        };
        let ids: Vec<_> = reader
            .records()
            .map(|r| r.unwrap().get("id").unwrap())
            .collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_writer_batch_counts_and_stops() {
        let mut writer = MockWriter {
            ids: Vec::new(),
            limit: 2,
            finished: false,
        };
        let records = vec![sample(1), DynamicRecord::new(), sample(2), sample(3)];
        assert_eq!(writer.write_batch(&records).unwrap(), 2);
        assert_eq!(writer.ids, vec!["1", "2"]);
        writer.finish().unwrap();
        assert!(writer.write_record(&sample(4)).is_err());
    }
}
