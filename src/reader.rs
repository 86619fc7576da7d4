//! Shared bookkeeping of read runs.
//!
//! Every reader parses its own source into raw field tokens and hands them to
//! a [`ReadSession`], which owns the descriptor and the observer and runs the
//! format-independent part of the loop: schema locking on the first record,
//! record and field hooks, resolution, object-level validation, record-level
//! recovery and progress notification.

use std::fmt;

use indexmap::IndexMap;

use crate::descriptor::RecordDescriptor;
use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::notify::{guard, Decision, Flow, LineDecision, ReadFieldHooks, ReadObserver};
use crate::record::DynamicRecord;
use crate::recovery::recover_record;
use crate::resolve::{resolve_value, Direction, FieldOutcome};
use crate::validation::{validate_object, ValidationMode};
use crate::value::Value;

/// Result of processing one source record.
#[derive(Debug)]
pub(crate) enum ReadStep {
    /// A record was materialized
    Record(DynamicRecord),
    /// The record was skipped by a hook or an error mode
    Skipped,
    /// A hook stopped the run
    Stopped,
}

/// Descriptor, observer and counters of one read run.
pub(crate) struct ReadSession {
    pub(crate) descriptor: RecordDescriptor,
    observer: Option<Box<dyn ReadObserver>>,
    index: usize,
    records_read: usize,
    begun: bool,
    stopping: bool,
    finished: bool,
}

impl fmt::Debug for ReadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSession")
            .field("index", &self.index)
            .field("records_read", &self.records_read)
            .field("stopping", &self.stopping)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ReadSession {
    pub(crate) fn new(descriptor: RecordDescriptor) -> Self {
        ReadSession {
            descriptor,
            observer: None,
            index: 0,
            records_read: 0,
            begun: false,
            stopping: false,
            finished: false,
        }
    }

    pub(crate) fn set_observer(&mut self, observer: Box<dyn ReadObserver>) {
        self.observer = Some(observer);
    }

    pub(crate) fn records_read(&self) -> usize {
        self.records_read
    }

    /// Fire the begin hook once. Returns `false` once the run is over.
    pub(crate) fn proceed(&mut self) -> bool {
        if self.finished {
            return false;
        }
        if !self.begun {
            self.begun = true;
            if let Some(observer) = self.observer.as_mut() {
                if guard("begin_read", Flow::Stop, || observer.begin_read()) == Flow::Stop {
                    self.stopping = true;
                }
            }
        }
        if self.stopping {
            self.finish();
            return false;
        }
        true
    }

    /// End the run, firing the end hook once.
    pub(crate) fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.begun {
            if let Some(observer) = self.observer.as_mut() {
                guard("end_read", (), || observer.end_read());
            }
        }
        tracing::debug!(records = self.records_read, "Reader finished");
    }

    pub(crate) fn next_index(&mut self) -> usize {
        self.index += 1;
        self.index
    }

    /// Discover, validate, prepare and lock the schema if not done yet.
    pub(crate) fn lock_schema<M, P>(&mut self, names: Vec<String>, make: M, prepare: P) -> Result<()>
    where
        M: FnMut(&str) -> FieldDescriptor,
        P: FnOnce(&mut RecordDescriptor) -> Result<()>,
    {
        if self.descriptor.is_locked() {
            return Ok(());
        }
        if self.descriptor.shape().is_none() {
            self.descriptor.bind_dynamic();
        }
        self.descriptor.discover_fields(names, make)?;
        self.descriptor.validate()?;
        prepare(&mut self.descriptor)?;
        self.descriptor.lock();
        Ok(())
    }

    pub(crate) fn before_line(&mut self, index: usize, line: &str) -> LineDecision {
        let decision = match self.observer.as_mut() {
            Some(observer) => guard("before_line", LineDecision::Stop, || {
                observer.before_line(index, line)
            }),
            None => LineDecision::Proceed,
        };
        if decision == LineDecision::Stop {
            self.stopping = true;
        }
        decision
    }

    /// Run one source record through the pipeline.
    ///
    /// `raw` yields the unrendered token of a field, or `None` when the source
    /// record has no value for it.
    pub(crate) fn process<F>(&mut self, index: usize, mut raw: F) -> Result<ReadStep>
    where
        F: FnMut(&FieldDescriptor) -> Result<Option<Value>>,
    {
        let decision = match self.observer.as_mut() {
            Some(observer) => guard("before_record", Decision::Stop, || {
                observer.before_record(index)
            }),
            None => Decision::Proceed,
        };
        match decision {
            Decision::Proceed => {},
            Decision::Skip => {
                self.notify_progress(index);
                return Ok(ReadStep::Skipped);
            },
            Decision::Stop => {
                self.stopping = true;
                return Ok(ReadStep::Stopped);
            },
        }

        let values = match self.materialize(index, &mut raw) {
            Ok(Some(values)) => values,
            Ok(None) => {
                self.stopping = true;
                return Ok(ReadStep::Stopped);
            },
            Err(cause) => {
                let observer = &mut self.observer;
                recover_record(self.descriptor.policy.error_mode, cause, |cause| {
                    match observer.as_mut() {
                        Some(observer) => guard("record_error", false, || {
                            observer.record_error(index, cause)
                        }),
                        None => false,
                    }
                })?;
                self.notify_progress(index);
                return Ok(ReadStep::Skipped);
            },
        };

        let record = DynamicRecord::from(values);
        self.records_read += 1;
        tracing::trace!(index, fields = record.len(), "Read record");

        if let Some(observer) = self.observer.as_mut() {
            if guard("after_record", Flow::Stop, || observer.after_record(index, &record))
                == Flow::Stop
            {
                self.stopping = true;
            }
        }
        self.notify_progress(index);
        Ok(ReadStep::Record(record))
    }

    fn materialize<F>(&mut self, index: usize, raw: &mut F) -> Result<Option<IndexMap<String, Value>>>
    where
        F: FnMut(&FieldDescriptor) -> Result<Option<Value>>,
    {
        let descriptor = &self.descriptor;
        let mut hooks = ReadFieldHooks {
            observer: self.observer.as_mut(),
        };
        let mut values = IndexMap::with_capacity(descriptor.len());
        for field in descriptor.fields() {
            let token = raw(field)?;
            match resolve_value(field, &descriptor.policy, token, Direction::Read, index, &mut hooks)? {
                FieldOutcome::Resolved(value) => {
                    values.insert(field.name().to_string(), value);
                },
                FieldOutcome::Omitted => {},
                FieldOutcome::Stop => return Ok(None),
            }
        }
        if descriptor
            .policy
            .validation_mode
            .contains(ValidationMode::OBJECT_LEVEL)
        {
            validate_object(descriptor, &values)?;
        }
        Ok(Some(values))
    }

    fn notify_progress(&mut self, index: usize) {
        let every = self.descriptor.policy.notify_after;
        let due = every > 0 && u64::try_from(index).is_ok_and(|i| i % every == 0);
        if !due || self.stopping {
            return;
        }
        if let Some(observer) = self.observer.as_mut() {
            if guard("records_read", Flow::Stop, || observer.records_read(index)) == Flow::Stop {
                self.stopping = true;
            }
        }
    }
}
