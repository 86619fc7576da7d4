//! Notification pipeline: observer hooks at document, record and field granularity.
//!
//! Hooks are synchronous callbacks returning an immutable decision value. Every
//! hook has a default implementation, so an observer only overrides what it
//! needs; a missing observer behaves like one that always proceeds and never
//! handles errors.
//!
//! A hook that panics is caught and treated as its negative result: `Stop` for
//! hooks that decide whether to proceed, `false` for error hooks. A misbehaving
//! observer can deny progress but never corrupt the run.
//!
//! ```
//! use recfmt::notify::{Decision, WriteObserver};
//! use recfmt::record::Record;
//!
//! /// Skips every other record.
//! struct EveryOther;
//!
//! impl WriteObserver for EveryOther {
//!     fn before_record(&mut self, _record: &dyn Record, index: usize) -> Decision {
//!         if index % 2 == 0 { Decision::Skip } else { Decision::Proceed }
//!     }
//! }
//! ```

use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

use crate::error::RecfmtError;
use crate::record::Record;
use crate::value::Value;

/// Whether a run should go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Keep going
    #[default]
    Continue,
    /// Terminate the run after the current record
    Stop,
}

/// Decision of a before-record hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decision {
    /// Process the record
    #[default]
    Proceed,
    /// Skip this record and continue with the next
    Skip,
    /// Terminate the run
    Stop,
}

/// Decision of a before-field hook.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldDecision {
    /// Keep the current value
    #[default]
    Proceed,
    /// Continue with this value instead
    Replace(Value),
    /// Omit the field and continue with the record
    Skip,
    /// Terminate the run, discarding the current record
    Stop,
}

/// Decision of a before-line hook of line-based readers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LineDecision {
    /// Parse the line as read
    #[default]
    Proceed,
    /// Parse this text instead
    Replace(String),
    /// Skip the line
    Skip,
    /// Terminate the run
    Stop,
}

/// Observer of a write run.
#[allow(unused_variables)]
pub trait WriteObserver {
    /// Called once before anything is written.
    fn begin_write(&mut self, sink: &mut dyn Write) -> Flow {
        Flow::Continue
    }

    /// Called once after the closing boundary is written.
    fn end_write(&mut self, sink: &mut dyn Write) {}

    /// Called before a record is resolved. `index` is one-based.
    fn before_record(&mut self, record: &dyn Record, index: usize) -> Decision {
        Decision::Proceed
    }

    /// Called after a record is written with its rendered text.
    fn after_record(&mut self, record: &dyn Record, index: usize, rendered: &str) -> Flow {
        Flow::Continue
    }

    /// Called when a record fails under `ReportAndContinue`. Return `true` if handled.
    fn record_error(&mut self, record: &dyn Record, index: usize, cause: &RecfmtError) -> bool {
        false
    }

    /// Called before a field's converters run.
    fn before_field(
        &mut self,
        record: &dyn Record,
        index: usize,
        field: &str,
        value: &Value,
    ) -> FieldDecision {
        FieldDecision::Proceed
    }

    /// Called after a field resolves.
    fn after_field(&mut self, record: &dyn Record, index: usize, field: &str, value: &Value) -> Flow {
        Flow::Continue
    }

    /// Called when a field cannot be recovered under `ReportAndContinue`.
    /// Return `true` if handled; the field is then omitted.
    fn field_error(
        &mut self,
        record: &dyn Record,
        index: usize,
        field: &str,
        value: &Value,
        cause: &RecfmtError,
    ) -> bool {
        false
    }

    /// Called every `notify_after` records.
    fn records_written(&mut self, count: usize) -> Flow {
        Flow::Continue
    }
}

/// Observer of a read run.
#[allow(unused_variables)]
pub trait ReadObserver {
    /// Called once before the first record is read.
    fn begin_read(&mut self) -> Flow {
        Flow::Continue
    }

    /// Called once when the source is exhausted or the run stops.
    fn end_read(&mut self) {}

    /// Called with the raw text of each data line of line-based formats.
    fn before_line(&mut self, index: usize, line: &str) -> LineDecision {
        LineDecision::Proceed
    }

    /// Called before a record is resolved. `index` is one-based.
    fn before_record(&mut self, index: usize) -> Decision {
        Decision::Proceed
    }

    /// Called after a record is materialized.
    fn after_record(&mut self, index: usize, record: &dyn Record) -> Flow {
        Flow::Continue
    }

    /// Called when a record fails under `ReportAndContinue`. Return `true` if handled.
    fn record_error(&mut self, index: usize, cause: &RecfmtError) -> bool {
        false
    }

    /// Called before a field's converters run.
    fn before_field(&mut self, index: usize, field: &str, value: &Value) -> FieldDecision {
        FieldDecision::Proceed
    }

    /// Called after a field resolves.
    fn after_field(&mut self, index: usize, field: &str, value: &Value) -> Flow {
        Flow::Continue
    }

    /// Called when a field cannot be recovered under `ReportAndContinue`.
    fn field_error(&mut self, index: usize, field: &str, value: &Value, cause: &RecfmtError) -> bool {
        false
    }

    /// Called every `notify_after` records.
    fn records_read(&mut self, count: usize) -> Flow {
        Flow::Continue
    }
}

/// Field-granularity hooks consumed by the resolver.
#[allow(unused_variables)]
pub trait FieldHooks {
    /// See [`WriteObserver::before_field`].
    fn before_field(&mut self, index: usize, field: &str, value: &Value) -> FieldDecision {
        FieldDecision::Proceed
    }

    /// See [`WriteObserver::after_field`].
    fn after_field(&mut self, index: usize, field: &str, value: &Value) -> Flow {
        Flow::Continue
    }

    /// See [`WriteObserver::field_error`].
    fn field_error(&mut self, index: usize, field: &str, value: &Value, cause: &RecfmtError) -> bool {
        false
    }
}

/// Hooks that always proceed and never handle errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl FieldHooks for NoHooks {}

/// Field hooks of a write run, forwarding to an optional observer.
pub(crate) struct WriteFieldHooks<'a> {
    pub(crate) observer: Option<&'a mut Box<dyn WriteObserver>>,
    pub(crate) record: &'a dyn Record,
}

impl FieldHooks for WriteFieldHooks<'_> {
    fn before_field(&mut self, index: usize, field: &str, value: &Value) -> FieldDecision {
        let record = self.record;
        match self.observer.as_deref_mut() {
            Some(observer) => guard("before_field", FieldDecision::Stop, || {
                observer.before_field(record, index, field, value)
            }),
            None => FieldDecision::Proceed,
        }
    }

    fn after_field(&mut self, index: usize, field: &str, value: &Value) -> Flow {
        let record = self.record;
        match self.observer.as_deref_mut() {
            Some(observer) => guard("after_field", Flow::Stop, || {
                observer.after_field(record, index, field, value)
            }),
            None => Flow::Continue,
        }
    }

    fn field_error(&mut self, index: usize, field: &str, value: &Value, cause: &RecfmtError) -> bool {
        let record = self.record;
        match self.observer.as_deref_mut() {
            Some(observer) => guard("field_error", false, || {
                observer.field_error(record, index, field, value, cause)
            }),
            None => false,
        }
    }
}

/// Field hooks of a read run, forwarding to an optional observer.
pub(crate) struct ReadFieldHooks<'a> {
    pub(crate) observer: Option<&'a mut Box<dyn ReadObserver>>,
}

impl FieldHooks for ReadFieldHooks<'_> {
    fn before_field(&mut self, index: usize, field: &str, value: &Value) -> FieldDecision {
        match self.observer.as_deref_mut() {
            Some(observer) => guard("before_field", FieldDecision::Stop, || {
                observer.before_field(index, field, value)
            }),
            None => FieldDecision::Proceed,
        }
    }

    fn after_field(&mut self, index: usize, field: &str, value: &Value) -> Flow {
        match self.observer.as_deref_mut() {
            Some(observer) => guard("after_field", Flow::Stop, || {
                observer.after_field(index, field, value)
            }),
            None => Flow::Continue,
        }
    }

    fn field_error(&mut self, index: usize, field: &str, value: &Value, cause: &RecfmtError) -> bool {
        match self.observer.as_deref_mut() {
            Some(observer) => guard("field_error", false, || {
                observer.field_error(index, field, value, cause)
            }),
            None => false,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Run an observer hook, mapping a panic to `negative`.
pub(crate) fn guard<T>(hook: &'static str, negative: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            tracing::warn!(
                hook,
                panic = panic_message(payload.as_ref()),
                "Observer hook panicked; treating it as a negative result"
            );
            negative
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DynamicRecord;

    struct Panicky;

    impl WriteObserver for Panicky {
        fn before_field(
            &mut self,
            _record: &dyn Record,
            _index: usize,
            _field: &str,
            _value: &Value,
        ) -> FieldDecision {
            panic!("boom");
        }

        fn field_error(
            &mut self,
            _record: &dyn Record,
            _index: usize,
            _field: &str,
            _value: &Value,
            _cause: &RecfmtError,
        ) -> bool {
            panic!("boom");
        }
    }

    #[test]
    fn test_guard_passes_through_results() {
        assert_eq!(guard("hook", Flow::Stop, || Flow::Continue), Flow::Continue);
    }

    #[test]
    fn test_guard_maps_panic_to_negative() {
        assert_eq!(guard("hook", Flow::Stop, || -> Flow { panic!("boom") }), Flow::Stop);
        assert!(!guard("hook", false, || -> bool { panic!("{}", String::from("boom")) }));
    }

    #[test]
    fn test_absent_observer_proceeds() {
        let record = DynamicRecord::new();
        let mut hooks = WriteFieldHooks {
            observer: None,
            record: &record,
        };
        assert_eq!(
            hooks.before_field(1, "a", &Value::Null),
            FieldDecision::Proceed
        );
        assert_eq!(hooks.after_field(1, "a", &Value::Null), Flow::Continue);
        let cause = RecfmtError::Format("x".to_string());
        assert!(!hooks.field_error(1, "a", &Value::Null, &cause));
    }

    #[test]
    fn test_panicking_observer_denies_progress() {
        let record = DynamicRecord::new();
        let mut observer: Box<dyn WriteObserver> = Box::new(Panicky);
        let mut hooks = WriteFieldHooks {
            observer: Some(&mut observer),
            record: &record,
        };
        assert_eq!(hooks.before_field(1, "a", &Value::Null), FieldDecision::Stop);
        let cause = RecfmtError::Format("x".to_string());
        assert!(!hooks.field_error(1, "a", &Value::Null, &cause));
        // Default hooks are untouched by the panicking ones.
        assert_eq!(hooks.after_field(1, "a", &Value::Null), Flow::Continue);
    }
}
