//! Per-field resolution: lookup, hooks, conversion, validation and recovery.
//!
//! [`resolve_field`] produces the final value of one field of one record in
//! the write direction; [`resolve_value`] is the shared core that readers
//! call with the raw token they parsed.
//!
//! The result is a tagged [`FieldOutcome`]. Recoverable failures never unwind:
//! they become a substituted value or [`FieldOutcome::Omitted`]. Only fatal
//! errors and failures the recovery chain gives up on are returned as `Err`.
//! A fallback or default that itself fails is always returned, whatever the
//! field's error mode, so the record-level policy decides what happens next.

use crate::convert::apply_chain;
use crate::descriptor::RecordPolicy;
use crate::error::{RecfmtError, RecoveryStage, Result};
use crate::field::FieldDescriptor;
use crate::notify::{FieldDecision, FieldHooks, Flow};
use crate::record::Record;
use crate::recovery::{recover, ErrorMode, Recovery};
use crate::validation::{validate_member, ValidationMode};
use crate::value::Value;

/// Direction of the run a value is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Record to text
    Write,
    /// Text to record; converted values are coerced to the field's value type
    Read,
}

/// Final state of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    /// The field resolved to this value
    Resolved(Value),
    /// The field is left out of the record
    Omitted,
    /// A hook asked to terminate the run
    Stop,
}

/// Look up the raw value of `field` in `record`, trying aliases in order.
#[must_use]
pub fn lookup(record: &dyn Record, field: &FieldDescriptor) -> Option<Value> {
    std::iter::once(field.name())
        .chain(field.aliases.iter().map(String::as_str))
        .find_map(|name| record.get(name))
}

/// Resolve `field` of `record` for writing.
///
/// # Errors
///
/// Returns [`RecfmtError::MissingField`] when the record has no value source
/// for the field and the policy requires one, and any failure the recovery
/// chain cannot resolve.
pub fn resolve_field(
    record: &dyn Record,
    field: &FieldDescriptor,
    policy: &RecordPolicy,
    index: usize,
    hooks: &mut dyn FieldHooks,
) -> Result<FieldOutcome> {
    let raw = lookup(record, field);
    resolve_value(field, policy, raw, Direction::Write, index, hooks)
}

/// Resolve a raw value through the field pipeline.
///
/// `raw` is `None` when the record has no value source for the field.
///
/// # Errors
///
/// See [`resolve_field`].
pub fn resolve_value(
    field: &FieldDescriptor,
    policy: &RecordPolicy,
    raw: Option<Value>,
    direction: Direction,
    index: usize,
    hooks: &mut dyn FieldHooks,
) -> Result<FieldOutcome> {
    let raw = match raw {
        Some(value) => value,
        None if policy.throw_on_missing_field => {
            return Err(RecfmtError::MissingField(field.name().to_string()));
        },
        None => Value::Null,
    };
    if direction == Direction::Write {
        field.infer_value_type(raw.value_type());
    }
    let mut value = match raw {
        Value::Null => field.default_value.clone().unwrap_or(Value::Null),
        raw => raw,
    };

    match hooks.before_field(index, field.name(), &value) {
        FieldDecision::Proceed => {},
        FieldDecision::Replace(replacement) => value = replacement,
        FieldDecision::Skip => return Ok(FieldOutcome::Omitted),
        FieldDecision::Stop => return Ok(FieldOutcome::Stop),
    }

    let resolved = match process(field, policy, value.clone(), direction) {
        Ok(resolved) => resolved,
        Err(cause) if cause.is_fatal() => return Err(cause),
        Err(cause) => {
            let mode = field.effective_error_mode(policy.error_mode);
            match recover(field, mode, cause) {
                Ok(Recovery::Substituted(substitute)) => substitute,
                Ok(Recovery::Unresolved(cause)) => {
                    let failure = RecfmtError::FieldRecovery {
                        field: field.name().to_string(),
                        stage: RecoveryStage::Original,
                        source: Box::new(cause),
                    };
                    return report(field, mode, index, &value, hooks, failure);
                },
                Err(e) => return Err(e),
            }
        },
    };

    let suppressed = field.ignores(&resolved)
        || (field.ignore_value_mode.is_none() && policy.ignore_value_mode.matches(&resolved));
    if suppressed {
        return Ok(FieldOutcome::Omitted);
    }

    match hooks.after_field(index, field.name(), &resolved) {
        Flow::Continue => Ok(FieldOutcome::Resolved(resolved)),
        Flow::Stop => Ok(FieldOutcome::Stop),
    }
}

/// Converters, type coercion and member-level validation.
fn process(
    field: &FieldDescriptor,
    policy: &RecordPolicy,
    value: Value,
    direction: Direction,
) -> Result<Value> {
    let mut value = apply_chain(field.name(), &field.converters, value)?;
    if direction == Direction::Read {
        if let Some(target) = field.declared_type() {
            value = value
                .coerce(target)
                .map_err(|message| RecfmtError::Conversion {
                    field: field.name().to_string(),
                    message,
                })?;
        }
    }
    if policy.validation_mode.contains(ValidationMode::MEMBER_LEVEL) {
        validate_member(field.name(), &field.validators, &value)?;
    }
    Ok(value)
}

/// Last resort of the recovery chain once no substitute applies.
fn report(
    field: &FieldDescriptor,
    mode: ErrorMode,
    index: usize,
    value: &Value,
    hooks: &mut dyn FieldHooks,
    failure: RecfmtError,
) -> Result<FieldOutcome> {
    match mode {
        ErrorMode::IgnoreAndContinue => {
            tracing::debug!(field = field.name(), cause = %failure, "Ignoring failed field");
            Ok(FieldOutcome::Omitted)
        },
        ErrorMode::ReportAndContinue | ErrorMode::ThrowAndStop => {
            if hooks.field_error(index, field.name(), value, &failure) {
                Ok(FieldOutcome::Omitted)
            } else {
                Err(failure)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Converter;
    use crate::field::IgnoreValueMode;
    use crate::notify::NoHooks;
    use crate::record::DynamicRecord;
    use crate::validation::Validator;
    use crate::value::ValueType;

    /// Records hook calls and answers with preset decisions.
    #[derive(Default)]
    struct Script {
        before: Option<FieldDecision>,
        after: Option<Flow>,
        handle_errors: bool,
        errors: Vec<String>,
        after_calls: usize,
    }

    impl FieldHooks for Script {
        fn before_field(&mut self, _index: usize, _field: &str, _value: &Value) -> FieldDecision {
            self.before.clone().unwrap_or_default()
        }

        fn after_field(&mut self, _index: usize, _field: &str, _value: &Value) -> Flow {
            self.after_calls += 1;
            self.after.unwrap_or_default()
        }

        fn field_error(
            &mut self,
            _index: usize,
            field: &str,
            _value: &Value,
            _cause: &RecfmtError,
        ) -> bool {
            self.errors.push(field.to_string());
            self.handle_errors
        }
    }

    fn failing() -> Converter {
        Converter::new("reject", |_| Err("unparseable".to_string()))
    }

    fn resolve(record: &DynamicRecord, field: &FieldDescriptor, hooks: &mut Script) -> Result<FieldOutcome> {
        resolve_field(record, field, &RecordPolicy::default(), 1, hooks)
    }

    #[test]
    fn test_missing_field_is_fatal_even_when_ignoring() {
        let field = FieldDescriptor::new("age").error_mode(ErrorMode::IgnoreAndContinue);
        let err = resolve(&DynamicRecord::new(), &field, &mut Script::default()).unwrap_err();
        assert!(matches!(err, RecfmtError::MissingField(name) if name == "age"));
    }

    #[test]
    fn test_missing_field_uses_default_when_allowed() {
        let field = FieldDescriptor::new("age").default_value(18);
        let policy = RecordPolicy {
            throw_on_missing_field: false,
            ..RecordPolicy::default()
        };
        let outcome = resolve_field(&DynamicRecord::new(), &field, &policy, 1, &mut NoHooks).unwrap();
        assert_eq!(outcome, FieldOutcome::Resolved(Value::Int(18)));
    }

    #[test]
    fn test_aliases_are_tried_in_order() {
        let record = DynamicRecord::new().with("years", 40);
        let field = FieldDescriptor::new("age").alias("yrs").alias("years");
        let outcome = resolve(&record, &field, &mut Script::default()).unwrap();
        assert_eq!(outcome, FieldOutcome::Resolved(Value::Int(40)));
    }

    #[test]
    fn test_chain_order_fallback_then_default_then_ignore() {
        let record = DynamicRecord::new().with("age", "abc");
        let base = FieldDescriptor::new("age")
            .converter(failing())
            .error_mode(ErrorMode::ReportAndContinue);

        let both = base.clone().fallback_value("F").default_value("D");
        assert_eq!(
            resolve(&record, &both, &mut Script::default()).unwrap(),
            FieldOutcome::Resolved(Value::from("F"))
        );

        let default_only = base.clone().default_value("D");
        assert_eq!(
            resolve(&record, &default_only, &mut Script::default()).unwrap(),
            FieldOutcome::Resolved(Value::from("D"))
        );

        let ignore = base.clone().error_mode(ErrorMode::IgnoreAndContinue);
        assert_eq!(
            resolve(&record, &ignore, &mut Script::default()).unwrap(),
            FieldOutcome::Omitted
        );

        let throw = base.error_mode(ErrorMode::ThrowAndStop).fallback_value("F");
        assert!(matches!(
            resolve(&record, &throw, &mut Script::default()),
            Err(RecfmtError::Conversion { .. })
        ));
    }

    #[test]
    fn test_report_consults_field_error_hook() {
        let record = DynamicRecord::new().with("age", "abc");
        let field = FieldDescriptor::new("age")
            .converter(failing())
            .error_mode(ErrorMode::ReportAndContinue);

        let mut unhandled = Script::default();
        let err = resolve(&record, &field, &mut unhandled).unwrap_err();
        assert!(matches!(
            err,
            RecfmtError::FieldRecovery {
                stage: RecoveryStage::Original,
                ..
            }
        ));
        assert_eq!(unhandled.errors, vec!["age"]);

        let mut handled = Script {
            handle_errors: true,
            ..Script::default()
        };
        assert_eq!(
            resolve(&record, &field, &mut handled).unwrap(),
            FieldOutcome::Omitted
        );
        assert_eq!(handled.after_calls, 0);
    }

    #[test]
    fn test_invalid_substitutes_report_fallback_stage() {
        let record = DynamicRecord::new().with("code", "toolong");
        let field = FieldDescriptor::new("code")
            .validator(Validator::max_length(3))
            .fallback_value("also long")
            .error_mode(ErrorMode::ReportAndContinue);
        let err = resolve(&record, &field, &mut Script::default()).unwrap_err();
        assert!(matches!(
            err,
            RecfmtError::FieldRecovery {
                stage: RecoveryStage::Fallback,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_substitutes_propagate_when_ignoring() {
        let record = DynamicRecord::new().with("n", "toolong");
        let field = FieldDescriptor::new("n")
            .validator(Validator::max_length(3))
            .fallback_value("waytoolong")
            .default_value("alsotoolong")
            .error_mode(ErrorMode::IgnoreAndContinue);
        let mut hooks = Script {
            handle_errors: true,
            ..Script::default()
        };
        let err = resolve(&record, &field, &mut hooks).unwrap_err();
        assert!(matches!(
            err,
            RecfmtError::FieldRecovery {
                stage: RecoveryStage::Fallback,
                ref field,
                ..
            } if field == "n"
        ));
        assert!(hooks.errors.is_empty());
    }

    #[test]
    fn test_before_field_decisions() {
        let record = DynamicRecord::new().with("name", "ada");
        let field = FieldDescriptor::new("name").converter(Converter::uppercase());

        let mut replace = Script {
            before: Some(FieldDecision::Replace(Value::from("grace"))),
            ..Script::default()
        };
        assert_eq!(
            resolve(&record, &field, &mut replace).unwrap(),
            FieldOutcome::Resolved(Value::from("GRACE"))
        );

        let mut skip = Script {
            before: Some(FieldDecision::Skip),
            ..Script::default()
        };
        assert_eq!(resolve(&record, &field, &mut skip).unwrap(), FieldOutcome::Omitted);

        let mut stop = Script {
            before: Some(FieldDecision::Stop),
            ..Script::default()
        };
        assert_eq!(resolve(&record, &field, &mut stop).unwrap(), FieldOutcome::Stop);
    }

    #[test]
    fn test_after_field_can_stop() {
        let record = DynamicRecord::new().with("name", "ada");
        let mut hooks = Script {
            after: Some(Flow::Stop),
            ..Script::default()
        };
        assert_eq!(
            resolve(&record, &FieldDescriptor::new("name"), &mut hooks).unwrap(),
            FieldOutcome::Stop
        );
    }

    #[test]
    fn test_ignored_values_are_omitted() {
        let record = DynamicRecord::new()
            .with("note", "   ")
            .with("gone", Value::DbNull);
        let note = FieldDescriptor::new("note").ignore_value_mode(IgnoreValueMode::WHITE_SPACE);
        assert_eq!(
            resolve(&record, &note, &mut Script::default()).unwrap(),
            FieldOutcome::Omitted
        );

        let policy = RecordPolicy {
            ignore_value_mode: IgnoreValueMode::DB_NULL,
            ..RecordPolicy::default()
        };
        let gone = FieldDescriptor::new("gone");
        assert_eq!(
            resolve_field(&record, &gone, &policy, 1, &mut NoHooks).unwrap(),
            FieldOutcome::Omitted
        );
    }

    #[test]
    fn test_read_direction_coerces_to_declared_type() {
        let field = FieldDescriptor::new("qty")
            .value_type(ValueType::Int)
            .converter(Converter::trim());
        let outcome = resolve_value(
            &field,
            &RecordPolicy::default(),
            Some(Value::from(" 12 ")),
            Direction::Read,
            1,
            &mut NoHooks,
        )
        .unwrap();
        assert_eq!(outcome, FieldOutcome::Resolved(Value::Int(12)));

        let err = resolve_value(
            &field,
            &RecordPolicy::default(),
            Some(Value::from("twelve")),
            Direction::Read,
            1,
            &mut NoHooks,
        )
        .unwrap_err();
        assert!(matches!(err, RecfmtError::Conversion { .. }));
    }

    #[test]
    fn test_write_direction_infers_value_type() {
        let record = DynamicRecord::new().with("flag", true);
        let field = FieldDescriptor::new("flag");
        resolve(&record, &field, &mut Script::default()).unwrap();
        assert_eq!(field.declared_type(), Some(ValueType::Bool));
    }

    #[test]
    fn test_value_type_follows_first_raw_value() {
        let field = FieldDescriptor::new("n");
        resolve(&DynamicRecord::new().with("n", Value::Null), &field, &mut Script::default()).unwrap();
        resolve(&DynamicRecord::new().with("n", 5), &field, &mut Script::default()).unwrap();
        assert_eq!(field.declared_type(), Some(ValueType::Text));

        let parsed = FieldDescriptor::new("qty").converter(Converter::parse_int());
        let outcome = resolve(&DynamicRecord::new().with("qty", "12"), &parsed, &mut Script::default());
        assert_eq!(outcome.unwrap(), FieldOutcome::Resolved(Value::Int(12)));
        assert_eq!(parsed.declared_type(), Some(ValueType::Text));
    }

    #[test]
    fn test_member_validation_can_be_disabled() {
        let record = DynamicRecord::new().with("code", "toolong");
        let field = FieldDescriptor::new("code").validator(Validator::max_length(3));
        let policy = RecordPolicy {
            validation_mode: ValidationMode::OBJECT_LEVEL,
            ..RecordPolicy::default()
        };
        assert_eq!(
            resolve_field(&record, &field, &policy, 1, &mut NoHooks).unwrap(),
            FieldOutcome::Resolved(Value::from("toolong"))
        );
    }
}
