//! Error modes and the field recovery chain.
//!
//! When a field fails conversion or validation, its [`ErrorMode`] decides what
//! happens next:
//!
//! - `ThrowAndStop`: the failure propagates and the run aborts.
//! - otherwise the fallback value is tried, then the default value; each is
//!   re-validated with the field's own validators before it is used.
//! - if neither is configured, `IgnoreAndContinue` omits the field and
//!   `ReportAndContinue` asks the field-error hook whether it handled the
//!   failure.
//!
//! A substitute that fails re-validation is reported as a
//! [`RecoveryStage::Fallback`] failure so it is never confused with the
//! original cause.

use serde::{Deserialize, Serialize};

use crate::error::{RecfmtError, RecoveryStage, Result};
use crate::field::FieldDescriptor;
use crate::validation::validate_member;
use crate::value::Value;

/// Strategy for handling a failed field or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorMode {
    /// Propagate the failure and abort the run (default)
    #[default]
    ThrowAndStop,
    /// Report the failure to the error hook; abort only if it is not handled
    ReportAndContinue,
    /// Silently omit the failed field or record
    IgnoreAndContinue,
}

/// Result of running the substitute part of the recovery chain.
#[derive(Debug)]
pub enum Recovery {
    /// A fallback or default value passed re-validation and replaces the failed value.
    Substituted(Value),
    /// Nothing is configured to replace the failed value; carries the original cause.
    Unresolved(RecfmtError),
}

/// Try to recover `field` from `cause` using its fallback and default values.
///
/// # Errors
///
/// Returns `cause` unchanged under [`ErrorMode::ThrowAndStop`], and
/// [`RecfmtError::FieldRecovery`] with [`RecoveryStage::Fallback`] when every
/// configured substitute fails re-validation.
pub fn recover(field: &FieldDescriptor, mode: ErrorMode, cause: RecfmtError) -> Result<Recovery> {
    if mode == ErrorMode::ThrowAndStop {
        return Err(cause);
    }

    let mut substitute_error = None;
    let candidates = [
        ("fallback", field.fallback_value.as_ref()),
        ("default", field.default_value.as_ref()),
    ];
    for (kind, candidate) in candidates {
        let Some(value) = candidate else {
            continue;
        };
        match validate_member(field.name(), &field.validators, value) {
            Ok(()) => {
                tracing::debug!(
                    field = field.name(),
                    substitute = kind,
                    cause = %cause,
                    "Recovered field with substitute value"
                );
                return Ok(Recovery::Substituted(value.clone()));
            },
            Err(e) => substitute_error = Some(e),
        }
    }

    match substitute_error {
        Some(e) => Err(RecfmtError::FieldRecovery {
            field: field.name().to_string(),
            stage: RecoveryStage::Fallback,
            source: Box::new(e),
        }),
        None => Ok(Recovery::Unresolved(cause)),
    }
}

/// Apply a record-level error mode to a failure raised while processing one record.
///
/// Returns `Ok(())` when the record should be skipped and the run should go on.
/// `report` is the record-error hook; it is only consulted under
/// [`ErrorMode::ReportAndContinue`].
///
/// # Errors
///
/// Returns `cause` when it is fatal, when `mode` is [`ErrorMode::ThrowAndStop`],
/// or when the hook does not handle it.
pub fn recover_record(
    mode: ErrorMode,
    cause: RecfmtError,
    report: impl FnOnce(&RecfmtError) -> bool,
) -> Result<()> {
    if cause.is_fatal() {
        return Err(cause);
    }
    match mode {
        ErrorMode::ThrowAndStop => Err(cause),
        ErrorMode::IgnoreAndContinue => {
            tracing::debug!(cause = %cause, "Skipping record");
            Ok(())
        },
        ErrorMode::ReportAndContinue => {
            if report(&cause) {
                Ok(())
            } else {
                Err(cause)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Validator;

    fn conversion_error() -> RecfmtError {
        RecfmtError::Conversion {
            field: "age".to_string(),
            message: "bad".to_string(),
        }
    }

    #[test]
    fn test_throw_and_stop_propagates_cause() {
        let field = FieldDescriptor::new("age").fallback_value("F");
        let err = recover(&field, ErrorMode::ThrowAndStop, conversion_error()).unwrap_err();
        assert!(matches!(err, RecfmtError::Conversion { .. }));
    }

    #[test]
    fn test_fallback_wins_over_default() {
        let field = FieldDescriptor::new("age")
            .fallback_value("F")
            .default_value("D");
        let recovery = recover(&field, ErrorMode::ReportAndContinue, conversion_error()).unwrap();
        assert!(matches!(recovery, Recovery::Substituted(v) if v == Value::from("F")));
    }

    #[test]
    fn test_default_used_without_fallback() {
        let field = FieldDescriptor::new("age").default_value("D");
        let recovery = recover(&field, ErrorMode::IgnoreAndContinue, conversion_error()).unwrap();
        assert!(matches!(recovery, Recovery::Substituted(v) if v == Value::from("D")));
    }

    #[test]
    fn test_invalid_fallback_falls_through_to_default() {
        let field = FieldDescriptor::new("age")
            .fallback_value("way too long")
            .default_value("ok")
            .validator(Validator::max_length(5));
        let recovery = recover(&field, ErrorMode::ReportAndContinue, conversion_error()).unwrap();
        assert!(matches!(recovery, Recovery::Substituted(v) if v == Value::from("ok")));
    }

    #[test]
    fn test_failed_substitutes_report_fallback_stage() {
        let field = FieldDescriptor::new("age")
            .fallback_value("way too long")
            .default_value("also too long")
            .validator(Validator::max_length(5));
        let err = recover(&field, ErrorMode::ReportAndContinue, conversion_error()).unwrap_err();
        match err {
            RecfmtError::FieldRecovery { stage, source, .. } => {
                assert_eq!(stage, RecoveryStage::Fallback);
                assert!(matches!(*source, RecfmtError::Validation { .. }));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nothing_configured_is_unresolved() {
        let field = FieldDescriptor::new("age");
        let recovery = recover(&field, ErrorMode::IgnoreAndContinue, conversion_error()).unwrap();
        assert!(matches!(
            recovery,
            Recovery::Unresolved(RecfmtError::Conversion { .. })
        ));
    }

    #[test]
    fn test_recover_record_modes() {
        assert!(recover_record(ErrorMode::IgnoreAndContinue, conversion_error(), |_| false).is_ok());
        assert!(recover_record(ErrorMode::ThrowAndStop, conversion_error(), |_| true).is_err());
        assert!(recover_record(ErrorMode::ReportAndContinue, conversion_error(), |_| true).is_ok());
        assert!(recover_record(ErrorMode::ReportAndContinue, conversion_error(), |_| false).is_err());
    }

    #[test]
    fn test_recover_record_never_swallows_fatal_errors() {
        let err = recover_record(
            ErrorMode::IgnoreAndContinue,
            RecfmtError::Parser("column count".to_string()),
            |_| true,
        )
        .unwrap_err();
        assert!(matches!(err, RecfmtError::Parser(_)));
    }
}
