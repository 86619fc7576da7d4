//! Error types for record serialization.
//!
//! This module provides the [`RecfmtError`] type for all library operations
//! and the [`Result`] convenience type.
//!
//! Errors fall into two groups. Fatal errors ([`RecfmtError::is_fatal`]) signal a
//! broken schema or a structural mismatch and always unwind the whole run. All
//! other errors are data errors: they go through the field or record error mode
//! before they ever reach the caller.

use std::fmt;

use thiserror::Error;

/// Stage of the recovery chain at which a field failure was finally reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    /// The original conversion or validation failure, with nothing configured to
    /// recover from it.
    Original,
    /// The fallback or default value was tried and failed re-validation.
    Fallback,
}

impl fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => write!(f, "original value"),
            Self::Fallback => write!(f, "fallback value"),
        }
    }
}

/// Error type for all record serialization operations.
#[derive(Error, Debug)]
pub enum RecfmtError {
    /// The schema violates a configuration contract. Raised by `validate()`
    /// before any record is processed.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A configured field has no value source in the record.
    #[error("No matching value source found in the record for '{0}' field")]
    MissingField(String),

    /// A converter rejected a field value.
    #[error("Failed to convert '{field}' field: {message}")]
    Conversion {
        /// Logical field name
        field: String,
        /// Converter failure message
        message: String,
    },

    /// A validator rejected a field value.
    #[error("Validation failed for '{field}' field: {message}")]
    Validation {
        /// Logical field name
        field: String,
        /// Validator failure message
        message: String,
    },

    /// Object-level validation rejected a fully resolved record.
    #[error("Record validation failed: {0}")]
    ObjectValidation(String),

    /// A field failure that the recovery chain could not resolve.
    #[error("Failed to resolve '{field}' field ({stage}): {source}")]
    FieldRecovery {
        /// Logical field name
        field: String,
        /// Stage at which recovery gave up
        stage: RecoveryStage,
        /// Underlying failure
        #[source]
        source: Box<RecfmtError>,
    },

    /// A rendered value is longer than its configured size and truncation is off.
    #[error("Field value length overflowed for '{field}' member [Expected: {expected}, Actual: {actual}]")]
    LengthOverflow {
        /// Logical field name
        field: String,
        /// Configured size
        expected: usize,
        /// Rendered length
        actual: usize,
    },

    /// Text normalization failed for a reason other than length.
    #[error("Format error: {0}")]
    Format(String),

    /// Structural failure of the record stream (strict column checks, malformed input).
    #[error("Parser error: {0}")]
    Parser(String),

    /// IO error from the underlying sink or source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecfmtError {
    /// Returns `true` for errors that bypass every error-mode policy.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::MissingField(_) | Self::Parser(_) | Self::Io(_)
        )
    }

    /// Returns the logical field name the error is about, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField(field) => Some(field),
            Self::Conversion { field, .. }
            | Self::Validation { field, .. }
            | Self::FieldRecovery { field, .. }
            | Self::LengthOverflow { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Convenience type alias for [`std::result::Result`] with [`RecfmtError`].
pub type Result<T> = std::result::Result<T, RecfmtError>;
