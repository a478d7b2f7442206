//! Core error types for rewind.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
///
/// Every variant aborts a whole trace load: there is nothing to replay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Trace input is missing, empty, or unparseable
    #[error("Format error: {reason}")]
    Format {
        /// What was wrong with the input
        reason: String,
    },

    /// Trace input parsed but is structurally invalid
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Offending field or record
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Trace file could not be read
    #[error("Cannot read {path}: {reason}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying I/O message
        reason: String,
    },

    /// Invalid timestamp
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp {
        /// Why the value was rejected
        reason: String,
    },
}

impl CoreError {
    /// Shorthand for a format error
    pub fn format(reason: impl Into<String>) -> Self {
        Self::Format {
            reason: reason.into(),
        }
    }

    /// Shorthand for a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the FormatError class.
    ///
    /// Unreadable files are format failures from the caller's point of view.
    #[must_use]
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. } | Self::Io { .. })
    }

    /// Whether this error belongs to the ValidationError class
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::InvalidTimestamp { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format {
            reason: err.to_string(),
        }
    }
}
