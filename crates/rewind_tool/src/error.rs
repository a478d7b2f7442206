//! Errors raised at the capability boundary.

use serde::{Deserialize, Serialize};

/// What went wrong in a live call.
///
/// Whether a kind is worth retrying is decided by the replay crate's retry
/// executor, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "code")]
pub enum ExecutionErrorKind {
    /// Remote answered with an HTTP-style status code
    Status(u16),
    /// Transport-level timeout
    Timeout,
    /// Transport-level connection failure
    Connection,
    /// Explicitly transient, safe to retry
    Transient,
    /// Explicitly permanent, never retried
    Permanent,
}

impl std::fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(code) => write!(f, "status_{}", code),
            Self::Timeout => write!(f, "timeout"),
            Self::Connection => write!(f, "connection"),
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Failure of a live tool, LLM, or retrieval call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    /// Failure class
    pub kind: ExecutionErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl ExecutionError {
    /// Create an error of any kind
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Remote returned a status code
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Status(code), message)
    }

    /// Transport timeout
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Timeout, message)
    }

    /// Transport connection failure
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Connection, message)
    }

    /// Explicitly retryable failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Transient, message)
    }

    /// Explicitly non-retryable failure
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Permanent, message)
    }
}

/// Error resolving a capability for execution.
///
/// These stop the replay request before any live call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Execution was forced for a name no capability answers to
    #[error("Execution requested for unregistered operation: {name}")]
    NotRegistered {
        /// Operation name
        name: String,
    },

    /// Execution was forced for a blocklisted name
    #[error("Execution requested for blocked operation: {name}")]
    Blocked {
        /// Operation name
        name: String,
    },

    /// A tool with this name is already registered
    #[error("Tool already registered: {name}")]
    AlreadyRegistered {
        /// Tool name
        name: String,
    },

    /// An LLM span needs re-execution but no provider was supplied
    #[error("LLM span {span_id} needs execution but no LLM provider is configured")]
    MissingLlmProvider {
        /// Span that needed the provider
        span_id: String,
    },

    /// A retrieval span was forced but no backend was supplied
    #[error("Retrieval {name} forced but no retrieval backend is configured")]
    MissingRetrievalBackend {
        /// Operation name
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_display() {
        let err = ExecutionError::status(429, "rate limited");
        assert_eq!(err.to_string(), "status_429: rate limited");

        let err = ExecutionError::timeout("read timed out");
        assert_eq!(err.to_string(), "timeout: read timed out");
    }

    #[test]
    fn test_execution_error_serialization() {
        let err = ExecutionError::status(503, "unavailable");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"]["type"], "status");
        assert_eq!(json["kind"]["code"], 503);
        let back: ExecutionError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::Blocked {
            name: "delete_file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Execution requested for blocked operation: delete_file"
        );
    }
}
