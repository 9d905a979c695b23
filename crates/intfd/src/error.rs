//! Error types for intfd.

use std::io;
use thiserror::Error;

/// Result type alias for intfd operations.
pub type IntfdResult<T> = Result<T, IntfdError>;

/// Errors raised by the interface daemon.
///
/// The arbiter itself cannot fail; these cover the store, configuration and
/// control plumbing around it.
#[derive(Debug, Error)]
pub enum IntfdError {
    /// Store read or write failed.
    #[error("Database operation failed: {operation}: {message}")]
    Store {
        /// The operation that failed (e.g., "hgetall", "write").
        operation: String,
        /// Error message.
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Deletion of an interface row was refused.
    #[error("Deletion of interface '{interface}' rejected: {reason}")]
    DeletionRejected {
        /// The interface name.
        interface: String,
        /// Why it cannot be deleted.
        reason: String,
    },

    /// Interface is not known to the daemon.
    #[error("Interface '{interface}' not found")]
    UnknownInterface {
        /// The interface name.
        interface: String,
    },

    /// Malformed control socket request.
    #[error("Control request failed: {message}")]
    Control {
        /// Error message.
        message: String,
    },

    /// Socket or file I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl IntfdError {
    /// Creates a store error.
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a deletion rejected error.
    pub fn deletion_rejected(interface: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeletionRejected {
            interface: interface.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown interface error.
    pub fn unknown_interface(interface: impl Into<String>) -> Self {
        Self::UnknownInterface {
            interface: interface.into(),
        }
    }

    /// Creates a control request error.
    pub fn control(message: impl Into<String>) -> Self {
        Self::Control {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IntfdError::Store { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error() {
        let err = IntfdError::store("hgetall", "Connection refused");
        assert_eq!(
            err.to_string(),
            "Database operation failed: hgetall: Connection refused"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_deletion_rejected() {
        let err = IntfdError::deletion_rejected("1", "Physical interfaces cannot be deleted");
        assert_eq!(
            err.to_string(),
            "Deletion of interface '1' rejected: Physical interfaces cannot be deleted"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_is_retryable() {
        assert!(!IntfdError::unknown_interface("2").is_retryable());
        assert!(!IntfdError::invalid_config("redis_port", "must be > 0").is_retryable());
        assert!(!IntfdError::control("empty request").is_retryable());
    }
}
