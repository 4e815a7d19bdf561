//! Unified error handling for the rollcall crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, so that failures can cross module
//! boundaries without losing their classification.
//!
//! # Architecture
//!
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum for all operations
//!
//! Rejected operations (missing referent, malformed input, capacity refusal,
//! duplicate admin action) are ordinary variants here, never panics: the
//! caller decides how to surface them. Delivery failures carry their own
//! variant because they are logged and swallowed at the call site rather than
//! propagated (the state change that triggered them always stands).

use std::io;
use thiserror::Error;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A referenced series/instance/tenant does not exist
    NotFound,
    /// Malformed input rejected before any state change
    Validation,
    /// A vote or admin action refused by business rules
    Refused,
    /// Outbound message delivery problems
    Delivery,
    /// Storage and I/O errors
    Storage,
    /// Configuration errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the rollcall crate
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced entity absent; never retried automatically
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Malformed recurrence definition or date input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Additive vote would push headcount over the series limit
    #[error("capacity exceeded: {remaining} slot(s) left")]
    CapacityExceeded { remaining: u32 },

    /// Admin tried to add a participant whose latest action is already JOIN
    #[error("actor {actor} already joined instance {instance}")]
    AlreadyJoined { actor: String, instance: String },

    /// Re-announce requested while a message handle already exists
    #[error("instance {0} already announced")]
    AlreadyAnnounced(String),

    /// Outbound delivery failure (publish, edit, admin notice)
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Database errors
    #[error("database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::CapacityExceeded { .. }
            | Self::AlreadyJoined { .. }
            | Self::AlreadyAnnounced(_) => ErrorCategory::Refused,
            Self::Delivery(_) | Self::Http(_) => ErrorCategory::Delivery,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Other,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        // Transient transport problems; a later retry may succeed
        matches!(self, Self::Delivery(_) | Self::Http(_) | Self::Io(_))
    }

    /// Create a NotFound error for a series id
    pub fn series_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "series",
            id: id.into(),
        }
    }

    /// Create a NotFound error for an instance id
    pub fn instance_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "instance",
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }
}

// Conversion from rusqlite::Error
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = Error::instance_not_found("abc");
        assert_eq!(err.category(), ErrorCategory::NotFound);

        let err = Error::CapacityExceeded { remaining: 1 };
        assert_eq!(err.category(), ErrorCategory::Refused);

        let err = Error::validation("bad rule");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::delivery("timeout").is_recoverable());
        assert!(!Error::validation("bad rule").is_recoverable());
        assert!(!Error::CapacityExceeded { remaining: 0 }.is_recoverable());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::series_not_found("s-1");
        assert_eq!(err.to_string(), "series s-1 not found");

        let err = Error::CapacityExceeded { remaining: 2 };
        assert!(err.to_string().contains("2 slot(s) left"));
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing sqlite path");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }
}
