//! Error types for trackfeed.
//!
//! This module defines all error types used throughout the trackfeed crate.
//! The variants follow the service's error taxonomy: validation and not-found
//! conditions are client errors, storage failures are surfaced distinctly, and
//! delivery failures are reported but never fatal.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for trackfeed operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A persistence call failed. Nothing was committed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Request Errors ===
    /// Malformed input from a caller (bad id, missing field, ...).
    #[error("invalid request: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// The requested entity does not exist.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up, e.g. `track 7`.
        what: String,
    },

    /// The ticker cursor does not match the arrival timestamp of any stored track.
    #[error("invalid cursor: no track arrived at {cursor}")]
    InvalidCursor {
        /// The rejected cursor timestamp.
        cursor: i64,
    },

    // === Track Source Errors ===
    /// Downloading a track file failed.
    #[error("failed to fetch track from {url}: {message}")]
    TrackFetch {
        /// The URL that was requested.
        url: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The downloaded content is not a usable IGC file.
    #[error("failed to parse track: {message}")]
    TrackParse {
        /// Description of what went wrong.
        message: String,
    },

    // === Notification Errors ===
    /// A webhook notification could not be delivered.
    #[error("failed to notify {url}: {message}")]
    NotificationDelivery {
        /// The webhook URL.
        url: String,
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for trackfeed operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new not-found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a track fetch error.
    #[must_use]
    pub fn track_fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TrackFetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a track parse error.
    #[must_use]
    pub fn track_parse(message: impl Into<String>) -> Self {
        Self::TrackParse {
            message: message.into(),
        }
    }

    /// Create a notification delivery error.
    #[must_use]
    pub fn notification_delivery(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotificationDelivery {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Check if this error is caused by the caller's input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InvalidCursor { .. }
                | Self::TrackFetch { .. }
                | Self::TrackParse { .. }
        )
    }

    /// Check if this error means the entity does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error came from the persistence layer.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::DatabaseOpen { .. } | Self::DatabaseMigration { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("track 7");
        assert_eq!(err.to_string(), "track 7 not found");

        let err = Error::validation("id must be an integer");
        assert_eq!(err.to_string(), "invalid request: id must be an integer");
    }

    #[test]
    fn test_invalid_cursor_display() {
        let err = Error::InvalidCursor { cursor: 1234 };
        assert!(err.to_string().contains("1234"));
    }

    #[test]
    fn test_is_client_error() {
        assert!(Error::validation("bad").is_client_error());
        assert!(Error::InvalidCursor { cursor: 1 }.is_client_error());
        assert!(Error::track_parse("no fixes").is_client_error());
        assert!(Error::track_fetch("http://x", "404").is_client_error());
        assert!(!Error::not_found("track 1").is_client_error());
        assert!(!Error::internal("boom").is_client_error());
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::not_found("webhook 3").is_not_found());
        assert!(!Error::validation("bad").is_not_found());
    }

    #[test]
    fn test_from_rusqlite_error_is_storage_unavailable() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(err.is_storage_error());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_notification_delivery_display() {
        let err = Error::notification_delivery("http://hook.example", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("http://hook.example"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
        assert!(err.is_storage_error());
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "page_size must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
