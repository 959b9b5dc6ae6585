//! Error types for dashvault.
//!
//! This module defines all error types used throughout the dashvault crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for dashvault operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Database Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

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

    // === Substrate Errors ===
    /// Reading a key from the key-value substrate failed.
    #[error("failed to read key '{key}': {message}")]
    StorageRead {
        /// The key being read.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Writing a key to the key-value substrate failed.
    #[error("failed to write key '{key}': {message}")]
    StorageWrite {
        /// The key being written.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The substrate refused a write because it would exceed its quota.
    #[error("storage quota exceeded writing '{key}' ({needed} bytes needed, {quota} allowed)")]
    QuotaExceeded {
        /// The key being written.
        key: String,
        /// Total bytes the substrate would hold after the write.
        needed: usize,
        /// Configured quota in bytes.
        quota: usize,
    },

    // === Record Errors ===
    /// A user record (or one of its nested entries) failed validation.
    #[error("invalid user record: {message}")]
    InvalidRecord {
        /// Description of the validation failure.
        message: String,
    },

    /// A referenced entry does not exist in the user record.
    #[error("{kind} not found: {id}")]
    EntryNotFound {
        /// What kind of entry was looked up (medication, card, ...).
        kind: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    // === Account Errors ===
    /// Email or password did not match a registered account.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// An account with the same email already exists.
    #[error("user with email {email} already exists")]
    AccountExists {
        /// The conflicting email.
        email: String,
    },

    /// A password is shorter than the accepted minimum.
    #[error("password must be at least {min} characters")]
    PasswordTooShort {
        /// Minimum length in characters.
        min: usize,
    },

    /// A password reset token is unknown, already used, or expired.
    #[error("invalid or expired reset token")]
    InvalidResetToken,

    /// No account is signed in and no user was given explicitly.
    #[error("no user is signed in; pass --user or sign in first")]
    NotSignedIn,

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for dashvault operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new invalid record error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a storage write error.
    #[must_use]
    pub fn storage_write(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageWrite {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a storage read error.
    #[must_use]
    pub fn storage_read(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageRead {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an entry-not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::EntryNotFound {
            kind,
            id: id.into(),
        }
    }

    /// Check if this error means a write did not reach the substrate.
    #[must_use]
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::StorageWrite { .. } | Self::QuotaExceeded { .. })
    }

    /// Check if this error is a rejected record payload.
    #[must_use]
    pub fn is_invalid_record(&self) -> bool {
        matches!(self, Self::InvalidRecord { .. } | Self::Json(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidCredentials;
        assert_eq!(err.to_string(), "invalid email or password");

        let err = Error::invalid_record("pillsPerDose must be greater than 0");
        assert_eq!(
            err.to_string(),
            "invalid user record: pillsPerDose must be greater than 0"
        );
    }

    #[test]
    fn test_quota_exceeded_display() {
        let err = Error::QuotaExceeded {
            key: "user_data_alice".to_string(),
            needed: 6000,
            quota: 5000,
        };
        let msg = err.to_string();
        assert!(msg.contains("user_data_alice"));
        assert!(msg.contains("6000"));
        assert!(msg.contains("5000"));
    }

    #[test]
    fn test_is_write_failure() {
        assert!(Error::storage_write("k", "disk full").is_write_failure());
        assert!(Error::QuotaExceeded {
            key: "k".to_string(),
            needed: 2,
            quota: 1
        }
        .is_write_failure());
        assert!(!Error::InvalidCredentials.is_write_failure());
        assert!(!Error::storage_read("k", "gone").is_write_failure());
    }

    #[test]
    fn test_is_invalid_record() {
        assert!(Error::invalid_record("bad").is_invalid_record());

        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        assert!(Error::from(json_err).is_invalid_record());
        assert!(!Error::NotSignedIn.is_invalid_record());
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("medication", "abc123");
        assert_eq!(err.to_string(), "medication not found: abc123");
    }

    #[test]
    fn test_account_exists_display() {
        let err = Error::AccountExists {
            email: "a@example.com".to_string(),
        };
        assert!(err.to_string().contains("a@example.com"));
    }

    #[test]
    fn test_password_too_short_display() {
        let err = Error::PasswordTooShort { min: 6 };
        assert_eq!(err.to_string(), "password must be at least 6 characters");
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_storage_read_display() {
        let err = Error::storage_read("user_data_bob", "connection closed");
        let msg = err.to_string();
        assert!(msg.contains("user_data_bob"));
        assert!(msg.contains("connection closed"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "key_prefix must not be empty".to_string(),
        };
        assert!(err.to_string().contains("key_prefix"));
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

    #[test]
    fn test_not_signed_in_display() {
        assert!(Error::NotSignedIn.to_string().contains("--user"));
    }
}
