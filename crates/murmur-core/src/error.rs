//! Error types for Murmur core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Errors are descriptive at the core level; the CLI layer will map these
//! to user-friendly messages.
//!
//! A locked tag is deliberately absent from this enum: "the key is not
//! available right now" is an expected state and is modelled by the
//! `Locked` / `DeferredPlaintext` outcome variants in the coordinator.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for Murmur operations.
pub type Result<T> = std::result::Result<T, MurmurError>;

/// Core error type for Murmur operations.
#[derive(Debug, Error)]
pub enum MurmurError {
    /// Wrong PIN. Carries no detail about which check failed.
    #[error("Not authorized")]
    AuthorizationFailure,

    /// Ciphertext could not be opened (tag mismatch, truncation, wrong key)
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Decrypted bytes are not valid UTF-8
    #[error("Decrypted content is not valid text: {0}")]
    Encoding(String),

    /// Secret store read/write failure
    #[error("Secret store error: {0}")]
    Store(String),

    /// Key derivation, sealing or randomness failure
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend error (generic)
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite-specific storage error
    #[error("SQLite error: {source}")]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },

    /// Journal database not found
    #[error("Journal not found")]
    JournalNotFound,

    /// Entry not found by ID
    #[error("Entry not found: {0}")]
    EntryNotFound(Uuid),

    /// Tag not found by ID or name
    #[error("Tag not found: {0}")]
    TagNotFound(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl MurmurError {
    /// True for failures that mean stored data cannot be read back.
    pub fn is_data_corruption(&self) -> bool {
        matches!(self, MurmurError::Decryption(_) | MurmurError::Encoding(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_failure_has_no_detail() {
        let message = MurmurError::AuthorizationFailure.to_string();
        assert_eq!(message, "Not authorized");
    }

    #[test]
    fn test_corruption_classification() {
        assert!(MurmurError::Decryption("tag mismatch".into()).is_data_corruption());
        assert!(MurmurError::Encoding("invalid utf-8".into()).is_data_corruption());
        assert!(!MurmurError::Store("keychain".into()).is_data_corruption());
    }
}
