//! Error types for storage backends.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An operation addressed a key holding the wrong keyspace kind,
    /// e.g. a hash operation against a list key.
    #[error("wrong keyspace kind for key {key}: expected {expected}")]
    WrongKind {
        /// The key that was addressed.
        key: String,
        /// The keyspace kind the operation required.
        expected: &'static str,
    },

    /// I/O error from a store that talks to the outside world.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store connection is unusable.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

impl StorageError {
    /// Creates a wrong-kind error.
    #[must_use]
    pub fn wrong_kind(key: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongKind {
            key: key.into(),
            expected,
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
