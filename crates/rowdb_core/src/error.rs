//! Error types for the RowDB engine.

use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] rowdb_storage::StorageError),

    /// Row codec error.
    #[error("codec error: {0}")]
    Codec(#[from] rowdb_codec::CodecError),

    /// Schema or wiring problem: missing primary key, unattached
    /// backend alias, unsupported backend capability.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// An operation was used against the wrong object shape or state:
    /// mutation of an archived/history row, relation access before
    /// prefetch, foreign key set from the wrong relationship side.
    #[error("invalid call: {message}")]
    InvalidCall {
        /// Description of the misuse.
        message: String,
    },

    /// A query expected to yield exactly one row found zero or several.
    #[error("unexpected result: {message}")]
    ResultMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// The optimistic-concurrency retry budget was exhausted.
    #[error("optimistic locking failed after {attempts} attempts: {message}")]
    Locking {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The last conflict observation.
        message: String,
    },
}

impl CoreError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid-call error.
    pub fn invalid_call(message: impl Into<String>) -> Self {
        Self::InvalidCall {
            message: message.into(),
        }
    }

    /// Creates a result-mismatch error.
    pub fn result_mismatch(message: impl Into<String>) -> Self {
        Self::ResultMismatch {
            message: message.into(),
        }
    }

    /// Creates a locking error.
    pub fn locking(attempts: u32, message: impl Into<String>) -> Self {
        Self::Locking {
            attempts,
            message: message.into(),
        }
    }
}
