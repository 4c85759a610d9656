//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding rows.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON encoding or decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR encoding failed.
    #[error("CBOR encode error: {message}")]
    CborEncode {
        /// Description of the failure.
        message: String,
    },

    /// CBOR decoding failed.
    #[error("CBOR decode error: {message}")]
    CborDecode {
        /// Description of the failure.
        message: String,
    },
}

impl CodecError {
    /// Creates a CBOR encode error.
    pub fn cbor_encode(message: impl Into<String>) -> Self {
        Self::CborEncode {
            message: message.into(),
        }
    }

    /// Creates a CBOR decode error.
    pub fn cbor_decode(message: impl Into<String>) -> Self {
        Self::CborDecode {
            message: message.into(),
        }
    }
}
