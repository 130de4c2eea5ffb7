//! Error types for the megafs library.

use thiserror::Error;

use crate::api::ErrorCode;

/// Main error type for megafs operations.
#[derive(Error, Debug)]
pub enum MegaError {
    /// MEGA API returned an error code.
    #[error("API error {}: {message}", .code.code())]
    Api { code: ErrorCode, message: String },

    /// HTTP request failed with status code.
    #[error("HTTP error: {0}")]
    HttpError(u16),

    /// Network request error.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Reading or writing local data failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Base64 decoding error.
    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// Node attributes could not be decrypted or parsed.
    #[error("Bad attribute: {0}")]
    BadAttribute(String),

    /// Whole-file MAC did not match the node's expected MAC.
    #[error("MAC verification failed")]
    MacMismatch,

    /// A node or key could not be found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller passed an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid or unexpected response from server.
    #[error("Invalid response from server")]
    InvalidResponse,

    /// Operation not allowed in the current session state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Operation was cancelled through a cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

impl MegaError {
    /// Build an API error from a protocol error code.
    pub fn api(code: ErrorCode) -> Self {
        MegaError::Api {
            code,
            message: code.description(),
        }
    }

    /// Numeric protocol code carried by this error, if any.
    ///
    /// Local failures that have a protocol-style counterpart (bad response,
    /// MAC mismatch, bad attribute) report their local code.
    pub fn code(&self) -> Option<i64> {
        match self {
            MegaError::Api { code, .. } => Some(code.code()),
            MegaError::InvalidResponse => Some(ErrorCode::BadResponse.code()),
            MegaError::MacMismatch => Some(ErrorCode::MacMismatch.code()),
            MegaError::BadAttribute(_) => Some(ErrorCode::BadAttribute.code()),
            _ => None,
        }
    }

    /// Whether this is the server's "try again" signal.
    pub fn is_again(&self) -> bool {
        matches!(
            self,
            MegaError::Api {
                code: ErrorCode::Again,
                ..
            }
        )
    }

    /// Whether this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MegaError::Cancelled)
    }
}

/// Result type alias for megafs operations.
pub type Result<T> = std::result::Result<T, MegaError>;
