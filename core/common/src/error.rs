//! Common error types for framevault.

use thiserror::Error;

/// Top-level error type for framevault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame line or its metadata is malformed or fails its integrity tag.
    #[error("Format error: {0}")]
    Format(String),

    /// Cipher operation failed (unknown mode, bad nonce, authentication).
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Key derivation failed.
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// An object could not be rebuilt from its segments.
    #[error("Reconstruction error: {0}")]
    Reconstruction(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict detected.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Error {
    /// Whether this error came from frame parsing or validation.
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }

    /// Whether this error is a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
