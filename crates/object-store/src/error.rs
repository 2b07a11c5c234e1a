//! Error types for the encrypted object store.

/// Errors that can occur when working with the encrypted object store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Network or remote-service failure, including HTTP-level error codes
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote object (or bucket) does not exist
    #[error("object not found: {0}")]
    NotFound(String),

    /// Authentication tag mismatch, truncation or a malformed stream header.
    /// Signals tampering or a wrong key.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Entropy source or key derivation failure
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    /// Missing or invalid bucket, endpoint, credentials or master secret
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Put/Get/Delete was called before the bucket was initialized
    #[error("storage adapter used before initialization")]
    NotInitialized,

    /// The byte stream produced a different number of bytes than declared
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// The payload is larger than a single encrypted stream can address
    #[error("payload of {size} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { size: u64, max: u64 },

    /// A logical filename that is empty after sanitization
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// IO error from a local byte stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether this error means the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Whether this error means the ciphertext failed authentication.
    pub fn is_integrity(&self) -> bool {
        matches!(self, StorageError::Integrity(_))
    }
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            e => StorageError::Transport(e.to_string()),
        }
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
