//! Error types shared by every storage backend.

use bytes::Bytes;
use thiserror::Error;

/// Errors returned by storage operations.
///
/// Set, remove and drop operations never fail; only lookups that require a
/// value, canceled transactions and snapshot I/O produce errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A required key is missing or has expired
    #[error("key not found: {}", String::from_utf8_lossy(.key))]
    NotFound { key: Bytes },

    /// The transaction callback declined to commit
    #[error("transaction canceled")]
    Canceled,

    /// A snapshot stream could not be decoded
    #[error("corrupt snapshot: {0}")]
    Decode(String),

    /// Reading or writing a snapshot stream failed
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        StorageError::Decode(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StorageError>;
