//! Error types for diskindex.
//!
//! All fallible operations return [`Result`], whose error type is
//! [`DiskIndexError`].
//!
//! # Examples
//!
//! ```
//! use diskindex::error::{DiskIndexError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(DiskIndexError::invalid_write_sequence("word number 3 <= 5"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for diskindex operations.
#[derive(Error, Debug)]
pub enum DiskIndexError {
    /// I/O errors (file creation, reads, writes, syncs).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The caller broke the write protocol: out-of-order word numbers,
    /// the reserved sentinel, non-increasing doc ids, or a call in the
    /// wrong writer state. The segment being built must be discarded.
    #[error("Invalid write sequence: {0}")]
    InvalidWriteSequence(String),

    /// Index format errors (bad magic, corrupt block, checksum mismatch).
    #[error("Index error: {0}")]
    Index(String),

    /// Schema-related errors.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Storage-related errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Header or parameter serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with DiskIndexError.
pub type Result<T> = std::result::Result<T, DiskIndexError>;

impl DiskIndexError {
    /// Create a new write sequence error.
    pub fn invalid_write_sequence<S: Into<String>>(msg: S) -> Self {
        DiskIndexError::InvalidWriteSequence(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        DiskIndexError::Index(msg.into())
    }

    /// Create a new schema error.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        DiskIndexError::Schema(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        DiskIndexError::Storage(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        DiskIndexError::Serialization(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DiskIndexError::Other(msg.into())
    }

    /// Whether this error is a protocol violation rather than an I/O or
    /// format problem.
    pub fn is_invalid_write_sequence(&self) -> bool {
        matches!(self, DiskIndexError::InvalidWriteSequence(_))
    }
}

impl From<bincode::Error> for DiskIndexError {
    fn from(err: bincode::Error) -> Self {
        DiskIndexError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = DiskIndexError::invalid_write_sequence("word number 2 <= 7");
        assert_eq!(
            error.to_string(),
            "Invalid write sequence: word number 2 <= 7"
        );
        assert!(error.is_invalid_write_sequence());

        let error = DiskIndexError::index("bad magic");
        assert_eq!(error.to_string(), "Index error: bad magic");
        assert!(!error.is_invalid_write_sequence());

        let error = DiskIndexError::schema("no such field");
        assert_eq!(error.to_string(), "Schema error: no such field");

        let error = DiskIndexError::storage("disk full");
        assert_eq!(error.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_error_from_io() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = DiskIndexError::from(io_error);

        match error {
            DiskIndexError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
