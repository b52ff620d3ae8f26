//! Storage traits and common types.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{DiskIndexError, Result};

/// A trait for reading data from storage.
pub trait StorageInput: Read + Send + std::fmt::Debug {
    /// Get the size of the input stream.
    fn size(&self) -> Result<u64>;

    /// Close the input stream.
    fn close(&mut self) -> Result<()>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Get the current position in the output stream.
    fn position(&self) -> u64;

    /// Close the output stream. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn position(&self) -> u64 {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// I/O tuning for sequential segment writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoTuning {
    /// Buffer size for write operations.
    pub buffer_size: usize,

    /// Whether to fsync each file when it is closed.
    pub sync_on_close: bool,

    /// Direct I/O hint. Buffers are rounded up to [`DIRECT_IO_ALIGNMENT`];
    /// the page cache is still used.
    pub direct_io: bool,
}

/// Alignment applied to buffers when the direct I/O hint is set.
pub const DIRECT_IO_ALIGNMENT: usize = 4096;

impl IoTuning {
    /// Enable or disable fsync on close.
    pub fn sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    /// Set the write buffer size.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the direct I/O hint.
    pub fn direct_io(mut self, direct_io: bool) -> Self {
        self.direct_io = direct_io;
        self
    }

    /// Buffer size after applying the direct I/O alignment.
    pub fn effective_buffer_size(&self) -> usize {
        let size = self.buffer_size.max(1);
        if self.direct_io {
            size.div_ceil(DIRECT_IO_ALIGNMENT) * DIRECT_IO_ALIGNMENT
        } else {
            size
        }
    }
}

impl Default for IoTuning {
    fn default() -> Self {
        IoTuning {
            buffer_size: 65536, // 64KB buffer for better I/O performance
            sync_on_close: false,
            direct_io: false,
        }
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// I/O error.
    IoError(String),

    /// Output already closed.
    Closed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::Closed(name) => write!(f, "Output is closed: {name}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for DiskIndexError {
    fn from(err: StorageError) -> Self {
        DiskIndexError::storage(err.to_string())
    }
}
