//! File-based storage implementation.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{DiskIndexError, Result};
use crate::storage::traits::{IoTuning, StorageError, StorageInput, StorageOutput};

/// A buffered, append-only file output.
#[derive(Debug)]
pub struct FileOutput {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    sync_on_close: bool,
    position: u64,
}

impl FileOutput {
    /// Create (or truncate) the file at `path` for writing.
    pub fn create<P: AsRef<Path>>(path: P, tuning: &IoTuning) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| StorageError::IoError(format!("{}: {e}", path.display())))?;

        Ok(FileOutput {
            path,
            writer: Some(BufWriter::with_capacity(
                tuning.effective_buffer_size(),
                file,
            )),
            sync_on_close: tuning.sync_on_close,
            position: 0,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer_mut(&mut self) -> std::io::Result<&mut BufWriter<File>> {
        let path = &self.path;
        self.writer.as_mut().ok_or_else(|| {
            std::io::Error::other(StorageError::Closed(path.display().to_string()))
        })
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let bytes_written = self.writer_mut()?.write(buf)?;
        self.position += bytes_written as u64;
        Ok(bytes_written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer_mut()?.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        let path = self.path.display().to_string();
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| StorageError::Closed(path.clone()))?;

        writer
            .flush()
            .map_err(|e| DiskIndexError::storage(format!("Failed to flush {path}: {e}")))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| DiskIndexError::storage(format!("Failed to sync {path}: {e}")))?;

        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        let path = self.path.display().to_string();

        writer
            .flush()
            .map_err(|e| DiskIndexError::storage(format!("Failed to flush {path}: {e}")))?;
        if self.sync_on_close {
            writer
                .get_ref()
                .sync_all()
                .map_err(|e| DiskIndexError::storage(format!("Failed to sync {path}: {e}")))?;
        }
        Ok(())
    }
}

/// A file input that is read sequentially.
#[derive(Debug)]
pub struct FileInput {
    path: PathBuf,
    file: File,
    size: u64,
}

impl FileInput {
    /// Open the file at `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::FileNotFound(path.display().to_string())
            } else {
                StorageError::IoError(format!("{}: {e}", path.display()))
            }
        })?;
        let size = file
            .metadata()
            .map_err(|e| DiskIndexError::storage(format!("Failed to get file metadata: {e}")))?
            .len();

        Ok(FileInput { path, file, size })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the remaining content of the file.
    pub fn read_all(mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(self.size as usize);
        self.file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn close(&mut self) -> Result<()> {
        // The file is closed when dropped
        Ok(())
    }
}

/// Remove `path`, treating a missing file as success.
///
/// Returns whether a file was actually removed.
pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> Result<bool> {
    match std::fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::IoError(format!(
            "Failed to delete {}: {e}",
            path.as_ref().display()
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_read_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.bin");

        let mut output = FileOutput::create(&path, &IoTuning::default()).unwrap();
        output.write_all(b"Hello, World!").unwrap();
        assert_eq!(output.position(), 13);
        output.close().unwrap();

        let input = FileInput::open(&path).unwrap();
        assert_eq!(input.size().unwrap(), 13);
        assert_eq!(input.read_all().unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_write_after_close_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("closed.bin");

        let mut output = FileOutput::create(&path, &IoTuning::default().sync_on_close(true)).unwrap();
        output.close().unwrap();
        // Closing again is harmless
        output.close().unwrap();
        assert!(output.write_all(b"late").is_err());
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("file.bin");

        let result = FileOutput::create(&path, &IoTuning::default());
        assert!(matches!(result, Err(DiskIndexError::Storage(_))));
    }

    #[test]
    fn test_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileInput::open(temp_dir.path().join("nonexistent.bin"));
        assert!(result.is_err());
    }

    #[test]
    fn test_remove_if_exists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone.bin");
        std::fs::write(&path, b"x").unwrap();

        assert!(remove_if_exists(&path).unwrap());
        assert!(!remove_if_exists(&path).unwrap());
    }
}
