//! Structured file I/O for binary data serialization.
//!
//! [`StructWriter`] frames primitive values (little-endian fixed width,
//! varints, length-prefixed strings) and keeps a running CRC32 of every byte
//! it emits; closing appends the checksum as a 4-byte trailer.
//! [`StructReader`] verifies the trailer up front and then decodes the body.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{DiskIndexError, Result};
use crate::storage::file::FileInput;
use crate::storage::traits::StorageOutput;
use crate::util::varint::{self, encode_u64};

/// Size of the checksum trailer at the end of each file.
pub const CHECKSUM_TRAILER_LEN: usize = 4;

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: Hasher,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_raw(&[value])
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a f64 value (little-endian).
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let encoded = encode_u64(value);
        self.write_raw(&encoded)
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.write_raw(value)
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.hasher.update(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Checksum of everything written so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Append the checksum trailer, then flush and close the output.
    pub fn close(mut self) -> Result<()> {
        let checksum = self.checksum();
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.writer.close()
    }
}

impl<W: StorageOutput> Write for StructWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl<W: StorageOutput> std::fmt::Debug for StructWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructWriter")
            .field("writer", &self.writer)
            .field("position", &self.position)
            .finish()
    }
}

/// A structured reader over a checksum-verified file body.
#[derive(Debug)]
pub struct StructReader {
    reader: Cursor<Vec<u8>>,
}

impl StructReader {
    /// Read the whole file at `path`, verify its checksum trailer and
    /// position the reader at the start of the body.
    pub fn open_verified<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = FileInput::open(path)?.read_all()?;
        Self::from_verified_bytes(bytes)
            .map_err(|e| DiskIndexError::index(format!("{}: {e}", path.display())))
    }

    /// Verify the checksum trailer of `bytes` and strip it.
    pub fn from_verified_bytes(mut bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < CHECKSUM_TRAILER_LEN {
            return Err(DiskIndexError::index("file too short for checksum trailer"));
        }
        let body_len = bytes.len() - CHECKSUM_TRAILER_LEN;
        let stored = (&bytes[body_len..]).read_u32::<LittleEndian>()?;
        let actual = crc32fast::hash(&bytes[..body_len]);
        if stored != actual {
            return Err(DiskIndexError::index(format!(
                "checksum mismatch: stored {stored:08x}, computed {actual:08x}"
            )));
        }
        bytes.truncate(body_len);
        Ok(StructReader {
            reader: Cursor::new(bytes),
        })
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.reader.read_u8()?)
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.reader.read_u32::<LittleEndian>()?)
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.reader.read_u64::<LittleEndian>()?)
    }

    /// Read a f64 value (little-endian).
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(self.reader.read_f64::<LittleEndian>()?)
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        varint::read_u64(&mut self.reader)
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| DiskIndexError::index(format!("Invalid UTF-8: {e}")))
    }

    /// Read bytes with length prefix.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_varint()? as usize;
        self.read_raw(length)
    }

    /// Read exact number of raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        if length as u64 > self.remaining() {
            return Err(DiskIndexError::index(format!(
                "read of {length} bytes past end of data"
            )));
        }
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Current position within the body.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Move to an absolute position within the body.
    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        if position > self.len() {
            return Err(DiskIndexError::index(format!(
                "seek to {position} past end of data ({})",
                self.len()
            )));
        }
        self.reader.set_position(position);
        Ok(())
    }

    /// Body length in bytes (checksum excluded).
    pub fn len(&self) -> u64 {
        self.reader.get_ref().len() as u64
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position())
    }

    /// Check if we're at end of data.
    pub fn is_eof(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread part of the body.
    pub fn remaining_slice(&self) -> &[u8] {
        &self.reader.get_ref()[self.position() as usize..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::FileOutput;
    use crate::storage::traits::IoTuning;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_verify() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");

        let output = FileOutput::create(&path, &IoTuning::default()).unwrap();
        let mut writer = StructWriter::new(output);
        writer.write_u8(7).unwrap();
        writer.write_u32(0xDEAD_BEEF).unwrap();
        writer.write_u64(1 << 40).unwrap();
        writer.write_varint(300).unwrap();
        writer.write_string("dictionary").unwrap();
        writer.write_f64(2.5).unwrap();
        assert_eq!(writer.position(), 1 + 4 + 8 + 2 + 11 + 8);
        writer.close().unwrap();

        let mut reader = StructReader::open_verified(&path).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_u64().unwrap(), 1 << 40);
        assert_eq!(reader.read_varint().unwrap(), 300);
        assert_eq!(reader.read_string().unwrap(), "dictionary");
        assert_eq!(reader.read_f64().unwrap(), 2.5);
        assert!(reader.is_eof());
    }

    #[test]
    fn test_corruption_is_detected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.bin");

        let output = FileOutput::create(&path, &IoTuning::default()).unwrap();
        let mut writer = StructWriter::new(output);
        writer.write_string("payload").unwrap();
        writer.close().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[1] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let result = StructReader::open_verified(&path);
        assert!(matches!(result, Err(DiskIndexError::Index(_))));
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = StructReader::from_verified_bytes({
            let mut bytes = vec![1u8, 2, 3];
            bytes.extend_from_slice(&crc32fast::hash(&[1, 2, 3]).to_le_bytes());
            bytes
        })
        .unwrap();
        assert_eq!(reader.len(), 3);
        assert!(reader.read_raw(4).is_err());
        assert_eq!(reader.read_raw(3).unwrap(), vec![1, 2, 3]);
    }
}
