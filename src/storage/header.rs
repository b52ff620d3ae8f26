//! Self-describing file headers.
//!
//! Each segment file starts with a magic number followed by a length-framed,
//! bincode-encoded [`FileHeader`]. Writers stamp their own parameters as
//! tags so readers can configure themselves; a [`FileHeaderContext`] adds
//! provenance tags supplied by the caller.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DiskIndexError, Result};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::traits::StorageOutput;

/// Magic number at the start of every segment file ("DIX1").
pub const FILE_MAGIC: u32 = 0x3158_4944;

/// Header stamped at the start of every segment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Format name, e.g. `diskindex.posocc.zc`.
    pub format: String,
    /// Format version.
    pub version: u32,
    /// Free-form tags.
    pub tags: BTreeMap<String, String>,
}

impl FileHeader {
    pub fn new<S: Into<String>>(format: S, version: u32) -> Self {
        FileHeader {
            format: format.into(),
            version,
            tags: BTreeMap::new(),
        }
    }

    /// Set a tag, replacing any previous value.
    pub fn set_tag<K: Into<String>, V: Display>(&mut self, key: K, value: V) {
        self.tags.insert(key.into(), value.to_string());
    }

    /// Get a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Parse a required tag.
    pub fn parse_tag<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let value = self
            .tag(key)
            .ok_or_else(|| DiskIndexError::index(format!("missing header tag '{key}'")))?;
        value
            .parse()
            .map_err(|e| DiskIndexError::index(format!("bad header tag '{key}={value}': {e}")))
    }

    /// Fail unless this header has the expected format and version.
    pub fn expect_format(&self, format: &str, version: u32) -> Result<()> {
        if self.format != format {
            return Err(DiskIndexError::index(format!(
                "unexpected file format '{}', expected '{format}'",
                self.format
            )));
        }
        if self.version != version {
            return Err(DiskIndexError::index(format!(
                "unsupported {format} version {}, expected {version}",
                self.version
            )));
        }
        Ok(())
    }

    /// Write the framed header.
    pub fn write_to<W: StorageOutput>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        let encoded = bincode::serialize(self)?;
        writer.write_u32(FILE_MAGIC)?;
        writer.write_u32(encoded.len() as u32)?;
        writer.write_raw(&encoded)
    }

    /// Read a framed header.
    pub fn read_from(reader: &mut StructReader) -> Result<Self> {
        let magic = reader.read_u32()?;
        if magic != FILE_MAGIC {
            return Err(DiskIndexError::index(format!(
                "invalid file magic {magic:08x}"
            )));
        }
        let length = reader.read_u32()? as usize;
        let encoded = reader.read_raw(length)?;
        Ok(bincode::deserialize(&encoded)?)
    }
}

/// Supplies provenance tags written into every file header.
///
/// The writers pass headers through without interpreting these tags.
pub trait FileHeaderContext: Send + Sync + std::fmt::Debug {
    /// Add tags to the header of `file_name`.
    fn add_tags(&self, header: &mut FileHeader, file_name: &str);
}

/// Header context with static tags and an optional creation timestamp.
#[derive(Debug, Clone, Default)]
pub struct DefaultFileHeaderContext {
    tags: BTreeMap<String, String>,
    stamp_create_time: bool,
}

impl DefaultFileHeaderContext {
    /// Context that stamps `createTime` into each header.
    pub fn new() -> Self {
        DefaultFileHeaderContext {
            tags: BTreeMap::new(),
            stamp_create_time: true,
        }
    }

    /// Context that adds only its static tags, so identical input gives
    /// byte-identical files.
    pub fn deterministic() -> Self {
        DefaultFileHeaderContext::default()
    }

    /// Add a static tag.
    pub fn with_tag<K: Into<String>, V: Display>(mut self, key: K, value: V) -> Self {
        self.tags.insert(key.into(), value.to_string());
        self
    }
}

impl FileHeaderContext for DefaultFileHeaderContext {
    fn add_tags(&self, header: &mut FileHeader, file_name: &str) {
        for (key, value) in &self.tags {
            header.set_tag(key.clone(), value);
        }
        header.set_tag("fileName", file_name);
        if self.stamp_create_time {
            header.set_tag("createTime", chrono::Utc::now().to_rfc3339());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::FileOutput;
    use crate::storage::traits::IoTuning;
    use tempfile::TempDir;

    #[test]
    fn test_header_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("header.bin");

        let mut header = FileHeader::new("diskindex.test", 3);
        header.set_tag("docIdLimit", 1000u32);
        DefaultFileHeaderContext::new()
            .with_tag("creator", "unit-test")
            .add_tags(&mut header, "header.bin");

        let mut writer = StructWriter::new(FileOutput::create(&path, &IoTuning::default()).unwrap());
        header.write_to(&mut writer).unwrap();
        writer.write_varint(99).unwrap();
        writer.close().unwrap();

        let mut reader = StructReader::open_verified(&path).unwrap();
        let read = FileHeader::read_from(&mut reader).unwrap();
        assert_eq!(read, header);
        assert!(read.tag("createTime").is_some());
        assert_eq!(read.tag("creator"), Some("unit-test"));
        assert_eq!(read.parse_tag::<u32>("docIdLimit").unwrap(), 1000);
        read.expect_format("diskindex.test", 3).unwrap();
        assert!(read.expect_format("diskindex.test", 4).is_err());
        assert!(read.expect_format("other", 3).is_err());
        assert_eq!(reader.read_varint().unwrap(), 99);
    }

    #[test]
    fn test_deterministic_context() {
        let mut header = FileHeader::new("diskindex.test", 1);
        DefaultFileHeaderContext::deterministic().add_tags(&mut header, "a");
        assert!(header.tag("createTime").is_none());
        assert_eq!(header.tag("fileName"), Some("a"));
    }

    #[test]
    fn test_missing_and_bad_tags() {
        let mut header = FileHeader::new("diskindex.test", 1);
        header.set_tag("count", "many");
        assert!(header.parse_tag::<u64>("count").is_err());
        assert!(header.parse_tag::<u64>("absent").is_err());
    }
}
