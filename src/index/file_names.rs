//! The fixed file set of a field segment.
//!
//! [`SEGMENT_FILES`] is the single table of suffixes: writers resolve their
//! paths through it and [`FieldWriter::remove`](super::FieldWriter::remove)
//! enumerates it for cleanup.

use std::path::PathBuf;

use crate::error::Result;
use crate::storage::{
    FileHeader, FileHeaderContext, FileOutput, IoTuning, StructReader, StructWriter,
};

/// What a segment file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    /// Raw overflow bitmaps.
    BitmapData,
    /// Bitmap file summary (domain and entry count).
    BitmapSummary,
    /// Compacted word number to bitmap slot index.
    BitmapIndex,
    /// Per-term chunk layout of the posting stream.
    PostingChunks,
    /// Fixed-width per-term posting offsets and document counts.
    PostingCounts,
    /// Compressed posting bit stream.
    PostingData,
    /// Dictionary counts.
    DictionaryPages,
    /// Dictionary sparse index.
    DictionarySparse,
    /// Dictionary sparse-sparse index and totals.
    DictionarySparseSparse,
    /// Dictionary word numbers and text.
    DictionaryWords,
}

/// Every file belonging to a field segment, relative to its prefix.
pub const SEGMENT_FILES: [(&str, FileRole); 10] = [
    ("boolocc.bdat", FileRole::BitmapData),
    ("boolocc.bidx", FileRole::BitmapSummary),
    ("boolocc.idx", FileRole::BitmapIndex),
    ("posocc.ccnt", FileRole::PostingChunks),
    ("posocc.cnt", FileRole::PostingCounts),
    ("posocc.dat.compressed", FileRole::PostingData),
    ("dictionary.pdat", FileRole::DictionaryPages),
    ("dictionary.spdat", FileRole::DictionarySparse),
    ("dictionary.ssdat", FileRole::DictionarySparseSparse),
    ("dictionary.words", FileRole::DictionaryWords),
];

impl FileRole {
    /// File name suffix for this role.
    pub fn suffix(self) -> &'static str {
        SEGMENT_FILES
            .iter()
            .find(|(_, role)| *role == self)
            .map(|(suffix, _)| *suffix)
            .unwrap_or_default()
    }
}

/// Resolves segment file paths for a prefix.
///
/// Paths are formed by plain concatenation, so a prefix naming a directory
/// must end with a path separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFiles {
    prefix: String,
}

impl SegmentFiles {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        SegmentFiles {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Path of the file with the given role.
    pub fn path(&self, role: FileRole) -> PathBuf {
        PathBuf::from(format!("{}{}", self.prefix, role.suffix()))
    }

    /// File name (suffix) used for header provenance.
    pub fn file_name(&self, role: FileRole) -> &'static str {
        role.suffix()
    }

    /// All segment file paths, in table order.
    pub fn all_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        SEGMENT_FILES
            .iter()
            .map(|(suffix, _)| PathBuf::from(format!("{}{}", self.prefix, suffix)))
    }

    /// Create the file for `role` and write its header, after letting the
    /// context add its provenance tags.
    pub fn create_output(
        &self,
        role: FileRole,
        mut header: FileHeader,
        tuning: &IoTuning,
        header_context: &dyn FileHeaderContext,
    ) -> Result<StructWriter<FileOutput>> {
        header_context.add_tags(&mut header, self.file_name(role));
        let mut writer = StructWriter::new(FileOutput::create(self.path(role), tuning)?);
        header.write_to(&mut writer)?;
        Ok(writer)
    }

    /// Open the file for `role`, verify its checksum and check its header
    /// format.
    pub fn open_input(
        &self,
        role: FileRole,
        format: &str,
        version: u32,
    ) -> Result<(FileHeader, StructReader)> {
        let mut reader = StructReader::open_verified(self.path(role))?;
        let header = FileHeader::read_from(&mut reader)?;
        header.expect_format(format, version)?;
        Ok((header, reader))
    }

    /// Create the directory the prefix points into, if any.
    pub fn ensure_parent_dir(&self) -> std::io::Result<()> {
        let probe = self.path(FileRole::PostingData);
        match probe.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }
}
