//! Overflow bitmap files.
//!
//! `boolocc.bdat` holds one raw bitmap of `ceil(doc_id_limit / 8)` bytes per
//! entry, `boolocc.idx` maps each entry's compacted word number to its slot
//! (with the bitmap's popcount for verification) and `boolocc.bidx`
//! summarizes the file at close.

use std::fmt;
use std::str::FromStr;

use bit_vec::BitVec;
use log::debug;

use crate::error::{DiskIndexError, Result};
use crate::index::file_names::{FileRole, SegmentFiles};
use crate::storage::{
    FileHeader, FileHeaderContext, FileOutput, IoTuning, StructReader, StructWriter,
};

pub const BITMAP_VERSION: u32 = 1;
const DATA_FORMAT: &str = "diskindex.boolocc.bdat";
const INDEX_FORMAT: &str = "diskindex.boolocc.idx";
const SUMMARY_FORMAT: &str = "diskindex.boolocc.bidx";

/// Which word domain the bitmap keys belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitVectorKeyScope {
    /// Keys are compacted word numbers of a single field.
    PerFieldWords,
    /// Keys are shared across the fields of an index.
    SharedWords,
}

impl fmt::Display for BitVectorKeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BitVectorKeyScope::PerFieldWords => "per_field_words",
            BitVectorKeyScope::SharedWords => "shared_words",
        })
    }
}

impl FromStr for BitVectorKeyScope {
    type Err = DiskIndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "per_field_words" => Ok(BitVectorKeyScope::PerFieldWords),
            "shared_words" => Ok(BitVectorKeyScope::SharedWords),
            other => Err(DiskIndexError::index(format!(
                "unknown bitmap key scope '{other}'"
            ))),
        }
    }
}

fn bitmap_bytes(doc_id_limit: u32) -> usize {
    (doc_id_limit as usize).div_ceil(8)
}

fn popcount(bits: &BitVec) -> u32 {
    bits.iter().filter(|bit| *bit).count() as u32
}

/// Writes overflow bitmaps keyed by compacted word number.
#[derive(Debug)]
pub struct BitmapFileWriter {
    doc_id_limit: u32,
    scope: BitVectorKeyScope,
    data: Option<StructWriter<FileOutput>>,
    index: Option<StructWriter<FileOutput>>,
    summary: Option<StructWriter<FileOutput>>,
    last_key: Option<u64>,
    num_entries: u64,
}

impl BitmapFileWriter {
    pub fn new(doc_id_limit: u32, scope: BitVectorKeyScope) -> Self {
        BitmapFileWriter {
            doc_id_limit,
            scope,
            data: None,
            index: None,
            summary: None,
            last_key: None,
            num_entries: 0,
        }
    }

    pub fn open(
        &mut self,
        files: &SegmentFiles,
        tuning: &IoTuning,
        header_context: &dyn FileHeaderContext,
    ) -> Result<()> {
        if self.data.is_some() {
            return Err(DiskIndexError::invalid_write_sequence(
                "bitmap file already open",
            ));
        }
        let header = |format: &str| {
            let mut header = FileHeader::new(format, BITMAP_VERSION);
            header.set_tag("docIdLimit", self.doc_id_limit);
            header.set_tag("keyScope", self.scope);
            header
        };
        self.data = Some(files.create_output(
            FileRole::BitmapData,
            header(DATA_FORMAT),
            tuning,
            header_context,
        )?);
        self.index = Some(files.create_output(
            FileRole::BitmapIndex,
            header(INDEX_FORMAT),
            tuning,
            header_context,
        )?);
        self.summary = Some(files.create_output(
            FileRole::BitmapSummary,
            header(SUMMARY_FORMAT),
            tuning,
            header_context,
        )?);
        Ok(())
    }

    /// Append the bitmap for `key`. Keys must strictly increase and the
    /// bitmap must span the whole doc-id domain.
    pub fn add_word(&mut self, key: u64, bits: &BitVec) -> Result<()> {
        if self.last_key.is_some_and(|last| key <= last) {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "bitmap key {key} not greater than previous key"
            )));
        }
        if bits.len() != self.doc_id_limit as usize {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "bitmap of {} bits does not match doc id limit {}",
                bits.len(),
                self.doc_id_limit
            )));
        }
        let (Some(data), Some(index)) = (self.data.as_mut(), self.index.as_mut()) else {
            return Err(DiskIndexError::invalid_write_sequence(
                "bitmap file not open",
            ));
        };

        data.write_raw(&bits.to_bytes())?;
        index.write_u64(key)?;
        index.write_u32(popcount(bits))?;
        self.last_key = Some(key);
        self.num_entries += 1;
        Ok(())
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Write the summary and close all three files.
    pub fn close(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for (name, writer) in [("bdat", self.data.take()), ("idx", self.index.take())] {
            if let Some(writer) = writer {
                if let Err(e) = writer.close() {
                    failures.push(format!("bitmap {name}: {e}"));
                }
            }
        }
        if let Some(summary) = self.summary.take() {
            if let Err(e) = self.finish_summary(summary) {
                failures.push(format!("bitmap bidx: {e}"));
            }
        }
        if !failures.is_empty() {
            return Err(DiskIndexError::storage(failures.join("; ")));
        }
        debug!("Closed bitmap file: {} bitmaps", self.num_entries);
        Ok(())
    }

    fn finish_summary(&self, mut writer: StructWriter<FileOutput>) -> Result<()> {
        writer.write_u64(self.num_entries)?;
        writer.write_u32(self.doc_id_limit)?;
        writer.write_u64(bitmap_bytes(self.doc_id_limit) as u64)?;
        writer.close()
    }
}

/// Reads overflow bitmaps by compacted word number.
#[derive(Debug)]
pub struct BitmapFileReader {
    doc_id_limit: u32,
    scope: BitVectorKeyScope,
    data: StructReader,
    data_start: u64,
    index: Vec<(u64, u32)>,
}

impl BitmapFileReader {
    pub fn open(files: &SegmentFiles) -> Result<Self> {
        let (header, mut summary) =
            files.open_input(FileRole::BitmapSummary, SUMMARY_FORMAT, BITMAP_VERSION)?;
        let doc_id_limit: u32 = header.parse_tag("docIdLimit")?;
        let scope: BitVectorKeyScope = header.parse_tag("keyScope")?;
        let num_entries = summary.read_u64()?;
        if summary.read_u32()? != doc_id_limit
            || summary.read_u64()? != bitmap_bytes(doc_id_limit) as u64
        {
            return Err(DiskIndexError::index("bitmap summary does not match its header"));
        }

        let (_, mut index_reader) =
            files.open_input(FileRole::BitmapIndex, INDEX_FORMAT, BITMAP_VERSION)?;
        let mut index = Vec::new();
        for _ in 0..num_entries {
            index.push((index_reader.read_u64()?, index_reader.read_u32()?));
        }
        if !index_reader.is_eof() || !index.windows(2).all(|w| w[0].0 < w[1].0) {
            return Err(DiskIndexError::index("bitmap index is inconsistent"));
        }

        let (_, data) = files.open_input(FileRole::BitmapData, DATA_FORMAT, BITMAP_VERSION)?;
        let data_start = data.position();
        if data.remaining() != num_entries * bitmap_bytes(doc_id_limit) as u64 {
            return Err(DiskIndexError::index(format!(
                "bitmap data holds {} bytes, expected {num_entries} bitmaps",
                data.remaining()
            )));
        }

        Ok(BitmapFileReader {
            doc_id_limit,
            scope,
            data,
            data_start,
            index,
        })
    }

    pub fn doc_id_limit(&self) -> u32 {
        self.doc_id_limit
    }

    pub fn scope(&self) -> BitVectorKeyScope {
        self.scope
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Keys that have a bitmap, in order.
    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.index.iter().map(|(key, _)| *key)
    }

    /// The bitmap for `key`, if one was written.
    pub fn get(&mut self, key: u64) -> Result<Option<BitVec>> {
        let Ok(slot) = self.index.binary_search_by_key(&key, |(k, _)| *k) else {
            return Ok(None);
        };
        let size = bitmap_bytes(self.doc_id_limit);
        self.data
            .seek_to(self.data_start + (slot * size) as u64)?;
        let mut bits = BitVec::from_bytes(&self.data.read_raw(size)?);
        bits.truncate(self.doc_id_limit as usize);
        if popcount(&bits) != self.index[slot].1 {
            return Err(DiskIndexError::index(format!(
                "bitmap for key {key} fails its popcount check"
            )));
        }
        Ok(Some(bits))
    }
}
