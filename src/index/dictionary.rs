//! Field dictionary.
//!
//! Four files make up the dictionary:
//!
//! - `dictionary.words`: per entry the word number delta, the compacted word
//!   number delta and the text as (shared prefix length, suffix)
//! - `dictionary.pdat`: per entry the doc count, the posting bit length and,
//!   for multi-chunk terms, the chunk layout
//! - `dictionary.spdat`: a fixed-width sparse entry every
//!   [`SPARSE_STRIDE`] entries, where delta and prefix state restart
//! - `dictionary.ssdat`: totals and every [`SPARSE_SPARSE_STRIDE`]th sparse
//!   entry's word number, written at close
//!
//! The posting bit offset of an entry is implicit: the sum of the bit
//! lengths of all entries before it.

use log::debug;

use crate::error::{DiskIndexError, Result};
use crate::index::counts::{PostingListCounts, PostingListSegment};
use crate::index::file_names::{FileRole, SegmentFiles};
use crate::index::params::CountParams;
use crate::storage::{
    FileHeader, FileHeaderContext, FileOutput, IoTuning, StructReader, StructWriter,
};

pub const DICTIONARY_VERSION: u32 = 1;
const WORDS_FORMAT: &str = "diskindex.dictionary.words";
const PAGES_FORMAT: &str = "diskindex.dictionary.pdat";
const SPARSE_FORMAT: &str = "diskindex.dictionary.spdat";
const SPARSE_SPARSE_FORMAT: &str = "diskindex.dictionary.ssdat";

/// Entries per sparse entry.
pub const SPARSE_STRIDE: u64 = 64;
/// Sparse entries per sparse-sparse entry.
pub const SPARSE_SPARSE_STRIDE: u64 = 64;

/// Restart point of the dictionary's delta encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SparseEntry {
    ordinal: u64,
    word_number: u64,
    compacted_word_number: u64,
    words_offset: u64,
    pages_offset: u64,
    posting_bit_offset: u64,
}

impl SparseEntry {
    fn write_to(&self, writer: &mut StructWriter<FileOutput>) -> Result<()> {
        writer.write_u64(self.ordinal)?;
        writer.write_u64(self.word_number)?;
        writer.write_u64(self.compacted_word_number)?;
        writer.write_u64(self.words_offset)?;
        writer.write_u64(self.pages_offset)?;
        writer.write_u64(self.posting_bit_offset)
    }

    fn read_from(reader: &mut StructReader) -> Result<Self> {
        Ok(SparseEntry {
            ordinal: reader.read_u64()?,
            word_number: reader.read_u64()?,
            compacted_word_number: reader.read_u64()?,
            words_offset: reader.read_u64()?,
            pages_offset: reader.read_u64()?,
            posting_bit_offset: reader.read_u64()?,
        })
    }
}

/// Delta and prefix state shared by the writer and the reader.
#[derive(Debug, Clone, Default)]
struct DeltaState {
    word_number: u64,
    compacted_word_number: u64,
    text: String,
}

fn shared_prefix_len(a: &str, b: &str) -> usize {
    let mut len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    while !b.is_char_boundary(len) {
        len -= 1;
    }
    len
}

/// Writes the dictionary files of one field.
#[derive(Debug)]
pub struct DictionaryWriter {
    params: CountParams,
    words: Option<StructWriter<FileOutput>>,
    pages: Option<StructWriter<FileOutput>>,
    sparse: Option<StructWriter<FileOutput>>,
    sparse_sparse: Option<StructWriter<FileOutput>>,
    state: DeltaState,
    last_word_number: u64,
    last_compacted: Option<u64>,
    num_entries: u64,
    num_sparse: u64,
    sparse_sparse_entries: Vec<(u64, u64)>,
    posting_bit_offset: u64,
    total_docs: u64,
}

impl DictionaryWriter {
    pub fn new(params: CountParams) -> Self {
        DictionaryWriter {
            params,
            words: None,
            pages: None,
            sparse: None,
            sparse_sparse: None,
            state: DeltaState::default(),
            last_word_number: 0,
            last_compacted: None,
            num_entries: 0,
            num_sparse: 0,
            sparse_sparse_entries: Vec::new(),
            posting_bit_offset: 0,
            total_docs: 0,
        }
    }

    /// Create the four dictionary files.
    pub fn open(
        &mut self,
        files: &SegmentFiles,
        tuning: &IoTuning,
        header_context: &dyn FileHeaderContext,
    ) -> Result<()> {
        if self.words.is_some() {
            return Err(DiskIndexError::invalid_write_sequence(
                "dictionary already open",
            ));
        }
        let header = |format: &str| {
            let mut header = FileHeader::new(format, DICTIONARY_VERSION);
            self.params.write_tags(&mut header);
            header.set_tag("sparseStride", SPARSE_STRIDE);
            header
        };
        self.words = Some(files.create_output(
            FileRole::DictionaryWords,
            header(WORDS_FORMAT),
            tuning,
            header_context,
        )?);
        self.pages = Some(files.create_output(
            FileRole::DictionaryPages,
            header(PAGES_FORMAT),
            tuning,
            header_context,
        )?);
        self.sparse = Some(files.create_output(
            FileRole::DictionarySparse,
            header(SPARSE_FORMAT),
            tuning,
            header_context,
        )?);
        self.sparse_sparse = Some(files.create_output(
            FileRole::DictionarySparseSparse,
            header(SPARSE_SPARSE_FORMAT),
            tuning,
            header_context,
        )?);
        Ok(())
    }

    /// Append one entry. Word numbers and compacted word numbers must
    /// strictly increase and the term must have at least one document.
    pub fn write_word(
        &mut self,
        word_number: u64,
        compacted_word_number: u64,
        text: &str,
        counts: &PostingListCounts,
    ) -> Result<()> {
        if counts.num_docs == 0 {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "dictionary entry for word {word_number} without documents"
            )));
        }
        if word_number <= self.last_word_number || word_number > self.params.num_word_ids {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "word number {word_number} out of order (last {}, limit {})",
                self.last_word_number, self.params.num_word_ids
            )));
        }
        if self
            .last_compacted
            .is_some_and(|last| compacted_word_number <= last)
        {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "compacted word number {compacted_word_number} out of order"
            )));
        }

        let (Some(words), Some(pages), Some(sparse)) =
            (self.words.as_mut(), self.pages.as_mut(), self.sparse.as_mut())
        else {
            return Err(DiskIndexError::invalid_write_sequence(
                "dictionary not open",
            ));
        };

        if self.num_entries % SPARSE_STRIDE == 0 {
            if self.num_sparse % SPARSE_SPARSE_STRIDE == 0 {
                self.sparse_sparse_entries
                    .push((word_number, self.num_sparse));
            }
            SparseEntry {
                ordinal: self.num_entries,
                word_number,
                compacted_word_number,
                words_offset: words.position(),
                pages_offset: pages.position(),
                posting_bit_offset: self.posting_bit_offset,
            }
            .write_to(sparse)?;
            self.num_sparse += 1;
            self.state = DeltaState::default();
        }

        let prefix_len = shared_prefix_len(&self.state.text, text);
        words.write_varint(word_number - self.state.word_number)?;
        words.write_varint(compacted_word_number - self.state.compacted_word_number)?;
        words.write_varint(prefix_len as u64)?;
        words.write_string(&text[prefix_len..])?;

        pages.write_varint(counts.num_docs)?;
        pages.write_varint(counts.bit_length)?;
        if counts.segments.len() > 1 {
            pages.write_varint(counts.segments.len() as u64)?;
            for segment in &counts.segments {
                pages.write_varint(segment.num_docs)?;
                pages.write_varint(segment.bit_length)?;
                pages.write_varint(segment.last_doc as u64)?;
            }
        } else {
            pages.write_varint(0)?;
        }

        self.state = DeltaState {
            word_number,
            compacted_word_number,
            text: text.to_string(),
        };
        self.last_word_number = word_number;
        self.last_compacted = Some(compacted_word_number);
        self.num_entries += 1;
        self.posting_bit_offset += counts.bit_length;
        self.total_docs += counts.num_docs;
        Ok(())
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Write the sparse-sparse file and close everything, attempting every
    /// file even after a failure.
    pub fn close(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for (name, writer) in [("words", self.words.take()), ("pdat", self.pages.take())] {
            if let Some(writer) = writer {
                if let Err(e) = writer.close() {
                    failures.push(format!("dictionary {name}: {e}"));
                }
            }
        }
        if let Some(mut sparse) = self.sparse.take() {
            let result = sparse.write_u64(self.num_sparse).and_then(|_| sparse.close());
            if let Err(e) = result {
                failures.push(format!("dictionary spdat: {e}"));
            }
        }
        if let Some(sparse_sparse) = self.sparse_sparse.take() {
            if let Err(e) = self.finish_sparse_sparse(sparse_sparse) {
                failures.push(format!("dictionary ssdat: {e}"));
            }
        }

        if !failures.is_empty() {
            return Err(DiskIndexError::storage(failures.join("; ")));
        }
        debug!(
            "Closed dictionary: {} words, {} docs, {} posting bits",
            self.num_entries, self.total_docs, self.posting_bit_offset
        );
        Ok(())
    }

    fn finish_sparse_sparse(&self, mut writer: StructWriter<FileOutput>) -> Result<()> {
        writer.write_u64(self.num_entries)?;
        writer.write_u64(self.total_docs)?;
        writer.write_u64(self.posting_bit_offset)?;
        writer.write_u64(self.num_sparse)?;
        writer.write_u64(self.sparse_sparse_entries.len() as u64)?;
        for (word_number, sparse_index) in &self.sparse_sparse_entries {
            writer.write_u64(*word_number)?;
            writer.write_u64(*sparse_index)?;
        }
        writer.close()
    }
}

/// One dictionary entry as read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub ordinal: u64,
    pub word_number: u64,
    pub compacted_word_number: u64,
    pub text: String,
    pub counts: PostingListCounts,
    /// Start of the term block in the posting stream.
    pub posting_bit_offset: u64,
}

/// Reads the dictionary files of one field.
#[derive(Debug)]
pub struct DictionaryReader {
    params: CountParams,
    words: StructReader,
    pages: StructReader,
    sparse: Vec<SparseEntry>,
    sparse_sparse: Vec<(u64, u64)>,
    words_start: u64,
    pages_start: u64,
    num_entries: u64,
    total_docs: u64,
    total_bits: u64,
}

impl DictionaryReader {
    pub fn open(files: &SegmentFiles) -> Result<Self> {
        let (header, words) =
            files.open_input(FileRole::DictionaryWords, WORDS_FORMAT, DICTIONARY_VERSION)?;
        let params = CountParams::from_tags(&header)?;
        let stride: u64 = header.parse_tag("sparseStride")?;
        if stride != SPARSE_STRIDE {
            return Err(DiskIndexError::index(format!(
                "unsupported dictionary sparse stride {stride}"
            )));
        }
        let (_, pages) =
            files.open_input(FileRole::DictionaryPages, PAGES_FORMAT, DICTIONARY_VERSION)?;

        let (_, mut ss) = files.open_input(
            FileRole::DictionarySparseSparse,
            SPARSE_SPARSE_FORMAT,
            DICTIONARY_VERSION,
        )?;
        let num_entries = ss.read_u64()?;
        let total_docs = ss.read_u64()?;
        let total_bits = ss.read_u64()?;
        let num_sparse = ss.read_u64()?;
        let num_sparse_sparse = ss.read_u64()?;
        let mut sparse_sparse = Vec::new();
        for _ in 0..num_sparse_sparse {
            sparse_sparse.push((ss.read_u64()?, ss.read_u64()?));
        }
        if num_sparse != num_entries.div_ceil(SPARSE_STRIDE)
            || num_sparse_sparse != num_sparse.div_ceil(SPARSE_SPARSE_STRIDE)
        {
            return Err(DiskIndexError::index("dictionary sparse tables are inconsistent"));
        }

        let (_, mut sp) =
            files.open_input(FileRole::DictionarySparse, SPARSE_FORMAT, DICTIONARY_VERSION)?;
        let mut sparse = Vec::new();
        for _ in 0..num_sparse {
            sparse.push(SparseEntry::read_from(&mut sp)?);
        }
        if sp.read_u64()? != num_sparse {
            return Err(DiskIndexError::index("dictionary sparse file count mismatch"));
        }
        for (word_number, index) in &sparse_sparse {
            if sparse.get(*index as usize).map(|e| e.word_number) != Some(*word_number) {
                return Err(DiskIndexError::index(
                    "dictionary sparse-sparse entry does not match sparse file",
                ));
            }
        }

        Ok(DictionaryReader {
            params,
            words_start: words.position(),
            pages_start: pages.position(),
            words,
            pages,
            sparse,
            sparse_sparse,
            num_entries,
            total_docs,
            total_bits,
        })
    }

    pub fn params(&self) -> &CountParams {
        &self.params
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    pub fn total_docs(&self) -> u64 {
        self.total_docs
    }

    /// Sum of all posting bit lengths.
    pub fn total_bits(&self) -> u64 {
        self.total_bits
    }

    /// Decode every entry in order.
    pub fn entries(&mut self) -> Result<Vec<DictionaryEntry>> {
        self.words.seek_to(self.words_start)?;
        self.pages.seek_to(self.pages_start)?;
        let mut entries = Vec::with_capacity(self.num_entries as usize);
        let mut posting_bit_offset = 0;
        for sparse_index in 0..self.sparse.len() {
            let sparse = self.sparse[sparse_index];
            if sparse.ordinal != entries.len() as u64
                || sparse.posting_bit_offset != posting_bit_offset
                || sparse.words_offset != self.words.position()
                || sparse.pages_offset != self.pages.position()
            {
                return Err(DiskIndexError::index(format!(
                    "dictionary sparse entry {sparse_index} does not match the word stream"
                )));
            }
            let block_end = (sparse.ordinal + SPARSE_STRIDE).min(self.num_entries);
            let mut state = DeltaState::default();
            for ordinal in sparse.ordinal..block_end {
                let entry = self.read_entry(ordinal, &mut state, posting_bit_offset)?;
                posting_bit_offset += entry.counts.bit_length;
                entries.push(entry);
            }
        }
        if posting_bit_offset != self.total_bits || !self.words.is_eof() {
            return Err(DiskIndexError::index("dictionary totals do not match its entries"));
        }
        Ok(entries)
    }

    /// Find the entry for `word_number` through the sparse tables.
    pub fn lookup(&mut self, word_number: u64) -> Result<Option<DictionaryEntry>> {
        let ss = self
            .sparse_sparse
            .partition_point(|(first, _)| *first <= word_number);
        if ss == 0 {
            return Ok(None);
        }
        let block_start = self.sparse_sparse[ss - 1].1 as usize;
        let block_end = self
            .sparse_sparse
            .get(ss)
            .map_or(self.sparse.len(), |(_, index)| *index as usize);
        let block = &self.sparse[block_start..block_end];
        let within = block.partition_point(|e| e.word_number <= word_number);
        let sparse = block[within - 1];

        self.words.seek_to(sparse.words_offset)?;
        self.pages.seek_to(sparse.pages_offset)?;
        let mut state = DeltaState::default();
        let mut posting_bit_offset = sparse.posting_bit_offset;
        let end = (sparse.ordinal + SPARSE_STRIDE).min(self.num_entries);
        for ordinal in sparse.ordinal..end {
            let entry = self.read_entry(ordinal, &mut state, posting_bit_offset)?;
            if entry.word_number == word_number {
                return Ok(Some(entry));
            }
            if entry.word_number > word_number {
                break;
            }
            posting_bit_offset += entry.counts.bit_length;
        }
        Ok(None)
    }

    fn read_entry(
        &mut self,
        ordinal: u64,
        state: &mut DeltaState,
        posting_bit_offset: u64,
    ) -> Result<DictionaryEntry> {
        let word_number = state.word_number + self.words.read_varint()?;
        let compacted_word_number = state.compacted_word_number + self.words.read_varint()?;
        let prefix_len = self.words.read_varint()? as usize;
        let suffix = self.words.read_string()?;
        if prefix_len > state.text.len() || !state.text.is_char_boundary(prefix_len) {
            return Err(DiskIndexError::index(format!(
                "bad shared prefix length {prefix_len} at dictionary entry {ordinal}"
            )));
        }
        let mut text = String::with_capacity(prefix_len + suffix.len());
        text.push_str(&state.text[..prefix_len]);
        text.push_str(&suffix);

        let num_docs = self.pages.read_varint()?;
        let bit_length = self.pages.read_varint()?;
        let num_segments = self.pages.read_varint()?;
        let mut segments = Vec::new();
        for _ in 0..num_segments {
            let num_docs = self.pages.read_varint()?;
            let bit_length = self.pages.read_varint()?;
            let last_doc = u32::try_from(self.pages.read_varint()?)
                .map_err(|_| DiskIndexError::index("segment last doc out of range"))?;
            segments.push(PostingListSegment {
                num_docs,
                bit_length,
                last_doc,
            });
        }

        *state = DeltaState {
            word_number,
            compacted_word_number,
            text: text.clone(),
        };
        Ok(DictionaryEntry {
            ordinal,
            word_number,
            compacted_word_number,
            text,
            counts: PostingListCounts {
                num_docs,
                bit_length,
                segments,
            },
            posting_bit_offset,
        })
    }
}
