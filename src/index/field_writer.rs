//! Writer for one field of a disk index segment.
//!
//! A [`FieldWriter`] receives terms in increasing word-number order and,
//! for each term, its documents in increasing doc-id order. Every term with
//! at least one document becomes one dictionary entry and one posting list;
//! terms whose document count reaches the bitmap threshold also get an
//! overflow bitmap keyed by their compacted word number.
//!
//! ```no_run
//! use diskindex::index::{DocFeatures, FieldWriter, FieldWriterOptions};
//! use diskindex::schema::{IndexField, Schema};
//!
//! # fn main() -> diskindex::error::Result<()> {
//! let schema = Schema::new().with_index_field(IndexField::new("title"))?;
//! let mut writer = FieldWriter::new(1000, 100, "/tmp/segment/title/");
//! writer.open(FieldWriterOptions::new(schema, 0))?;
//! writer.begin_term(3, "cat")?;
//! writer.add_document(1, &DocFeatures::with_positions(4, vec![0]))?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::error::{DiskIndexError, Result};
use crate::index::bitmap_file::{BitVectorKeyScope, BitmapFileWriter};
use crate::index::bitvector::{BitVectorCandidate, BitmapThreshold};
use crate::index::dictionary::DictionaryWriter;
use crate::index::features::DocFeatures;
use crate::index::file_names::{FileRole, SegmentFiles};
use crate::index::params::{FeatureParams, setup_default_pos_occ_parameters};
use crate::index::posocc::{PostingEncoder, make_pos_occ_write};
use crate::schema::{FieldLengthInfo, Schema};
use crate::storage::{DefaultFileHeaderContext, FileHeaderContext, IoTuning, remove_if_exists};

/// Word number meaning "no term in progress". Never a real word number.
pub const NO_WORD_NUM: u64 = 0;

/// Tuning and schema for [`FieldWriter::open`].
#[derive(Debug, Clone)]
pub struct FieldWriterOptions {
    /// Docs per chunk before a skip table is written; 0 keeps the default.
    pub min_skip_docs: u32,
    /// Maximum docs per chunk; 0 keeps the default.
    pub min_chunk_docs: u32,
    /// Feature bits that close a chunk; 0 disables the limit.
    pub features_size_flush_bits: u64,
    pub dynamic_format: bool,
    pub interleaved_features: bool,
    pub schema: Schema,
    pub index_id: u32,
    pub field_length_info: FieldLengthInfo,
    pub io_tuning: IoTuning,
    pub header_context: Arc<dyn FileHeaderContext>,
}

impl FieldWriterOptions {
    pub fn new(schema: Schema, index_id: u32) -> Self {
        FieldWriterOptions {
            min_skip_docs: 0,
            min_chunk_docs: 0,
            features_size_flush_bits: 0,
            dynamic_format: true,
            interleaved_features: false,
            schema,
            index_id,
            field_length_info: FieldLengthInfo::default(),
            io_tuning: IoTuning::default(),
            header_context: Arc::new(DefaultFileHeaderContext::new()),
        }
    }

    pub fn min_skip_docs(mut self, min_skip_docs: u32) -> Self {
        self.min_skip_docs = min_skip_docs;
        self
    }

    pub fn min_chunk_docs(mut self, min_chunk_docs: u32) -> Self {
        self.min_chunk_docs = min_chunk_docs;
        self
    }

    pub fn features_size_flush_bits(mut self, bits: u64) -> Self {
        self.features_size_flush_bits = bits;
        self
    }

    pub fn dynamic_format(mut self, dynamic: bool) -> Self {
        self.dynamic_format = dynamic;
        self
    }

    pub fn interleaved_features(mut self, interleaved: bool) -> Self {
        self.interleaved_features = interleaved;
        self
    }

    pub fn field_length_info(mut self, info: FieldLengthInfo) -> Self {
        self.field_length_info = info;
        self
    }

    pub fn io_tuning(mut self, tuning: IoTuning) -> Self {
        self.io_tuning = tuning;
        self
    }

    pub fn header_context(mut self, context: Arc<dyn FileHeaderContext>) -> Self {
        self.header_context = context;
        self
    }
}

/// Totals for a field writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldWriterStats {
    /// Dictionary entries written.
    pub num_words: u64,
    /// Terms that also got an overflow bitmap.
    pub num_bitmap_words: u64,
    /// Postings over all terms.
    pub num_docs: u64,
    /// Posting stream bits over all terms.
    pub num_bits: u64,
    /// Terms started without any document.
    pub num_empty_words: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Unopened,
    Open,
    Failed,
    Closed,
}

/// Writes the dictionary, posting and bitmap files of one field.
#[derive(Debug)]
pub struct FieldWriter {
    files: SegmentFiles,
    doc_id_limit: u32,
    num_word_ids: u64,
    state: WriterState,
    dictionary: Option<DictionaryWriter>,
    posting: Option<Box<dyn PostingEncoder>>,
    bitmap_file: Option<BitmapFileWriter>,
    candidate: BitVectorCandidate,
    word_number: u64,
    compacted_word_number: u64,
    word: String,
    prev_doc_id: Option<u32>,
    stats: FieldWriterStats,
    /// Why the build was aborted after a rejected call.
    abort_reason: Option<String>,
}

impl FieldWriter {
    /// Create a writer for `doc_id_limit` documents and at most
    /// `num_word_ids` words. File names are `prefix` followed by a fixed
    /// suffix.
    pub fn new<S: Into<String>>(doc_id_limit: u32, num_word_ids: u64, prefix: S) -> Self {
        FieldWriter {
            files: SegmentFiles::new(prefix),
            doc_id_limit,
            num_word_ids,
            state: WriterState::Unopened,
            dictionary: None,
            posting: None,
            bitmap_file: None,
            candidate: BitVectorCandidate::new(doc_id_limit),
            word_number: NO_WORD_NUM,
            compacted_word_number: 0,
            word: String::new(),
            prev_doc_id: None,
            stats: FieldWriterStats::default(),
            abort_reason: None,
        }
    }

    /// Replace the bitmap threshold. The default is one document in 64,
    /// but at least 16; an explicit threshold is used as given.
    pub fn with_bitmap_threshold(mut self, threshold: BitmapThreshold) -> Self {
        self.candidate = BitVectorCandidate::with_threshold(self.doc_id_limit, threshold);
        self
    }

    /// Open all files, using the shipped posting encoder.
    pub fn open(&mut self, options: FieldWriterOptions) -> Result<()> {
        self.check_unopened()?;
        let field = match options.schema.index_field(options.index_id) {
            Ok(field) => field,
            Err(e) => {
                self.state = WriterState::Failed;
                return Err(e);
            }
        };

        let (count_params, mut posting_params) =
            setup_default_pos_occ_parameters(self.num_word_ids, self.doc_id_limit);
        posting_params.counts =
            count_params.with_overrides(options.min_skip_docs, options.min_chunk_docs);
        posting_params.features_size_flush_bits =
            (options.features_size_flush_bits > 0).then_some(options.features_size_flush_bits);
        posting_params.interleaved_features = options.interleaved_features;
        posting_params.dynamic_format = options.dynamic_format;

        let feature_params = FeatureParams::from_field(
            options.index_id,
            field,
            options.interleaved_features,
            options.field_length_info,
        );
        let encoder = make_pos_occ_write(posting_params, feature_params);
        self.open_with_encoder(encoder, &options.io_tuning, options.header_context.as_ref())
    }

    /// Open all files with a caller-supplied posting encoder. The dictionary
    /// takes its count parameters from the encoder.
    pub fn open_with_encoder(
        &mut self,
        mut encoder: Box<dyn PostingEncoder>,
        tuning: &IoTuning,
        header_context: &dyn FileHeaderContext,
    ) -> Result<()> {
        self.check_unopened()?;
        self.state = WriterState::Failed;

        if let Err(e) = self.files.ensure_parent_dir() {
            error!(
                "Could not create directory for '{}': {e}",
                self.files.prefix()
            );
            return Err(e.into());
        }

        let mut dictionary = DictionaryWriter::new(encoder.posting_params().counts);
        let opened = dictionary.open(&self.files, tuning, header_context);
        self.dictionary = Some(dictionary);
        if let Err(e) = opened {
            error!(
                "Could not open dictionary '{}' for write: {e}",
                self.files.path(FileRole::DictionaryWords).display()
            );
            return Err(e);
        }

        let opened = encoder.open(&self.files, tuning, header_context);
        self.posting = Some(encoder);
        if let Err(e) = opened {
            error!(
                "Could not open posting file '{}' for write: {e}",
                self.files.path(FileRole::PostingData).display()
            );
            return Err(e);
        }

        let mut bitmap_file = BitmapFileWriter::new(self.doc_id_limit, BitVectorKeyScope::PerFieldWords);
        let opened = bitmap_file.open(&self.files, tuning, header_context);
        self.bitmap_file = Some(bitmap_file);
        if let Err(e) = opened {
            error!(
                "Could not open bitmap file '{}' for write: {e}",
                self.files.path(FileRole::BitmapData).display()
            );
            return Err(e);
        }

        self.state = WriterState::Open;
        info!(
            "Opened field writer '{}' (doc id limit {}, {} word ids)",
            self.files.prefix(),
            self.doc_id_limit,
            self.num_word_ids
        );
        Ok(())
    }

    fn check_unopened(&self) -> Result<()> {
        if self.state != WriterState::Unopened {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "open called on a {:?} field writer",
                self.state
            )));
        }
        Ok(())
    }

    fn check_open(&self, operation: &str) -> Result<()> {
        if self.state != WriterState::Open {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "{operation} called on a {:?} field writer",
                self.state
            )));
        }
        Ok(())
    }

    /// Abandon the build after a rejected call. Only `close` is accepted
    /// afterwards, and it reports the failure.
    fn abort_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!("Aborting field writer '{}': {e}", self.files.prefix());
            self.state = WriterState::Failed;
            self.abort_reason = Some(e.to_string());
        }
        result
    }

    /// Start a new term, flushing the previous one.
    ///
    /// A rejected call aborts the build.
    pub fn begin_term(&mut self, word_number: u64, text: &str) -> Result<()> {
        self.check_open("begin_term")?;
        let started = self.start_term(word_number, text);
        self.abort_on_error(started)
    }

    /// Start the term numbered one past the current one.
    pub fn begin_next_term(&mut self, text: &str) -> Result<()> {
        self.check_open("begin_next_term")?;
        let started = match self.word_number.checked_add(1) {
            Some(next) => self.start_term(next, text),
            None => Err(DiskIndexError::invalid_write_sequence(
                "word number space exhausted",
            )),
        };
        self.abort_on_error(started)
    }

    fn start_term(&mut self, word_number: u64, text: &str) -> Result<()> {
        if word_number == NO_WORD_NUM {
            return Err(DiskIndexError::invalid_write_sequence(
                "word number 0 is reserved",
            ));
        }
        if word_number > self.num_word_ids {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "word number {word_number} exceeds {} word ids",
                self.num_word_ids
            )));
        }
        if word_number <= self.word_number {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "word number {word_number} not greater than current word number {}",
                self.word_number
            )));
        }

        self.flush_current_term()?;
        self.word_number = word_number;
        self.compacted_word_number += 1;
        self.word.clear();
        self.word.push_str(text);
        self.prev_doc_id = None;
        Ok(())
    }

    /// Add a document to the current term.
    ///
    /// A rejected call aborts the build.
    pub fn add_document(&mut self, doc_id: u32, features: &DocFeatures) -> Result<()> {
        self.check_open("add_document")?;
        let added = self.add_posting(doc_id, features);
        self.abort_on_error(added)
    }

    fn add_posting(&mut self, doc_id: u32, features: &DocFeatures) -> Result<()> {
        if self.word_number == NO_WORD_NUM {
            return Err(DiskIndexError::invalid_write_sequence(
                "add_document without a current term",
            ));
        }
        if doc_id >= self.doc_id_limit {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "doc id {doc_id} outside doc id limit {}",
                self.doc_id_limit
            )));
        }
        if let Some(prev) = self.prev_doc_id {
            if doc_id <= prev {
                return Err(DiskIndexError::invalid_write_sequence(format!(
                    "doc id {doc_id} not greater than previous doc id {prev} for word {}",
                    self.word_number
                )));
            }
        }

        let posting = self.posting.as_mut().ok_or_else(|| {
            DiskIndexError::invalid_write_sequence("posting file not open")
        })?;
        posting.add_posting(doc_id, features)?;
        self.candidate.set_bit(doc_id);
        self.prev_doc_id = Some(doc_id);
        Ok(())
    }

    fn flush_current_term(&mut self) -> Result<()> {
        let (Some(posting), Some(dictionary), Some(bitmap_file)) = (
            self.posting.as_mut(),
            self.dictionary.as_mut(),
            self.bitmap_file.as_mut(),
        ) else {
            return Err(DiskIndexError::invalid_write_sequence(
                "field writer files not open",
            ));
        };

        posting.flush_word()?;
        let counts = posting.counts();
        if counts.num_docs > 0 {
            dictionary.write_word(
                self.word_number,
                self.compacted_word_number,
                &self.word,
                counts,
            )?;
            if self.candidate.crossed_limit() {
                let bits = self.candidate.bit_vector().ok_or_else(|| {
                    DiskIndexError::index("crossed bitmap limit without a bitmap")
                })?;
                bitmap_file.add_word(self.compacted_word_number, bits)?;
                self.stats.num_bitmap_words += 1;
            }
            self.stats.num_words += 1;
            self.stats.num_docs += counts.num_docs;
            self.stats.num_bits += counts.bit_length;
            debug!(
                "Flushed word {} [{}]: {} docs, {} bits",
                self.word_number, self.compacted_word_number, counts.num_docs, counts.bit_length
            );
        } else {
            if counts.bit_length != 0 || !self.candidate.is_empty() {
                return Err(DiskIndexError::invalid_write_sequence(format!(
                    "word {} has no documents but {} posting bits and {} accumulated doc ids",
                    self.word_number,
                    counts.bit_length,
                    self.candidate.count()
                )));
            }
            if self.word_number != NO_WORD_NUM {
                self.stats.num_empty_words += 1;
            }
        }
        self.candidate.clear();
        posting.clear_counts();
        Ok(())
    }

    /// Flush the last term and close all files.
    ///
    /// Every file is closed even when an earlier one fails; the failures are
    /// reported together. A writer aborted by a rejected call releases its
    /// files without flushing and returns an error; its prefix should be
    /// removed. The writer cannot be reopened.
    pub fn close(&mut self) -> Result<()> {
        if self.state == WriterState::Closed {
            return Err(DiskIndexError::invalid_write_sequence(
                "field writer already closed",
            ));
        }

        let mut failures = Vec::new();
        if self.state == WriterState::Open {
            if let Err(e) = self.flush_current_term() {
                error!("Could not flush last term of '{}': {e}", self.files.prefix());
                failures.push(format!("flush: {e}"));
            }
        }
        self.word_number = NO_WORD_NUM;

        if let Some(mut posting) = self.posting.take() {
            if let Err(e) = posting.close() {
                error!(
                    "Could not close posting file '{}': {e}",
                    self.files.path(FileRole::PostingData).display()
                );
                failures.push(e.to_string());
            }
        }
        if let Some(mut dictionary) = self.dictionary.take() {
            if let Err(e) = dictionary.close() {
                error!(
                    "Could not close dictionary '{}': {e}",
                    self.files.path(FileRole::DictionaryWords).display()
                );
                failures.push(e.to_string());
            }
        }
        if let Some(mut bitmap_file) = self.bitmap_file.take() {
            if let Err(e) = bitmap_file.close() {
                error!(
                    "Could not close bitmap file '{}': {e}",
                    self.files.path(FileRole::BitmapData).display()
                );
                failures.push(e.to_string());
            }
        }

        let was_open = self.state == WriterState::Open;
        self.state = WriterState::Closed;
        if let Some(reason) = self.abort_reason.take() {
            if failures.is_empty() {
                return Err(DiskIndexError::invalid_write_sequence(format!(
                    "field writer '{}' was aborted: {reason}",
                    self.files.prefix()
                )));
            }
            failures.insert(0, format!("aborted: {reason}"));
        }
        if !failures.is_empty() {
            return Err(DiskIndexError::storage(format!(
                "failed to close field writer '{}': {}",
                self.files.prefix(),
                failures.join("; ")
            )));
        }
        if was_open {
            info!(
                "Wrote field '{}': {} words ({} with bitmaps), {} postings, {} bits",
                self.files.prefix(),
                self.stats.num_words,
                self.stats.num_bitmap_words,
                self.stats.num_docs,
                self.stats.num_bits
            );
        }
        Ok(())
    }

    /// Feature parameters of the posting encoder, while open.
    pub fn feature_params(&self) -> Option<FeatureParams> {
        self.posting
            .as_ref()
            .map(|posting| posting.feature_params().clone())
    }

    /// Delete every file of the segment at `prefix`, returning how many were
    /// removed. Missing files are skipped silently.
    pub fn remove(prefix: &str) -> usize {
        let files = SegmentFiles::new(prefix);
        let mut removed = 0;
        for path in files.all_paths() {
            match remove_if_exists(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Could not remove '{}': {e}", path.display()),
            }
        }
        removed
    }

    pub fn prefix(&self) -> &str {
        self.files.prefix()
    }

    pub fn doc_id_limit(&self) -> u32 {
        self.doc_id_limit
    }

    pub fn num_word_ids(&self) -> u64 {
        self.num_word_ids
    }

    /// Current word number, [`NO_WORD_NUM`] when no term is in progress.
    pub fn word_number(&self) -> u64 {
        self.word_number
    }

    pub fn compacted_word_number(&self) -> u64 {
        self.compacted_word_number
    }

    pub fn is_open(&self) -> bool {
        self.state == WriterState::Open
    }

    pub fn stats(&self) -> FieldWriterStats {
        self.stats
    }
}

impl Drop for FieldWriter {
    fn drop(&mut self) {
        if matches!(self.state, WriterState::Open | WriterState::Failed) {
            warn!(
                "Field writer '{}' dropped without close; its files are incomplete",
                self.files.prefix()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::counts::PostingListCounts;
    use crate::index::dictionary::DictionaryReader;
    use crate::index::params::PostingParams;
    use crate::schema::IndexField;
    use tempfile::TempDir;

    fn options() -> FieldWriterOptions {
        let schema = Schema::new()
            .with_index_field(IndexField::new("title"))
            .unwrap();
        FieldWriterOptions::new(schema, 0)
            .header_context(Arc::new(DefaultFileHeaderContext::deterministic()))
    }

    fn prefix(dir: &TempDir) -> String {
        format!("{}/title/", dir.path().display())
    }

    fn doc() -> DocFeatures {
        DocFeatures::with_positions(3, vec![1])
    }

    #[test]
    fn test_sequencing_errors() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = FieldWriter::new(100, 10, prefix(&temp_dir));
        assert!(writer.begin_term(1, "a").unwrap_err().is_invalid_write_sequence());
        assert!(writer.add_document(1, &doc()).is_err());

        writer.open(options()).unwrap();
        assert!(writer.open(options()).is_err());
        assert!(writer.is_open());

        writer.begin_term(5, "e").unwrap();
        writer.add_document(7, &doc()).unwrap();
        writer.add_document(8, &doc()).unwrap();
        writer.begin_next_term("f").unwrap();
        assert_eq!(writer.word_number(), 6);
        writer.add_document(3, &doc()).unwrap();
        writer.close().unwrap();
        assert!(writer.close().is_err());
        assert!(writer.begin_term(9, "i").is_err());
        assert_eq!(writer.stats().num_words, 2);
        assert_eq!(writer.stats().num_docs, 3);
    }

    type Step = fn(&mut FieldWriter) -> Result<()>;

    #[test]
    fn test_rejected_calls_abort_the_build() {
        let steps: [(&str, Step); 8] = [
            ("document without a term", |w: &mut FieldWriter| {
                w.add_document(1, &doc())
            }),
            ("reserved word number", |w: &mut FieldWriter| {
                w.begin_term(0, "zero")
            }),
            ("word number past the end", |w: &mut FieldWriter| {
                w.begin_term(11, "too big")
            }),
            ("repeated word number", |w: &mut FieldWriter| {
                w.begin_term(5, "e")?;
                w.begin_term(5, "e")
            }),
            ("decreasing word number", |w: &mut FieldWriter| {
                w.begin_term(5, "e")?;
                w.begin_term(4, "d")
            }),
            ("repeated doc id", |w: &mut FieldWriter| {
                w.begin_term(5, "e")?;
                w.add_document(7, &doc())?;
                w.add_document(7, &doc())
            }),
            ("decreasing doc id", |w: &mut FieldWriter| {
                w.begin_term(5, "e")?;
                w.add_document(7, &doc())?;
                w.add_document(3, &doc())
            }),
            ("doc id past the limit", |w: &mut FieldWriter| {
                w.begin_term(5, "e")?;
                w.add_document(100, &doc())
            }),
        ];

        let temp_dir = TempDir::new().unwrap();
        for (i, (name, step)) in steps.into_iter().enumerate() {
            let mut writer =
                FieldWriter::new(100, 10, format!("{}/f{i}/", temp_dir.path().display()));
            writer.open(options()).unwrap();

            let err = step(&mut writer).unwrap_err();
            assert!(err.is_invalid_write_sequence(), "{name}");
            assert!(!writer.is_open(), "{name}");
            assert!(writer.begin_term(9, "i").is_err(), "{name}");
            assert!(writer.add_document(50, &doc()).is_err(), "{name}");

            let err = writer.close().unwrap_err();
            assert!(err.is_invalid_write_sequence(), "{name}");
            assert!(err.to_string().contains("aborted"), "{name}");
            assert!(writer.close().is_err(), "{name}");
        }
    }

    #[test]
    fn test_aborted_term_is_not_flushed() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = FieldWriter::new(100, 10, prefix(&temp_dir));
        writer.open(options()).unwrap();
        writer.begin_term(1, "a").unwrap();
        writer.add_document(5, &doc()).unwrap();
        assert!(writer.add_document(3, &doc()).is_err());
        assert!(writer.close().is_err());
        assert_eq!(writer.stats().num_words, 0);

        // The files were released, so the prefix can be discarded.
        assert_eq!(FieldWriter::remove(&prefix(&temp_dir)), 10);
    }

    #[test]
    fn test_bad_index_id_fails_open() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = FieldWriter::new(100, 10, prefix(&temp_dir));
        let options = FieldWriterOptions {
            index_id: 3,
            ..options()
        };
        assert!(matches!(writer.open(options), Err(DiskIndexError::Schema(_))));
        assert!(writer.begin_term(1, "a").is_err());
        writer.close().unwrap();
    }

    #[test]
    fn test_open_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let mut writer = FieldWriter::new(100, 10, format!("{}/seg.", blocker.display()));
        assert!(writer.open(options()).is_err());
        assert!(!writer.is_open());
        writer.close().unwrap();
    }

    #[test]
    fn test_feature_params_and_empty_terms() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = FieldWriter::new(100, 10, prefix(&temp_dir));
        assert!(writer.feature_params().is_none());
        writer.open(options().interleaved_features(true)).unwrap();
        let params = writer.feature_params().unwrap();
        assert!(params.interleaved_features);
        assert_eq!(params.field_name, "title");

        writer.begin_term(1, "empty").unwrap();
        writer.begin_term(2, "also empty").unwrap();
        writer.begin_term(3, "real").unwrap();
        writer.add_document(0, &doc()).unwrap();
        writer.close().unwrap();

        let stats = writer.stats();
        assert_eq!(stats.num_words, 1);
        assert_eq!(stats.num_empty_words, 2);
        assert_eq!(writer.compacted_word_number(), 3);
    }

    /// Wraps the shipped encoder and misbehaves on request.
    #[derive(Debug)]
    struct FaultyEncoder {
        inner: Box<dyn PostingEncoder>,
        counts: PostingListCounts,
        leak_bits: bool,
        fail_close: bool,
    }

    impl PostingEncoder for FaultyEncoder {
        fn open(
            &mut self,
            files: &SegmentFiles,
            tuning: &IoTuning,
            header_context: &dyn FileHeaderContext,
        ) -> Result<()> {
            self.inner.open(files, tuning, header_context)
        }

        fn add_posting(&mut self, doc_id: u32, features: &DocFeatures) -> Result<()> {
            self.inner.add_posting(doc_id, features)
        }

        fn flush_word(&mut self) -> Result<()> {
            self.inner.flush_word()?;
            self.counts = self.inner.counts().clone();
            if self.leak_bits && self.counts.num_docs == 0 {
                self.counts.bit_length = 7;
            }
            Ok(())
        }

        fn counts(&self) -> &PostingListCounts {
            &self.counts
        }

        fn clear_counts(&mut self) {
            self.counts.clear();
            self.inner.clear_counts();
        }

        fn posting_params(&self) -> &PostingParams {
            self.inner.posting_params()
        }

        fn feature_params(&self) -> &FeatureParams {
            self.inner.feature_params()
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()?;
            if self.fail_close {
                return Err(DiskIndexError::storage("simulated close failure"));
            }
            Ok(())
        }
    }

    fn faulty_encoder(leak_bits: bool, fail_close: bool) -> Box<dyn PostingEncoder> {
        let (_, params) = setup_default_pos_occ_parameters(10, 100);
        let feature_params =
            FeatureParams::from_field(0, &IndexField::new("title"), false, FieldLengthInfo::default());
        Box::new(FaultyEncoder {
            inner: make_pos_occ_write(params, feature_params),
            counts: PostingListCounts::default(),
            leak_bits,
            fail_close,
        })
    }

    #[test]
    fn test_empty_term_with_leftover_bits_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = FieldWriter::new(100, 10, prefix(&temp_dir));
        writer
            .open_with_encoder(
                faulty_encoder(true, false),
                &IoTuning::default(),
                &DefaultFileHeaderContext::deterministic(),
            )
            .unwrap();
        let err = writer.begin_term(1, "a").unwrap_err();
        assert!(err.is_invalid_write_sequence());
        assert!(writer.close().unwrap_err().is_invalid_write_sequence());
    }

    #[test]
    fn test_close_failures_are_aggregated() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = FieldWriter::new(100, 10, prefix(&temp_dir));
        writer
            .open_with_encoder(
                faulty_encoder(false, true),
                &IoTuning::default(),
                &DefaultFileHeaderContext::deterministic(),
            )
            .unwrap();
        writer.begin_term(1, "a").unwrap();
        writer.add_document(4, &doc()).unwrap();

        let err = writer.close().unwrap_err();
        assert!(matches!(err, DiskIndexError::Storage(_)));
        assert!(err.to_string().contains("simulated close failure"));

        // The dictionary was still closed after the posting file failed.
        let mut dictionary = DictionaryReader::open(&SegmentFiles::new(prefix(&temp_dir))).unwrap();
        assert_eq!(dictionary.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = FieldWriter::new(100, 10, prefix(&temp_dir));
        writer.open(options()).unwrap();
        writer.close().unwrap();

        assert_eq!(FieldWriter::remove(&prefix(&temp_dir)), 10);
        assert_eq!(FieldWriter::remove(&prefix(&temp_dir)), 0);
    }
}
