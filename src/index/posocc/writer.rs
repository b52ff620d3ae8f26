//! Posting stream writer.

use std::ops::Range;

use log::debug;

use super::{
    DocIdCode, FeatureCodec, POSOCC_CHUNKS_FORMAT, POSOCC_COUNTS_FORMAT, POSOCC_FORMAT,
    POSOCC_VERSION, PostingEncoder, SKIP_BITS_K, SKIP_STRIDE, doc_gap,
};
use crate::error::{DiskIndexError, Result};
use crate::index::counts::{PostingListCounts, PostingListSegment};
use crate::index::features::DocFeatures;
use crate::index::file_names::{FileRole, SegmentFiles};
use crate::index::params::{FeatureParams, PostingParams};
use crate::storage::{FileHeader, FileHeaderContext, FileOutput, IoTuning, StructWriter};
use crate::util::bits::{BitCounter, BitEncoder, BitSink};

type PostingStream = BitEncoder<StructWriter<FileOutput>>;

/// Writes the compressed posting stream and its two count side files.
///
/// Postings of the current term are buffered until [`flush_word`], since the
/// chunk layout and skip tables depend on the whole term.
///
/// [`flush_word`]: PostingEncoder::flush_word
pub struct ZcPosOccWriter {
    params: PostingParams,
    feature_params: FeatureParams,
    doc_ids: DocIdCode,
    codec: FeatureCodec,
    pending: Vec<(u32, DocFeatures)>,
    counts: PostingListCounts,
    stream: Option<PostingStream>,
    count_file: Option<StructWriter<FileOutput>>,
    chunk_file: Option<StructWriter<FileOutput>>,
    num_words: u64,
    total_docs: u64,
    total_bits: u64,
}

impl ZcPosOccWriter {
    pub fn new(params: PostingParams, mut feature_params: FeatureParams) -> Self {
        feature_params.interleaved_features = params.interleaved_features;
        ZcPosOccWriter {
            doc_ids: DocIdCode::new(&params),
            codec: FeatureCodec::new(&feature_params),
            params,
            feature_params,
            pending: Vec::new(),
            counts: PostingListCounts::default(),
            stream: None,
            count_file: None,
            chunk_file: None,
            num_words: 0,
            total_docs: 0,
            total_bits: 0,
        }
    }

    /// Number of terms written so far.
    pub fn num_words(&self) -> u64 {
        self.num_words
    }

    fn header(&self, format: &str) -> FileHeader {
        let mut header = FileHeader::new(format, POSOCC_VERSION);
        self.params.write_tags(&mut header);
        self.feature_params.write_tags(&mut header);
        header
    }

    /// Split a term's postings into chunks.
    fn split_chunks(&self, docs: &[(u32, DocFeatures)]) -> Result<Vec<Range<usize>>> {
        let min_chunk_docs = self.params.counts.min_chunk_docs.max(1) as usize;
        let flush_bits = self.params.features_size_flush_bits;

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut feature_bits = BitCounter::new();
        for (i, (_, features)) in docs.iter().enumerate() {
            if flush_bits.is_some() {
                self.codec.write_features(&mut feature_bits, features)?;
            }
            let full = i + 1 - start >= min_chunk_docs
                || flush_bits.is_some_and(|limit| feature_bits.bits() >= limit);
            if full {
                chunks.push(start..i + 1);
                start = i + 1;
                feature_bits = BitCounter::new();
            }
        }
        if start < docs.len() {
            chunks.push(start..docs.len());
        }
        Ok(chunks)
    }

    fn write_counts(&mut self, bit_offset: u64) -> Result<()> {
        let count_file = self
            .count_file
            .as_mut()
            .ok_or_else(|| DiskIndexError::invalid_write_sequence("posting file not open"))?;
        count_file.write_u64(bit_offset)?;
        count_file.write_u32(self.counts.num_docs as u32)?;

        let chunk_file = self
            .chunk_file
            .as_mut()
            .ok_or_else(|| DiskIndexError::invalid_write_sequence("posting file not open"))?;
        chunk_file.write_varint(self.counts.segments.len() as u64)?;
        for segment in &self.counts.segments {
            chunk_file.write_varint(segment.num_docs)?;
            chunk_file.write_varint(segment.bit_length)?;
            chunk_file.write_varint(segment.last_doc as u64)?;
        }
        Ok(())
    }
}

/// Write one chunk, returning its segment counts.
fn write_chunk<S: BitSink>(
    sink: &mut S,
    docs: &[(u32, DocFeatures)],
    prev_doc: Option<u32>,
    doc_ids: &DocIdCode,
    codec: &FeatureCodec,
    min_skip_docs: u32,
) -> Result<PostingListSegment> {
    let start = sink.bits();
    let num_docs = docs.len() as u64;
    let k = doc_ids.k(num_docs);
    sink.put_exp_golomb(num_docs - 1, 0)?;

    if num_docs >= min_skip_docs as u64 {
        let mut doc_bits = BitCounter::new();
        let mut feature_bits = BitCounter::new();
        let mut skips = Vec::with_capacity(docs.len() / SKIP_STRIDE);
        let mut prev = prev_doc;
        for (i, (doc_id, features)) in docs.iter().enumerate() {
            if i > 0 && i % SKIP_STRIDE == 0 {
                skips.push((*doc_id, doc_bits.bits(), feature_bits.bits()));
            }
            codec.write_doc(&mut doc_bits, doc_gap(prev, *doc_id), k, features)?;
            codec.write_features(&mut feature_bits, features)?;
            prev = Some(*doc_id);
        }

        let (mut last_doc, mut last_doc_bits, mut last_feature_bits) = (docs[0].0, 0, 0);
        for (doc_id, doc_offset, feature_offset) in skips {
            sink.put_exp_golomb((doc_id - last_doc - 1) as u64, k)?;
            sink.put_exp_golomb(doc_offset - last_doc_bits, SKIP_BITS_K)?;
            sink.put_exp_golomb(feature_offset - last_feature_bits, SKIP_BITS_K)?;
            (last_doc, last_doc_bits, last_feature_bits) = (doc_id, doc_offset, feature_offset);
        }
    }

    let mut prev = prev_doc;
    for (doc_id, features) in docs {
        codec.write_doc(sink, doc_gap(prev, *doc_id), k, features)?;
        prev = Some(*doc_id);
    }
    for (_, features) in docs {
        codec.write_features(sink, features)?;
    }

    Ok(PostingListSegment {
        num_docs,
        bit_length: sink.bits() - start,
        last_doc: docs[docs.len() - 1].0,
    })
}

impl PostingEncoder for ZcPosOccWriter {
    fn open(
        &mut self,
        files: &SegmentFiles,
        tuning: &IoTuning,
        header_context: &dyn FileHeaderContext,
    ) -> Result<()> {
        if self.stream.is_some() {
            return Err(DiskIndexError::invalid_write_sequence(
                "posting file already open",
            ));
        }
        let data = files.create_output(
            FileRole::PostingData,
            self.header(POSOCC_FORMAT),
            tuning,
            header_context,
        )?;
        self.stream = Some(BitEncoder::new(data));
        self.count_file = Some(files.create_output(
            FileRole::PostingCounts,
            self.header(POSOCC_COUNTS_FORMAT),
            tuning,
            header_context,
        )?);
        self.chunk_file = Some(files.create_output(
            FileRole::PostingChunks,
            self.header(POSOCC_CHUNKS_FORMAT),
            tuning,
            header_context,
        )?);
        Ok(())
    }

    fn add_posting(&mut self, doc_id: u32, features: &DocFeatures) -> Result<()> {
        if self.stream.is_none() {
            return Err(DiskIndexError::invalid_write_sequence(
                "posting file not open",
            ));
        }
        if doc_id >= self.params.counts.doc_id_limit {
            return Err(DiskIndexError::invalid_write_sequence(format!(
                "doc id {doc_id} outside doc id limit {}",
                self.params.counts.doc_id_limit
            )));
        }
        if let Some((last, _)) = self.pending.last() {
            if doc_id <= *last {
                return Err(DiskIndexError::invalid_write_sequence(format!(
                    "doc id {doc_id} not greater than previous doc id {last}"
                )));
            }
        }
        features.validate(self.feature_params.collection_type)?;
        self.pending.push((doc_id, features.clone()));
        Ok(())
    }

    fn flush_word(&mut self) -> Result<()> {
        self.counts.clear();
        if self.pending.is_empty() {
            return Ok(());
        }

        let docs = std::mem::take(&mut self.pending);
        let chunks = self.split_chunks(&docs)?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DiskIndexError::invalid_write_sequence("posting file not open"))?;

        let bit_offset = stream.bits();
        stream.put_exp_golomb(chunks.len() as u64 - 1, 0)?;
        let mut prev_doc = None;
        for range in chunks {
            let segment = write_chunk(
                stream,
                &docs[range],
                prev_doc,
                &self.doc_ids,
                &self.codec,
                self.params.counts.min_skip_docs,
            )?;
            prev_doc = Some(segment.last_doc);
            self.counts.segments.push(segment);
        }
        self.counts.num_docs = docs.len() as u64;
        self.counts.bit_length = stream.bits() - bit_offset;
        self.total_bits = stream.bits();

        self.write_counts(bit_offset)?;
        self.num_words += 1;
        self.total_docs += self.counts.num_docs;

        self.pending = docs;
        self.pending.clear();
        Ok(())
    }

    fn counts(&self) -> &PostingListCounts {
        &self.counts
    }

    fn clear_counts(&mut self) {
        self.counts.clear();
    }

    fn posting_params(&self) -> &PostingParams {
        &self.params
    }

    fn feature_params(&self) -> &FeatureParams {
        &self.feature_params
    }

    fn close(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        if !self.pending.is_empty() {
            failures.push(format!(
                "{} postings were never flushed",
                self.pending.len()
            ));
            self.pending.clear();
        }

        if let Some(stream) = self.stream.take() {
            if let Err(e) = finish_stream(stream, self.num_words) {
                failures.push(format!("posting data: {e}"));
            }
        }
        if let Some(count_file) = self.count_file.take() {
            if let Err(e) = finish_side_file(count_file, |w| w.write_u64(self.num_words)) {
                failures.push(format!("posting counts: {e}"));
            }
        }
        if let Some(chunk_file) = self.chunk_file.take() {
            let result = finish_side_file(chunk_file, |w| {
                w.write_varint(self.num_words)?;
                w.write_varint(self.total_docs)?;
                w.write_varint(self.total_bits)
            });
            if let Err(e) = result {
                failures.push(format!("posting chunks: {e}"));
            }
        }

        if !failures.is_empty() {
            return Err(DiskIndexError::storage(failures.join("; ")));
        }
        debug!(
            "Closed posting file for field '{}': {} words, {} docs, {} bits",
            self.feature_params.field_name, self.num_words, self.total_docs, self.total_bits
        );
        Ok(())
    }
}

/// Byte-align the stream and append the total bit count and word count.
fn finish_stream(stream: PostingStream, num_words: u64) -> Result<()> {
    let (mut data, bits) = stream.finish()?;
    data.write_u64(bits)?;
    data.write_u64(num_words)?;
    data.close()
}

fn finish_side_file<F>(mut writer: StructWriter<FileOutput>, trailer: F) -> Result<()>
where
    F: FnOnce(&mut StructWriter<FileOutput>) -> Result<()>,
{
    trailer(&mut writer)?;
    writer.close()
}

impl std::fmt::Debug for ZcPosOccWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZcPosOccWriter")
            .field("params", &self.params)
            .field("feature_params", &self.feature_params)
            .field("open", &self.stream.is_some())
            .field("pending", &self.pending.len())
            .field("num_words", &self.num_words)
            .field("total_bits", &self.total_bits)
            .finish()
    }
}
