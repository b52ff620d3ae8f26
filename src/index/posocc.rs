//! Compressed posting occurrence files.
//!
//! The field writer talks to the posting encoder through the
//! [`PostingEncoder`] trait; [`make_pos_occ_write`] picks the shipped
//! implementation, [`ZcPosOccWriter`].
//!
//! # Stream layout
//!
//! The posting stream is a sequence of Exp-Golomb codes. Each term block is
//! its chunk count minus one followed by the chunks. A chunk is:
//!
//! - its doc count minus one
//! - a skip table when the chunk holds at least `min_skip_docs` docs: one
//!   entry for every [`SKIP_STRIDE`]th doc giving the doc id delta and the
//!   bit deltas into the doc and feature sections
//! - the doc section: one doc id gap per doc, followed by the field length
//!   and occurrence count when features are interleaved
//! - the feature section: per doc features (see [`FeatureCodec`])

mod reader;
mod writer;

use std::io::Read;

use crate::error::{DiskIndexError, Result};
use crate::index::counts::PostingListCounts;
use crate::index::features::{DocFeatures, ElementFeatures};
use crate::index::file_names::SegmentFiles;
use crate::index::params::{FeatureParams, PostingParams};
use crate::storage::{FileHeaderContext, IoTuning};
use crate::util::bits::{BitDecoder, BitSink, bit_width, zigzag_decode, zigzag_encode};

pub use reader::ZcPosOccReader;
pub use writer::ZcPosOccWriter;

/// Header format of the posting stream file.
pub const POSOCC_FORMAT: &str = "diskindex.posocc.zc";
/// Header format of the per-term count file.
pub const POSOCC_COUNTS_FORMAT: &str = "diskindex.posocc.cnt";
/// Header format of the per-term chunk layout file.
pub const POSOCC_CHUNKS_FORMAT: &str = "diskindex.posocc.ccnt";
pub const POSOCC_VERSION: u32 = 1;

/// Docs between skip table entries.
pub const SKIP_STRIDE: usize = 16;

const SKIP_BITS_K: u32 = 8;
const POSITION_K: u32 = 1;
const MAX_DOC_ID_K: u32 = 31;

/// Encodes the postings of one field, one term at a time.
///
/// Calls arrive as `add_posting*` then `flush_word` for every term, after
/// which the caller reads [`counts`](PostingEncoder::counts) and clears them.
pub trait PostingEncoder: Send + std::fmt::Debug {
    /// Create the posting files.
    fn open(
        &mut self,
        files: &SegmentFiles,
        tuning: &IoTuning,
        header_context: &dyn FileHeaderContext,
    ) -> Result<()>;

    /// Add a document to the current term. Doc ids must strictly increase
    /// within a term.
    fn add_posting(&mut self, doc_id: u32, features: &DocFeatures) -> Result<()>;

    /// Encode the current term. A term without postings leaves the counts
    /// empty and writes nothing.
    fn flush_word(&mut self) -> Result<()>;

    /// Counts of the most recently flushed term.
    fn counts(&self) -> &PostingListCounts;

    fn clear_counts(&mut self);

    fn posting_params(&self) -> &PostingParams;

    fn feature_params(&self) -> &FeatureParams;

    /// Finish and close the posting files.
    fn close(&mut self) -> Result<()>;
}

/// Create the posting encoder for the given parameters.
pub fn make_pos_occ_write(
    params: PostingParams,
    feature_params: FeatureParams,
) -> Box<dyn PostingEncoder> {
    Box::new(ZcPosOccWriter::new(params, feature_params))
}

/// Chooses the Exp-Golomb order of doc id gaps.
///
/// The fixed format uses one order for the whole field. The dynamic format
/// derives it from each chunk's doc count, which the reader knows before it
/// reaches the gaps, so the order is never stored.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DocIdCode {
    doc_id_limit: u32,
    dynamic: bool,
}

impl DocIdCode {
    pub(crate) fn new(params: &PostingParams) -> Self {
        DocIdCode {
            doc_id_limit: params.counts.doc_id_limit,
            dynamic: params.dynamic_format,
        }
    }

    pub(crate) fn k(&self, num_docs: u64) -> u32 {
        if self.dynamic {
            let average_gap = self.doc_id_limit as u64 / num_docs.max(1);
            bit_width(average_gap).saturating_sub(1).min(MAX_DOC_ID_K)
        } else {
            bit_width(self.doc_id_limit as u64).saturating_sub(1) / 2
        }
    }
}

/// Gap from the previous doc id (or from zero).
pub(crate) fn doc_gap(prev: Option<u32>, doc_id: u32) -> u64 {
    match prev {
        None => doc_id as u64,
        Some(prev) => (doc_id - prev - 1) as u64,
    }
}

pub(crate) fn apply_gap(prev: Option<u32>, gap: u64) -> Result<u32> {
    let value = match prev {
        None => gap,
        Some(prev) => prev as u64 + 1 + gap,
    };
    to_u32(value, "doc id")
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| DiskIndexError::index(format!("{what} {value} out of range")))
}

/// Field length and occurrence count carried in the doc section.
pub(crate) type InterleavedFeatures = (u32, u64);

/// Encodes doc features for one field.
///
/// Without interleaving, each doc's feature entry starts with the field
/// length and occurrence count. Multi-value fields then give the element
/// count and per element the id gap, the zig-zag weight (weighted sets
/// only), the element length, the position count and the position gaps.
/// Single-value fields give just the position gaps.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FeatureCodec {
    interleaved: bool,
    has_elements: bool,
    weighted: bool,
    field_length_k: u32,
    element_length_k: u32,
}

impl FeatureCodec {
    pub(crate) fn new(params: &FeatureParams) -> Self {
        FeatureCodec {
            interleaved: params.interleaved_features,
            has_elements: params.collection_type.has_elements(),
            weighted: params.collection_type.has_element_weights(),
            field_length_k: params.field_length_k(),
            element_length_k: params.element_length_k(),
        }
    }

    pub(crate) fn write_doc<S: BitSink>(
        &self,
        sink: &mut S,
        gap: u64,
        doc_id_k: u32,
        features: &DocFeatures,
    ) -> Result<()> {
        sink.put_exp_golomb(gap, doc_id_k)?;
        if self.interleaved {
            sink.put_exp_golomb(features.field_length as u64, self.field_length_k)?;
            sink.put_exp_golomb(features.num_occs(), 0)?;
        }
        Ok(())
    }

    pub(crate) fn write_features<S: BitSink>(
        &self,
        sink: &mut S,
        features: &DocFeatures,
    ) -> Result<()> {
        if !self.interleaved {
            sink.put_exp_golomb(features.field_length as u64, self.field_length_k)?;
            sink.put_exp_golomb(features.num_occs(), 0)?;
        }
        if !self.has_elements {
            if let Some(element) = features.elements.first() {
                write_positions(sink, &element.positions)?;
            }
            return Ok(());
        }

        sink.put_exp_golomb(features.elements.len() as u64, 0)?;
        let mut prev: Option<u32> = None;
        for element in &features.elements {
            sink.put_exp_golomb(doc_gap(prev, element.element_id), 0)?;
            prev = Some(element.element_id);
            if self.weighted {
                sink.put_exp_golomb(zigzag_encode(element.weight), 0)?;
            }
            sink.put_exp_golomb(element.element_length as u64, self.element_length_k)?;
            sink.put_exp_golomb(element.positions.len() as u64, 0)?;
            write_positions(sink, &element.positions)?;
        }
        Ok(())
    }

    pub(crate) fn read_doc<R: Read>(
        &self,
        decoder: &mut BitDecoder<R>,
        doc_id_k: u32,
    ) -> Result<(u64, Option<InterleavedFeatures>)> {
        let gap = decoder.read_exp_golomb(doc_id_k)?;
        if !self.interleaved {
            return Ok((gap, None));
        }
        let field_length = to_u32(decoder.read_exp_golomb(self.field_length_k)?, "field length")?;
        let num_occs = decoder.read_exp_golomb(0)?;
        Ok((gap, Some((field_length, num_occs))))
    }

    pub(crate) fn read_features<R: Read>(
        &self,
        decoder: &mut BitDecoder<R>,
        interleaved: Option<InterleavedFeatures>,
    ) -> Result<DocFeatures> {
        let (field_length, num_occs) = match interleaved {
            Some(values) => values,
            None => (
                to_u32(decoder.read_exp_golomb(self.field_length_k)?, "field length")?,
                decoder.read_exp_golomb(0)?,
            ),
        };

        if !self.has_elements {
            if num_occs == 0 {
                return Ok(DocFeatures::new(field_length));
            }
            let positions = read_positions(decoder, num_occs)?;
            return Ok(DocFeatures::with_positions(field_length, positions));
        }

        let num_elements = decoder.read_exp_golomb(0)?;
        let mut features = DocFeatures::new(field_length);
        let mut prev: Option<u32> = None;
        for _ in 0..num_elements {
            let element_id = apply_gap(prev, decoder.read_exp_golomb(0)?)?;
            prev = Some(element_id);
            let weight = if self.weighted {
                zigzag_decode(decoder.read_exp_golomb(0)?)
            } else {
                1
            };
            let element_length = to_u32(
                decoder.read_exp_golomb(self.element_length_k)?,
                "element length",
            )?;
            let count = decoder.read_exp_golomb(0)?;
            let positions = read_positions(decoder, count)?;
            features.elements.push(ElementFeatures {
                element_id,
                weight,
                element_length,
                positions,
            });
        }
        if features.num_occs() != num_occs {
            return Err(DiskIndexError::index(format!(
                "occurrence count {num_occs} does not match {} decoded positions",
                features.num_occs()
            )));
        }
        Ok(features)
    }
}

fn write_positions<S: BitSink>(sink: &mut S, positions: &[u32]) -> Result<()> {
    let mut prev: Option<u32> = None;
    for &position in positions {
        sink.put_exp_golomb(doc_gap(prev, position), POSITION_K)?;
        prev = Some(position);
    }
    Ok(())
}

fn read_positions<R: Read>(decoder: &mut BitDecoder<R>, count: u64) -> Result<Vec<u32>> {
    let mut positions = Vec::new();
    let mut prev: Option<u32> = None;
    for _ in 0..count {
        let position = apply_gap(prev, decoder.read_exp_golomb(POSITION_K)?)?;
        positions.push(position);
        prev = Some(position);
    }
    Ok(positions)
}
