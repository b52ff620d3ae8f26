//! Parameters shared between the field writer, the dictionary and the
//! posting encoder.

use crate::error::{DiskIndexError, Result};
use crate::schema::{CollectionType, FieldLengthInfo, IndexField};
use crate::storage::header::FileHeader;
use crate::util::bits::bit_width;

/// Default number of docs in a chunk before a skip table is written.
pub const DEFAULT_MIN_SKIP_DOCS: u32 = 64;

/// Default maximum number of docs per posting chunk.
pub const DEFAULT_MIN_CHUNK_DOCS: u32 = 262_144;

/// Parameters describing posting list counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountParams {
    pub doc_id_limit: u32,
    pub num_word_ids: u64,
    pub min_skip_docs: u32,
    pub min_chunk_docs: u32,
}

impl CountParams {
    /// Apply caller overrides; zero keeps the current value.
    pub fn with_overrides(mut self, min_skip_docs: u32, min_chunk_docs: u32) -> Self {
        if min_skip_docs > 0 {
            self.min_skip_docs = min_skip_docs;
        }
        if min_chunk_docs > 0 {
            self.min_chunk_docs = min_chunk_docs;
        }
        self
    }

    pub(crate) fn write_tags(&self, header: &mut FileHeader) {
        header.set_tag("docIdLimit", self.doc_id_limit);
        header.set_tag("numWordIds", self.num_word_ids);
        header.set_tag("minSkipDocs", self.min_skip_docs);
        header.set_tag("minChunkDocs", self.min_chunk_docs);
    }

    pub(crate) fn from_tags(header: &FileHeader) -> Result<Self> {
        let params = CountParams {
            doc_id_limit: header.parse_tag("docIdLimit")?,
            num_word_ids: header.parse_tag("numWordIds")?,
            min_skip_docs: header.parse_tag("minSkipDocs")?,
            min_chunk_docs: header.parse_tag("minChunkDocs")?,
        };
        if params.min_skip_docs == 0 || params.min_chunk_docs == 0 {
            return Err(DiskIndexError::index(
                "skip and chunk thresholds must be positive",
            ));
        }
        Ok(params)
    }
}

/// Parameters of the posting stream encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingParams {
    pub counts: CountParams,
    /// Close a chunk once its feature section reaches this many bits.
    pub features_size_flush_bits: Option<u64>,
    /// Store field length and occurrence count next to each doc id.
    pub interleaved_features: bool,
    /// Pick the doc id code per chunk from its density instead of once per
    /// field.
    pub dynamic_format: bool,
}

impl PostingParams {
    pub(crate) fn write_tags(&self, header: &mut FileHeader) {
        self.counts.write_tags(header);
        header.set_tag(
            "featuresSizeFlushBits",
            self.features_size_flush_bits.unwrap_or(0),
        );
        header.set_tag("interleavedFeatures", self.interleaved_features);
        header.set_tag("dynamicFormat", self.dynamic_format);
    }

    pub(crate) fn from_tags(header: &FileHeader) -> Result<Self> {
        let flush_bits: u64 = header.parse_tag("featuresSizeFlushBits")?;
        Ok(PostingParams {
            counts: CountParams::from_tags(header)?,
            features_size_flush_bits: (flush_bits > 0).then_some(flush_bits),
            interleaved_features: header.parse_tag("interleavedFeatures")?,
            dynamic_format: header.parse_tag("dynamicFormat")?,
        })
    }
}

/// Default count and posting parameters for a field with `num_word_ids`
/// words over `doc_id_limit` documents.
pub fn setup_default_pos_occ_parameters(
    num_word_ids: u64,
    doc_id_limit: u32,
) -> (CountParams, PostingParams) {
    let counts = CountParams {
        doc_id_limit,
        num_word_ids,
        min_skip_docs: DEFAULT_MIN_SKIP_DOCS,
        min_chunk_docs: DEFAULT_MIN_CHUNK_DOCS,
    };
    let postings = PostingParams {
        counts,
        features_size_flush_bits: None,
        interleaved_features: false,
        dynamic_format: true,
    };
    (counts, postings)
}

/// Parameters of the feature encoding for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureParams {
    pub index_id: u32,
    pub field_name: String,
    pub collection_type: CollectionType,
    pub interleaved_features: bool,
    pub field_length_info: FieldLengthInfo,
}

impl FeatureParams {
    pub fn from_field(
        index_id: u32,
        field: &IndexField,
        interleaved_features: bool,
        field_length_info: FieldLengthInfo,
    ) -> Self {
        FeatureParams {
            index_id,
            field_name: field.name.clone(),
            collection_type: field.collection_type,
            interleaved_features,
            field_length_info,
        }
    }

    /// Exp-Golomb order for field lengths.
    pub fn field_length_k(&self) -> u32 {
        length_k(self.field_length_info.average_field_length)
    }

    /// Exp-Golomb order for element lengths.
    pub fn element_length_k(&self) -> u32 {
        length_k(self.field_length_info.average_element_length)
    }

    pub(crate) fn write_tags(&self, header: &mut FileHeader) {
        header.set_tag("indexId", self.index_id);
        header.set_tag("fieldName", &self.field_name);
        header.set_tag("collectionType", self.collection_type);
        header.set_tag(
            "averageFieldLength",
            self.field_length_info.average_field_length,
        );
        header.set_tag(
            "averageElementLength",
            self.field_length_info.average_element_length,
        );
        header.set_tag("fieldLengthSamples", self.field_length_info.num_samples);
    }

    pub(crate) fn from_tags(header: &FileHeader) -> Result<Self> {
        Ok(FeatureParams {
            index_id: header.parse_tag("indexId")?,
            field_name: header.parse_tag("fieldName")?,
            collection_type: header.parse_tag("collectionType")?,
            interleaved_features: header.parse_tag("interleavedFeatures")?,
            field_length_info: FieldLengthInfo::new(
                header.parse_tag("averageFieldLength")?,
                header.parse_tag("averageElementLength")?,
                header.parse_tag("fieldLengthSamples")?,
            ),
        })
    }
}

// floor(log2(average)), capped at 16.
fn length_k(average: f64) -> u32 {
    if !average.is_finite() || average < 2.0 {
        return 0;
    }
    let average = average.min(u32::MAX as f64) as u64;
    (bit_width(average) - 1).min(16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        let (counts, postings) = setup_default_pos_occ_parameters(500, 10_000);
        assert_eq!(counts.min_skip_docs, DEFAULT_MIN_SKIP_DOCS);
        assert_eq!(counts.min_chunk_docs, DEFAULT_MIN_CHUNK_DOCS);
        assert_eq!(postings.counts, counts);
        assert!(postings.dynamic_format);
        assert!(postings.features_size_flush_bits.is_none());

        let counts = counts.with_overrides(0, 128);
        assert_eq!(counts.min_skip_docs, DEFAULT_MIN_SKIP_DOCS);
        assert_eq!(counts.min_chunk_docs, 128);
    }

    #[test]
    fn test_posting_params_tags() {
        let (counts, mut postings) = setup_default_pos_occ_parameters(42, 1000);
        postings.counts = counts.with_overrides(8, 100);
        postings.features_size_flush_bits = Some(4096);
        postings.interleaved_features = true;

        let mut header = FileHeader::new("test", 1);
        postings.write_tags(&mut header);
        assert_eq!(PostingParams::from_tags(&header).unwrap(), postings);
    }

    #[test]
    fn test_feature_params_tags() {
        let field = IndexField::new("tags").collection_type(CollectionType::WeightedSet);
        let params = FeatureParams::from_field(3, &field, true, FieldLengthInfo::new(12.5, 3.0, 9));
        let mut header = FileHeader::new("test", 1);
        params.write_tags(&mut header);
        header.set_tag("interleavedFeatures", true);
        assert_eq!(FeatureParams::from_tags(&header).unwrap(), params);
    }

    #[test]
    fn test_length_k() {
        assert_eq!(length_k(0.0), 0);
        assert_eq!(length_k(1.5), 0);
        assert_eq!(length_k(2.0), 1);
        assert_eq!(length_k(12.5), 3);
        assert_eq!(length_k(f64::NAN), 0);
        assert_eq!(length_k(1e12), 16);
    }
}
