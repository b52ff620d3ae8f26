//! Posting stream reader.

use std::io::Read;

use super::{
    DocIdCode, FeatureCodec, InterleavedFeatures, POSOCC_CHUNKS_FORMAT, POSOCC_COUNTS_FORMAT,
    POSOCC_FORMAT, POSOCC_VERSION, SKIP_BITS_K, SKIP_STRIDE, apply_gap,
};
use crate::error::{DiskIndexError, Result};
use crate::index::counts::{PostingListCounts, PostingListSegment};
use crate::index::features::DocFeatures;
use crate::index::file_names::{FileRole, SegmentFiles};
use crate::index::params::{FeatureParams, PostingParams};
use crate::util::bits::BitDecoder;

const STREAM_TRAILER_LEN: usize = 16;

/// Reads back the files written by
/// [`ZcPosOccWriter`](super::ZcPosOccWriter), configuring itself from the
/// header tags.
#[derive(Debug)]
pub struct ZcPosOccReader {
    params: PostingParams,
    feature_params: FeatureParams,
    doc_ids: DocIdCode,
    codec: FeatureCodec,
    data: Vec<u8>,
    total_bits: u64,
    num_words: u64,
    term_counts: Vec<(u64, u32)>,
    chunk_layouts: Vec<Vec<PostingListSegment>>,
}

impl ZcPosOccReader {
    pub fn open(files: &SegmentFiles) -> Result<Self> {
        let (header, reader) =
            files.open_input(FileRole::PostingData, POSOCC_FORMAT, POSOCC_VERSION)?;
        let params = PostingParams::from_tags(&header)?;
        let feature_params = FeatureParams::from_tags(&header)?;

        let body = reader.remaining_slice();
        if body.len() < STREAM_TRAILER_LEN {
            return Err(DiskIndexError::index("posting file too short"));
        }
        let (stream, trailer) = body.split_at(body.len() - STREAM_TRAILER_LEN);
        let total_bits = read_le_u64(&trailer[..8]);
        let num_words = read_le_u64(&trailer[8..]);
        if total_bits > stream.len() as u64 * 8 {
            return Err(DiskIndexError::index(format!(
                "posting stream claims {total_bits} bits in {} bytes",
                stream.len()
            )));
        }

        let term_counts = read_term_counts(files, num_words)?;
        let chunk_layouts = read_chunk_layouts(files, num_words, total_bits)?;

        Ok(ZcPosOccReader {
            doc_ids: DocIdCode::new(&params),
            codec: FeatureCodec::new(&feature_params),
            params,
            feature_params,
            data: stream.to_vec(),
            total_bits,
            num_words,
            term_counts,
            chunk_layouts,
        })
    }

    pub fn params(&self) -> &PostingParams {
        &self.params
    }

    pub fn feature_params(&self) -> &FeatureParams {
        &self.feature_params
    }

    pub fn num_words(&self) -> u64 {
        self.num_words
    }

    pub fn total_bits(&self) -> u64 {
        self.total_bits
    }

    /// Bit offset and doc count of every term, from the count file.
    pub fn term_counts(&self) -> &[(u64, u32)] {
        &self.term_counts
    }

    /// Chunk layout of every term, from the chunk file.
    pub fn chunk_layouts(&self) -> &[Vec<PostingListSegment>] {
        &self.chunk_layouts
    }

    /// Decode the term block at `bit_offset`, checking it against `counts`.
    pub fn read_postings(
        &self,
        bit_offset: u64,
        counts: &PostingListCounts,
    ) -> Result<Vec<(u32, DocFeatures)>> {
        let end = bit_offset.checked_add(counts.bit_length);
        if end.is_none_or(|end| end > self.total_bits) {
            return Err(DiskIndexError::index(format!(
                "term at bit {bit_offset} with {} bits runs past the posting stream",
                counts.bit_length
            )));
        }

        let mut decoder = BitDecoder::new(&self.data[(bit_offset / 8) as usize..]);
        decoder.skip_bits(bit_offset % 8)?;
        let start = decoder.bits_read();

        let num_chunks = decoder.read_exp_golomb(0)? + 1;
        if !counts.segments.is_empty() && counts.segments.len() as u64 != num_chunks {
            return Err(DiskIndexError::index(format!(
                "term at bit {bit_offset} has {num_chunks} chunks, counts list {}",
                counts.segments.len()
            )));
        }

        let mut docs = Vec::new();
        let mut prev_doc = None;
        for chunk in 0..num_chunks as usize {
            let segment = self.read_chunk(&mut decoder, prev_doc, &mut docs)?;
            if let Some(expected) = counts.segments.get(chunk) {
                if *expected != segment {
                    return Err(DiskIndexError::index(format!(
                        "chunk {chunk} at bit {bit_offset} decodes as {segment:?}, expected {expected:?}"
                    )));
                }
            }
            prev_doc = Some(segment.last_doc);
        }

        let consumed = decoder.bits_read() - start;
        if consumed != counts.bit_length || docs.len() as u64 != counts.num_docs {
            return Err(DiskIndexError::index(format!(
                "term at bit {bit_offset} decodes as {} docs in {consumed} bits, expected {} docs in {} bits",
                docs.len(),
                counts.num_docs,
                counts.bit_length
            )));
        }
        Ok(docs)
    }

    fn read_chunk<R: Read>(
        &self,
        decoder: &mut BitDecoder<R>,
        prev_doc: Option<u32>,
        docs: &mut Vec<(u32, DocFeatures)>,
    ) -> Result<PostingListSegment> {
        let chunk_start = decoder.bits_read();
        let num_docs = decoder.read_exp_golomb(0)? + 1;
        if num_docs > self.params.counts.doc_id_limit as u64 {
            return Err(DiskIndexError::index(format!(
                "chunk of {num_docs} docs exceeds doc id limit"
            )));
        }
        let k = self.doc_ids.k(num_docs);

        let mut skips = Vec::new();
        if num_docs >= self.params.counts.min_skip_docs as u64 {
            for _ in 0..(num_docs - 1) / SKIP_STRIDE as u64 {
                skips.push((
                    decoder.read_exp_golomb(k)?,
                    decoder.read_exp_golomb(SKIP_BITS_K)?,
                    decoder.read_exp_golomb(SKIP_BITS_K)?,
                ));
            }
        }

        let doc_section = decoder.bits_read();
        let mut doc_offsets = Vec::with_capacity(num_docs as usize);
        let mut interleaved: Vec<Option<InterleavedFeatures>> =
            Vec::with_capacity(num_docs as usize);
        let first = docs.len();
        let mut prev = prev_doc;
        for _ in 0..num_docs {
            doc_offsets.push(decoder.bits_read() - doc_section);
            let (gap, extras) = self.codec.read_doc(decoder, k)?;
            let doc_id = apply_gap(prev, gap)?;
            if doc_id >= self.params.counts.doc_id_limit {
                return Err(DiskIndexError::index(format!(
                    "decoded doc id {doc_id} outside doc id limit"
                )));
            }
            docs.push((doc_id, DocFeatures::default()));
            interleaved.push(extras);
            prev = Some(doc_id);
        }

        let feature_section = decoder.bits_read();
        let mut feature_offsets = Vec::with_capacity(num_docs as usize);
        for (slot, extras) in docs[first..].iter_mut().zip(interleaved) {
            feature_offsets.push(decoder.bits_read() - feature_section);
            slot.1 = self.codec.read_features(decoder, extras)?;
        }

        let chunk = &docs[first..];
        let (mut doc_id, mut doc_bits, mut feature_bits) = (chunk[0].0 as u64, 0, 0);
        for (i, (doc_delta, doc_bits_delta, feature_bits_delta)) in skips.into_iter().enumerate() {
            let at = (i + 1) * SKIP_STRIDE;
            doc_id += doc_delta + 1;
            doc_bits += doc_bits_delta;
            feature_bits += feature_bits_delta;
            if doc_id != chunk[at].0 as u64
                || doc_bits != doc_offsets[at]
                || feature_bits != feature_offsets[at]
            {
                return Err(DiskIndexError::index(format!(
                    "skip entry {i} does not match doc {} of the chunk",
                    at
                )));
            }
        }

        Ok(PostingListSegment {
            num_docs,
            bit_length: decoder.bits_read() - chunk_start,
            last_doc: chunk[chunk.len() - 1].0,
        })
    }
}

fn read_le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

fn read_term_counts(files: &SegmentFiles, num_words: u64) -> Result<Vec<(u64, u32)>> {
    let (_, mut reader) =
        files.open_input(FileRole::PostingCounts, POSOCC_COUNTS_FORMAT, POSOCC_VERSION)?;
    let mut term_counts = Vec::new();
    while reader.remaining() > 8 {
        term_counts.push((reader.read_u64()?, reader.read_u32()?));
    }
    let trailer = reader.read_u64()?;
    if trailer != num_words || term_counts.len() as u64 != num_words {
        return Err(DiskIndexError::index(format!(
            "posting count file lists {} words, posting file {num_words}",
            term_counts.len()
        )));
    }
    Ok(term_counts)
}

fn read_chunk_layouts(
    files: &SegmentFiles,
    num_words: u64,
    total_bits: u64,
) -> Result<Vec<Vec<PostingListSegment>>> {
    let (_, mut reader) =
        files.open_input(FileRole::PostingChunks, POSOCC_CHUNKS_FORMAT, POSOCC_VERSION)?;
    let mut layouts = Vec::new();
    for _ in 0..num_words {
        let num_chunks = reader.read_varint()?;
        let mut segments = Vec::new();
        for _ in 0..num_chunks {
            let num_docs = reader.read_varint()?;
            let bit_length = reader.read_varint()?;
            let last_doc = u32::try_from(reader.read_varint()?)
                .map_err(|_| DiskIndexError::index("chunk last doc out of range"))?;
            segments.push(PostingListSegment {
                num_docs,
                bit_length,
                last_doc,
            });
        }
        layouts.push(segments);
    }
    let trailer_words = reader.read_varint()?;
    let _total_docs = reader.read_varint()?;
    let trailer_bits = reader.read_varint()?;
    if trailer_words != num_words || trailer_bits != total_bits || !reader.is_eof() {
        return Err(DiskIndexError::index(
            "posting chunk file does not match the posting file",
        ));
    }
    Ok(layouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::features::ElementFeatures;
    use crate::index::params::setup_default_pos_occ_parameters;
    use crate::index::posocc::{PostingEncoder, ZcPosOccWriter};
    use crate::schema::{CollectionType, FieldLengthInfo, IndexField};
    use crate::storage::{DefaultFileHeaderContext, IoTuning};
    use tempfile::TempDir;

    struct Written {
        _dir: TempDir,
        files: SegmentFiles,
        terms: Vec<(u64, PostingListCounts, Vec<(u32, DocFeatures)>)>,
    }

    fn write_terms(
        collection_type: CollectionType,
        configure: impl FnOnce(&mut PostingParams),
        terms: Vec<Vec<(u32, DocFeatures)>>,
    ) -> Written {
        let dir = TempDir::new().unwrap();
        let files = SegmentFiles::new(format!("{}/", dir.path().display()));
        let (_, mut params) = setup_default_pos_occ_parameters(100, 10_000);
        configure(&mut params);
        let field = IndexField::new("body").collection_type(collection_type);
        let feature_params =
            FeatureParams::from_field(0, &field, false, FieldLengthInfo::new(8.0, 3.0, 10));

        let mut writer = ZcPosOccWriter::new(params, feature_params);
        writer
            .open(&files, &IoTuning::default(), &DefaultFileHeaderContext::deterministic())
            .unwrap();
        let mut written = Vec::new();
        let mut offset = 0;
        for docs in terms {
            for (doc_id, features) in &docs {
                writer.add_posting(*doc_id, features).unwrap();
            }
            writer.flush_word().unwrap();
            let counts = writer.counts().clone();
            writer.clear_counts();
            written.push((offset, counts.clone(), docs));
            offset += counts.bit_length;
        }
        writer.close().unwrap();
        Written {
            _dir: dir,
            files,
            terms: written,
        }
    }

    fn positions_doc(doc_id: u32) -> (u32, DocFeatures) {
        (doc_id, DocFeatures::with_positions(10, vec![doc_id % 10]))
    }

    #[test]
    fn test_terms_round_trip() {
        let written = write_terms(
            CollectionType::Single,
            |_| {},
            vec![
                vec![positions_doc(1), positions_doc(5), positions_doc(9_999)],
                vec![positions_doc(0)],
            ],
        );
        let reader = ZcPosOccReader::open(&written.files).unwrap();
        assert_eq!(reader.num_words(), 2);
        assert_eq!(reader.feature_params().field_name, "body");
        for (i, (offset, counts, docs)) in written.terms.iter().enumerate() {
            assert_eq!(reader.term_counts()[i], (*offset, docs.len() as u32));
            assert_eq!(reader.chunk_layouts()[i], counts.segments);
            assert_eq!(&reader.read_postings(*offset, counts).unwrap(), docs);
        }
    }

    #[test]
    fn test_chunks_and_skip_tables() {
        let docs: Vec<_> = (0..200).map(|i| positions_doc(i * 7)).collect();
        let written = write_terms(
            CollectionType::Single,
            |params| {
                params.counts.min_chunk_docs = 80;
                params.counts.min_skip_docs = 16;
            },
            vec![docs.clone()],
        );
        let (offset, counts, _) = &written.terms[0];
        let sizes: Vec<u64> = counts.segments.iter().map(|s| s.num_docs).collect();
        assert_eq!(sizes, vec![80, 80, 40]);
        assert_eq!(counts.segments[0].last_doc, 79 * 7);

        let reader = ZcPosOccReader::open(&written.files).unwrap();
        assert_eq!(reader.read_postings(*offset, counts).unwrap(), docs);
    }

    #[test]
    fn test_feature_size_flush() {
        let docs: Vec<_> = (0..50)
            .map(|i| {
                let features = DocFeatures::new(40)
                    .add_element(ElementFeatures::new(0, 20, (0..20).collect()).weight(i))
                    .add_element(ElementFeatures::new(3, 20, vec![1, 19]).weight(-i));
                (i as u32 * 3, features)
            })
            .collect();
        let written = write_terms(
            CollectionType::WeightedSet,
            |params| params.features_size_flush_bits = Some(256),
            vec![docs.clone()],
        );
        let (offset, counts, _) = &written.terms[0];
        assert!(counts.segments.len() > 1);
        let reader = ZcPosOccReader::open(&written.files).unwrap();
        assert_eq!(reader.read_postings(*offset, counts).unwrap(), docs);
    }

    #[test]
    fn test_mismatched_counts_are_rejected() {
        let written = write_terms(
            CollectionType::Single,
            |_| {},
            vec![vec![positions_doc(3), positions_doc(4)]],
        );
        let reader = ZcPosOccReader::open(&written.files).unwrap();
        let (offset, counts, _) = &written.terms[0];
        let mut wrong = counts.clone();
        wrong.num_docs += 1;
        assert!(reader.read_postings(*offset, &wrong).is_err());
        wrong = counts.clone();
        wrong.bit_length = reader.total_bits() + 1;
        assert!(reader.read_postings(*offset, &wrong).is_err());
    }

    #[test]
    fn test_out_of_order_postings() {
        let dir = TempDir::new().unwrap();
        let files = SegmentFiles::new(format!("{}/", dir.path().display()));
        let (_, params) = setup_default_pos_occ_parameters(10, 100);
        let feature_params =
            FeatureParams::from_field(0, &IndexField::new("f"), false, FieldLengthInfo::default());
        let mut writer = ZcPosOccWriter::new(params, feature_params);
        assert!(writer.add_posting(1, &DocFeatures::new(1)).is_err());

        writer
            .open(&files, &IoTuning::default(), &DefaultFileHeaderContext::deterministic())
            .unwrap();
        writer.add_posting(5, &DocFeatures::new(1)).unwrap();
        assert!(writer.add_posting(5, &DocFeatures::new(1)).is_err());
        assert!(writer.add_posting(100, &DocFeatures::new(1)).is_err());
        writer.flush_word().unwrap();
        writer.close().unwrap();
    }
}
