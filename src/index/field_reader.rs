//! Sequential reader over a finished field segment.

use bit_vec::BitVec;

use crate::error::{DiskIndexError, Result};
use crate::index::bitmap_file::BitmapFileReader;
use crate::index::counts::PostingListCounts;
use crate::index::dictionary::{DictionaryEntry, DictionaryReader};
use crate::index::features::DocFeatures;
use crate::index::file_names::SegmentFiles;
use crate::index::params::{CountParams, FeatureParams};
use crate::index::posocc::ZcPosOccReader;

/// One term with its postings and, if it has one, its overflow bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct WordPostings {
    pub word_number: u64,
    pub compacted_word_number: u64,
    pub text: String,
    pub counts: PostingListCounts,
    pub docs: Vec<(u32, DocFeatures)>,
    pub bitmap: Option<BitVec>,
}

impl WordPostings {
    /// Doc ids of the postings.
    pub fn doc_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.docs.iter().map(|(doc_id, _)| *doc_id)
    }
}

/// Reads a field segment term by term.
///
/// Opening cross-checks the dictionary against the posting count files, and
/// every term read is checked against its dictionary counts and bitmap.
#[derive(Debug)]
pub struct FieldReader {
    files: SegmentFiles,
    dictionary: DictionaryReader,
    postings: ZcPosOccReader,
    bitmaps: BitmapFileReader,
    entries: Vec<DictionaryEntry>,
    next: usize,
}

impl FieldReader {
    pub fn open<S: Into<String>>(prefix: S) -> Result<Self> {
        let files = SegmentFiles::new(prefix);
        let mut dictionary = DictionaryReader::open(&files)?;
        let postings = ZcPosOccReader::open(&files)?;
        let bitmaps = BitmapFileReader::open(&files)?;

        if dictionary.params() != &postings.params().counts {
            return Err(DiskIndexError::index(
                "dictionary and posting file parameters differ",
            ));
        }
        if bitmaps.doc_id_limit() != dictionary.params().doc_id_limit {
            return Err(DiskIndexError::index(
                "bitmap file doc id limit differs from the dictionary",
            ));
        }

        let mut entries = dictionary.entries()?;
        if entries.len() != postings.term_counts().len()
            || dictionary.total_bits() != postings.total_bits()
        {
            return Err(DiskIndexError::index(format!(
                "dictionary has {} words and {} bits, posting file {} words and {} bits",
                entries.len(),
                dictionary.total_bits(),
                postings.term_counts().len(),
                postings.total_bits()
            )));
        }
        for (i, entry) in entries.iter_mut().enumerate() {
            let (bit_offset, num_docs) = postings.term_counts()[i];
            let layout = &postings.chunk_layouts()[i];
            if bit_offset != entry.posting_bit_offset
                || num_docs as u64 != entry.counts.num_docs
                || (!entry.counts.segments.is_empty() && entry.counts.segments != *layout)
            {
                return Err(DiskIndexError::index(format!(
                    "word {} disagrees with the posting count files",
                    entry.word_number
                )));
            }
            entry.counts.segments.clone_from(layout);
        }

        Ok(FieldReader {
            files,
            dictionary,
            postings,
            bitmaps,
            entries,
            next: 0,
        })
    }

    pub fn prefix(&self) -> &str {
        self.files.prefix()
    }

    pub fn count_params(&self) -> &CountParams {
        self.dictionary.params()
    }

    pub fn feature_params(&self) -> &FeatureParams {
        self.postings.feature_params()
    }

    pub fn num_words(&self) -> usize {
        self.entries.len()
    }

    /// Number of terms with an overflow bitmap.
    pub fn num_bitmaps(&self) -> usize {
        self.bitmaps.len()
    }

    /// Read the next term, or `None` after the last.
    pub fn read_word(&mut self) -> Result<Option<WordPostings>> {
        let Some(entry) = self.entries.get(self.next).cloned() else {
            return Ok(None);
        };
        self.next += 1;
        self.load(entry).map(Some)
    }

    /// Read the term with the given word number through the dictionary's
    /// sparse index.
    pub fn lookup(&mut self, word_number: u64) -> Result<Option<WordPostings>> {
        let Some(mut entry) = self.dictionary.lookup(word_number)? else {
            return Ok(None);
        };
        if let Some(known) = self.entries.get(entry.ordinal as usize) {
            entry.counts.segments.clone_from(&known.counts.segments);
        }
        self.load(entry).map(Some)
    }

    fn load(&mut self, entry: DictionaryEntry) -> Result<WordPostings> {
        let docs = self
            .postings
            .read_postings(entry.posting_bit_offset, &entry.counts)?;
        let bitmap = self.bitmaps.get(entry.compacted_word_number)?;
        if let Some(bits) = &bitmap {
            let mut expected = BitVec::from_elem(bits.len(), false);
            for (doc_id, _) in &docs {
                expected.set(*doc_id as usize, true);
            }
            if expected != *bits {
                return Err(DiskIndexError::index(format!(
                    "bitmap of word {} does not match its postings",
                    entry.word_number
                )));
            }
        }
        Ok(WordPostings {
            word_number: entry.word_number,
            compacted_word_number: entry.compacted_word_number,
            text: entry.text,
            counts: entry.counts,
            docs,
            bitmap,
        })
    }

    /// Every bitmap key must belong to a dictionary entry.
    pub fn verify_bitmap_keys(&self) -> Result<()> {
        let mut compacted = self.entries.iter().map(|e| e.compacted_word_number).peekable();
        for key in self.bitmaps.keys() {
            while compacted.next_if(|c| *c < key).is_some() {}
            if compacted.peek() != Some(&key) {
                return Err(DiskIndexError::index(format!(
                    "bitmap key {key} has no dictionary entry"
                )));
            }
        }
        Ok(())
    }
}

impl Iterator for FieldReader {
    type Item = Result<WordPostings>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_word().transpose()
    }
}
