//! Posting list counts reported by the encoder after each term.

use serde::{Deserialize, Serialize};

/// One chunk of a posting list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingListSegment {
    pub num_docs: u64,
    pub bit_length: u64,
    pub last_doc: u32,
}

/// Size of a flushed posting list.
///
/// `segments` lists the chunks; a term block also spends a few bits on its
/// chunk count, so the segment bit lengths sum to slightly less than
/// `bit_length`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingListCounts {
    pub num_docs: u64,
    pub bit_length: u64,
    pub segments: Vec<PostingListSegment>,
}

impl PostingListCounts {
    pub fn clear(&mut self) {
        self.num_docs = 0;
        self.bit_length = 0;
        self.segments.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.num_docs == 0 && self.bit_length == 0 && self.segments.is_empty()
    }

    /// Last doc id of the list, if any.
    pub fn last_doc(&self) -> Option<u32> {
        self.segments.last().map(|segment| segment.last_doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear() {
        let mut counts = PostingListCounts {
            num_docs: 3,
            bit_length: 40,
            segments: vec![PostingListSegment {
                num_docs: 3,
                bit_length: 39,
                last_doc: 17,
            }],
        };
        assert_eq!(counts.last_doc(), Some(17));
        assert!(!counts.is_empty());
        counts.clear();
        assert!(counts.is_empty());
        assert_eq!(counts.last_doc(), None);
    }
}
