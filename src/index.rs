//! Per-field disk index segments.
//!
//! A [`FieldWriter`](field_writer::FieldWriter) turns an ordered stream of
//! terms and their documents into three coupled outputs sharing one file
//! prefix:
//!
//! - a dictionary ([`dictionary`]): word number, text and posting counts
//! - a compressed posting stream ([`posocc`]) with its count side files
//! - a bitmap overflow file ([`bitmap_file`]) for terms dense enough to
//!   cross the bitmap threshold ([`bitvector`])
//!
//! [`FieldReader`](field_reader::FieldReader) reads a finished segment back
//! sequentially.

pub mod bitmap_file;
pub mod bitvector;
pub mod counts;
pub mod dictionary;
pub mod features;
pub mod field_reader;
pub mod field_writer;
pub mod file_names;
pub mod params;
pub mod posocc;

pub use bitvector::{BitVectorCandidate, BitmapThreshold};
pub use counts::{PostingListCounts, PostingListSegment};
pub use features::{DocFeatures, ElementFeatures};
pub use field_reader::{FieldReader, WordPostings};
pub use field_writer::{FieldWriter, FieldWriterOptions, FieldWriterStats, NO_WORD_NUM};
pub use file_names::{FileRole, SEGMENT_FILES, SegmentFiles};
pub use params::{CountParams, FeatureParams, PostingParams};
pub use posocc::PostingEncoder;
