//! # diskindex
//!
//! Write-once, per-field inverted index segments.
//!
//! A segment field is written by [`index::FieldWriter`] from an ordered
//! stream of terms and their documents, producing three coupled outputs
//! under one file prefix:
//!
//! - a dictionary mapping word numbers to text and posting counts
//! - a compressed posting occurrence stream with per-document features
//! - an overflow bitmap file for terms that occur in many documents
//!
//! [`index::FieldReader`] reads a finished field back.

pub mod cli;
pub mod error;
pub mod index;
pub mod schema;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::error::{DiskIndexError, Result};
    pub use crate::index::{
        BitmapThreshold, DocFeatures, ElementFeatures, FieldReader, FieldWriter,
        FieldWriterOptions, WordPostings,
    };
    pub use crate::schema::{CollectionType, FieldLengthInfo, IndexField, Schema};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
