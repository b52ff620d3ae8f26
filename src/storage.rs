//! Storage layer for segment files.
//!
//! Every segment file is a sequential, append-only stream:
//!
//! - [`traits`]: the input/output traits and I/O tuning knobs
//! - [`file`]: buffered file-backed outputs and inputs
//! - [`structured`]: checksummed binary framing on top of an output
//! - [`header`]: the self-describing header stamped at the start of each file

pub mod file;
pub mod header;
pub mod structured;
pub mod traits;

pub use file::*;
pub use header::*;
pub use structured::*;
pub use traits::*;
