//! Shared utility modules.

pub mod bits;
pub mod varint;
