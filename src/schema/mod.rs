//! Index schema: the set of indexed fields and their feature layout.

pub mod field;
#[allow(clippy::module_inception)]
pub mod schema;

pub use field::*;
pub use schema::*;
