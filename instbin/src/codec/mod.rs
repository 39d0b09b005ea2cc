//! Binary layout of instbin streams.
//!
//! ```text
//! header
//! TYPE record × totalTypes
//! for each type: propertyCount: i32, PROP record × propertyCount
//! "END"
//! ```
//!
//! All integers are little-endian.

pub(crate) mod header;
pub(crate) mod record;
pub(crate) mod values;
pub(crate) mod wire;

pub use header::{END_MARKER, FORMAT_VERSION, MAGIC};
