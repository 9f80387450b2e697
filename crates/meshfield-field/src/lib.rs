//! Field definitions for the meshfield interpolation engine
//!
//! A [`Field`] is a named, typed quantity defined over a region. It owns an
//! ordered list of components, a value type, a coordinate-system tag and
//! exactly one of three parameter sources: a global constant table, a table
//! indexed by the integer value of another field, or general per-element
//! parameters stored externally with the mesh.
//!
//! Every mutator is all-or-nothing: it validates first and swaps state
//! last, so a failed call leaves the field observably unchanged.

pub mod error;
pub mod field;

// Re-export main types
pub use error::{FieldError, IndexerRejection};
pub use field::{CoordinateSystem, Field, FieldHandle, SourceKind};
