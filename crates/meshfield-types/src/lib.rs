//! Typed value model for the meshfield interpolation engine
//!
//! This crate defines the value types a field can take (scalars, fixed and
//! variable arrays, strings and mesh locations), the tagged [`Value`] sum
//! type that holds one value of any of those types, and [`ValueStore`], the
//! flat container that packs `count` values of one declared type with
//! zero/null initialization, bounds-checked access and deep copying.
//!
//! # Modules
//!
//! - `handle`: opaque mesh/element/node handles shared by the other crates
//! - `value`: `ValueType`, `Value`, `MeshLocation`
//! - `store`: `ValueStore`
//! - `error`: error types for value storage

pub mod error;
pub mod handle;
pub mod store;
pub mod value;

// Re-export main types
pub use error::ValueError;
pub use handle::{ElementId, MeshId, NodeId};
pub use store::ValueStore;
pub use value::{MeshLocation, Value, ValueType, MAX_XI_DIMENSIONS};
