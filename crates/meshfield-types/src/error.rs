//! Error types for value storage

use crate::value::ValueType;
use thiserror::Error;

/// Errors raised by the value model and value stores
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// Value type cannot be held in a time sequence
    #[error("value type {0} cannot be stored in a time sequence")]
    UnsupportedTimeSequenceType(ValueType),

    /// Index past the end of a store
    #[error("value index {index} out of bounds for store of {len} values")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Value variant does not match the store's declared type
    #[error("type mismatch: store holds {expected} values, got {got}")]
    TypeMismatch { expected: ValueType, got: ValueType },

    /// Source and destination stores disagree on value count
    #[error("store count mismatch: destination holds {dst} values, source {src}")]
    CountMismatch { dst: usize, src: usize },

    /// Mesh-location coordinate tuple longer than the supported maximum
    #[error("mesh location has {got} coordinates, maximum supported is {max}")]
    TooManyCoordinates { got: usize, max: usize },
}
