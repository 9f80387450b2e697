//! Error types for field definitions

use meshfield_types::{ValueError, ValueType};
use std::fmt;
use thiserror::Error;

/// Why a field was rejected as an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerRejection {
    /// Indexer fields must have exactly one component
    MultiComponent,
    /// Indexer fields must be integer-valued
    NonInteger,
    /// Indexer fields may not themselves be indexed
    Indexed,
    /// A field may not index itself
    SelfReference,
}

impl fmt::Display for IndexerRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            IndexerRejection::MultiComponent => "has more than one component",
            IndexerRejection::NonInteger => "is not integer-valued",
            IndexerRejection::Indexed => "is itself indexed",
            IndexerRejection::SelfReference => "is the field being indexed",
        };
        write!(f, "{}", reason)
    }
}

/// Errors raised by field definition mutators and accessors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    /// Component index past the field's component count
    #[error("field {field} has no component {component}")]
    InvalidComponent { field: String, component: usize },

    /// Proposed indexer field violates the indexer shape rules
    #[error("field {field} cannot use the proposed indexer: it {reason}")]
    InvalidIndexer {
        field: String,
        reason: IndexerRejection,
    },

    /// Indexed fields need at least one index value
    #[error("field {field} cannot be indexed over zero index values")]
    InvalidIndexCount { field: String },

    /// Value type only supported on single-component fields
    #[error("field {field}: {value_type} fields must have exactly one component")]
    MultiComponentUnsupported {
        field: String,
        value_type: ValueType,
    },

    /// Host mesh reference is set exactly once
    #[error("field {field} already has a host mesh")]
    HostMeshAlreadySet { field: String },

    /// Mesh-location values need the host mesh reference first
    #[error("field {field} has no host mesh to locate values in")]
    HostMeshRequired { field: String },

    /// Linear value index past the variant's value count
    #[error("field {field}: value index {index} out of range for {count} stored values")]
    IndexOutOfRange {
        field: String,
        index: usize,
        count: usize,
    },

    /// Underlying value-store failure
    #[error(transparent)]
    Value(#[from] ValueError),
}
