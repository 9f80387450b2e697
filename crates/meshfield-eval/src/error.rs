//! Error types for field evaluation

use meshfield_field::FieldError;
use meshfield_types::{ElementId, ValueError};
use thiserror::Error;

/// Errors raised by coordinate inheritance, element field evaluation and
/// the evaluation cache.
///
/// "Field not defined on this element" is not an error: resolvers and
/// caches report it as a normal `None` result that consumers handle, e.g.
/// at mesh boundaries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Null/out-of-range argument described in place
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Shape data for a required face is missing
    #[error("no face-to-parent map for face {face} of {element}")]
    MissingFaceMap { element: ElementId, face: usize },

    /// Grid parameters cannot be inherited onto a descendant element
    #[error("field {field}: grid parameters are only evaluated on their defining element")]
    GridInheritanceUnsupported { field: String },

    /// General string fields are unsupported
    #[error("field {field}: string fields only support constant or indexed parameters")]
    StringGeneralUnsupported { field: String },

    /// Indexer produced a value outside the indexed table
    #[error("field {field}: index value {value} outside 1..={count}")]
    IndexValueOutOfRange {
        field: String,
        value: i32,
        count: usize,
    },

    /// Too many simultaneous parameter perturbations
    #[error("parameter perturbation capacity exhausted")]
    PerturbationCapacity,

    /// Perturbations must be removed in last-in-first-out order
    #[error("parameter perturbations must be removed in reverse order of addition")]
    PerturbationOrder,

    /// Evaluation object has no calculated state
    #[error("element field evaluation has not been calculated")]
    NotCalculated,

    /// xi coordinate count does not match the element dimension
    #[error("expected {expected} xi coordinates, got {got}")]
    XiDimensionMismatch { expected: usize, got: usize },

    /// Component has no template on the defining element
    #[error("field {field} component {component} has no template on {element}")]
    ComponentTemplateMissing {
        field: String,
        element: ElementId,
        component: usize,
    },

    /// Gathered parameter block has the wrong size
    #[error("expected {expected} parameters, got {got}")]
    ParameterCountMismatch { expected: usize, got: usize },

    /// Component is not in standard monomial form
    #[error("field {field} component {component} is not in monomial form")]
    NonMonomialComponent { field: String, component: usize },

    /// Node/value provider failure
    #[error("node value lookup failed: {0}")]
    Node(String),

    /// Basis function provider failure
    #[error("basis function lookup failed: {0}")]
    Basis(String),

    /// Underlying field-definition failure
    #[error(transparent)]
    Field(#[from] FieldError),

    /// Underlying value-store failure
    #[error(transparent)]
    Value(#[from] ValueError),
}
