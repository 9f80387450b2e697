//! Element field evaluation for the meshfield interpolation engine
//!
//! This crate computes field values and derivatives at local coordinates
//! inside mesh elements. Fields defined only on a higher-dimensional
//! ancestor element are resolved through coordinate inheritance: faces and
//! edges inherit the ancestor's definition through an affine map between
//! their local coordinates.
//!
//! # Architecture
//!
//! - `mesh`: the consumed mesh topology interface (element shapes, face
//!   maps, parent enumeration)
//! - `template`: element field templates and the consumed parameter and
//!   node value providers
//! - `basis`: the shared tensor-product monomial basis, grid-cell
//!   blending and descendant projection
//! - `inheritance`: the ancestor resolver building descendant-to-ancestor
//!   affine transforms
//! - `evaluation`: the per-(field, element, time) interpolation cache and
//!   its evaluate surface
//! - `cache`: bounded, time-keyed caches of evaluation objects
//! - `api`: the consumer façade
//!
//! Everything is single-threaded and synchronous; callers evaluating one
//! field from several threads use independent caches.

pub mod api;
pub mod basis;
pub mod cache;
pub mod error;
pub mod evaluation;
pub mod inheritance;
pub mod mesh;
pub mod template;

// Re-export main types
pub use api::FieldEvaluator;
pub use basis::{BasisDescription, BasisFunctionSource, StandardBasis};
pub use cache::{CacheConfig, EvaluationHandle, FieldEvaluationCache};
pub use error::EvalError;
pub use evaluation::{
    Calculated, ElementFieldEvaluation, EvalContext, MonomialInfo, Perturbations, RealEvaluation,
    MAX_PERTURBATIONS,
};
pub use inheritance::{resolve, Inherited};
pub use mesh::{ElementShape, FaceMap, MeshTopology};
pub use template::{
    ElementFieldTemplate, FieldDataSource, NodeTerm, NodeValueSource, ParameterMapping,
};
