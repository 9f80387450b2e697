//! Coordinate inheritance
//!
//! Faces and edges inherit a field's definition from the higher-
//! dimensional elements they bound. Given an element, the resolver walks
//! the parent chain to the element actually carrying the definition and
//! accumulates the affine map from the element's local coordinates into
//! the ancestor's.

use crate::error::EvalError;
use crate::mesh::{FaceMap, MeshTopology};
use crate::template::FieldDataSource;
use log::trace;
use meshfield_field::Field;
use meshfield_types::ElementId;
use ndarray::Array2;

/// Where a field's definition was found for an element
#[derive(Debug, Clone, PartialEq)]
pub struct Inherited {
    /// The element carrying the definition
    pub ancestor: ElementId,
    /// Affine map sending `(1, elementXi...)` to `ancestorXi`; `None` when
    /// the definition is directly on the element itself
    pub transform: Option<Array2<f64>>,
}

impl Inherited {
    /// Map element-local xi coordinates into the ancestor's
    pub fn map_xi(&self, xi: &[f64]) -> Result<Vec<f64>, EvalError> {
        match &self.transform {
            None => Ok(xi.to_vec()),
            Some(matrix) => {
                if xi.len() + 1 != matrix.ncols() {
                    return Err(EvalError::XiDimensionMismatch {
                        expected: matrix.ncols() - 1,
                        got: xi.len(),
                    });
                }
                let mut out = Vec::with_capacity(matrix.nrows());
                for row in matrix.rows() {
                    let mut v = row[0];
                    for (j, x) in xi.iter().enumerate() {
                        v += row[j + 1] * x;
                    }
                    out.push(v);
                }
                Ok(out)
            }
        }
    }
}

/// Find the element carrying `field`'s definition for `element`.
///
/// The fast path returns the element itself with an identity transform
/// when the field is directly defined on it (and no top-level hint or
/// forced face says otherwise). Otherwise immediate parents are tried in
/// the topology's enumeration order and the first parent reaching a
/// definition wins; with several defining parents (non-manifold
/// topologies) the result is therefore enumeration-order dependent.
///
/// Returns `Ok(None)` when no parent chain reaches a definition — a
/// normal outcome at mesh boundaries, not an error. Missing face-map data
/// on a required face is an error.
pub fn resolve(
    field: &Field,
    element: ElementId,
    force_face: Option<usize>,
    top_level: Option<ElementId>,
    mesh: &dyn MeshTopology,
    data: &dyn FieldDataSource,
) -> Result<Option<Inherited>, EvalError> {
    if force_face.is_none()
        && data.has_definition(field, element)
        && top_level.map_or(true, |wanted| wanted == element)
    {
        return Ok(Some(Inherited {
            ancestor: element,
            transform: None,
        }));
    }

    if let Some(face) = force_face {
        // resolve the element itself, then step down onto its face
        let inherited = match resolve(field, element, None, top_level, mesh, data)? {
            Some(inherited) => inherited,
            None => return Ok(None),
        };
        let shape = mesh.shape(element)?;
        let face_map = shape
            .face_map(face)
            .ok_or(EvalError::MissingFaceMap { element, face })?;
        let transform = compose(inherited.transform.as_ref(), face_map);
        trace!(
            "field {} on face {} of {} inherits from {}",
            field.name(),
            face,
            element,
            inherited.ancestor
        );
        return Ok(Some(Inherited {
            ancestor: inherited.ancestor,
            transform: Some(transform),
        }));
    }

    for parent in mesh.parents(element) {
        let inherited = match resolve(field, parent, None, top_level, mesh, data)? {
            Some(inherited) => inherited,
            None => continue,
        };
        let face = match mesh.face_number(parent, element) {
            Some(face) => face,
            None => continue,
        };
        let shape = mesh.shape(parent)?;
        let face_map = shape.face_map(face).ok_or(EvalError::MissingFaceMap {
            element: parent,
            face,
        })?;
        let transform = compose(inherited.transform.as_ref(), face_map);
        trace!(
            "field {} on {} inherits from {} via face {} of {}",
            field.name(),
            element,
            inherited.ancestor,
            face,
            parent
        );
        return Ok(Some(Inherited {
            ancestor: inherited.ancestor,
            transform: Some(transform),
        }));
    }

    Ok(None)
}

/// Compose an accumulated ancestor transform with a face-to-parent map.
///
/// With no accumulated transform the face map itself maps the face into
/// the ancestor. Otherwise the accumulated matrix (ancestor rows over
/// `(1, parentXi...)` columns) multiplies the face map augmented with the
/// constant row, so the result again maps `(1, faceXi...)` to
/// `ancestorXi`; the ancestor dimension may exceed the parent's.
fn compose(accumulated: Option<&Array2<f64>>, face_map: &FaceMap) -> Array2<f64> {
    match accumulated {
        None => face_map.matrix().clone(),
        Some(upper) => {
            let face_matrix = face_map.matrix();
            let mut augmented = Array2::zeros((face_matrix.nrows() + 1, face_matrix.ncols()));
            augmented[[0, 0]] = 1.0;
            for i in 0..face_matrix.nrows() {
                for j in 0..face_matrix.ncols() {
                    augmented[[i + 1, j]] = face_matrix[[i, j]];
                }
            }
            upper.dot(&augmented)
        }
    }
}
