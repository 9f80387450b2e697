//! Mesh topology interface
//!
//! The engine consumes mesh topology through the [`MeshTopology`] trait:
//! element dimensions, element shapes with their face-to-parent coordinate
//! maps, and parent enumeration. Handles returned by a provider must stay
//! stable for the lifetime of an evaluation pass.

use crate::error::EvalError;
use meshfield_types::ElementId;
use ndarray::Array2;

/// Affine map from a face's local coordinates into its parent's.
///
/// The matrix has one row per parent xi and `face_dimension + 1` columns;
/// column 0 is the constant offset, so the map sends `(1, faceXi...)` to
/// `parentXi`.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMap {
    matrix: Array2<f64>,
}

impl FaceMap {
    pub fn new(matrix: Array2<f64>) -> Result<Self, EvalError> {
        if matrix.ncols() < 1 || matrix.nrows() < 1 {
            return Err(EvalError::InvalidArgument(
                "face map needs at least one row and the offset column",
            ));
        }
        Ok(FaceMap { matrix })
    }

    /// Build a map from its affine rows: `rows[i] = (offset, coefficients...)`
    pub fn from_rows(rows: &[&[f64]]) -> Result<Self, EvalError> {
        if rows.is_empty() {
            return Err(EvalError::InvalidArgument("face map needs affine rows"));
        }
        let cols = rows[0].len();
        if cols < 1 || rows.iter().any(|r| r.len() != cols) {
            return Err(EvalError::InvalidArgument("face map rows must be uniform"));
        }
        let mut matrix = Array2::zeros((rows.len(), cols));
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                matrix[[i, j]] = *v;
            }
        }
        Ok(FaceMap { matrix })
    }

    pub fn parent_dimension(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn face_dimension(&self) -> usize {
        self.matrix.ncols() - 1
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Map face-local xi coordinates to parent xi coordinates
    pub fn apply(&self, face_xi: &[f64]) -> Result<Vec<f64>, EvalError> {
        if face_xi.len() != self.face_dimension() {
            return Err(EvalError::XiDimensionMismatch {
                expected: self.face_dimension(),
                got: face_xi.len(),
            });
        }
        let mut out = Vec::with_capacity(self.parent_dimension());
        for row in self.matrix.rows() {
            let mut v = row[0];
            for (j, xi) in face_xi.iter().enumerate() {
                v += row[j + 1] * xi;
            }
            out.push(v);
        }
        Ok(out)
    }
}

/// Shape of an element: its dimension and the affine maps of its faces
#[derive(Debug, Clone, Default)]
pub struct ElementShape {
    dimension: usize,
    face_maps: Vec<Option<FaceMap>>,
}

impl ElementShape {
    pub fn new(dimension: usize) -> Self {
        ElementShape {
            dimension,
            face_maps: Vec::new(),
        }
    }

    pub fn with_face_map(mut self, face: usize, map: FaceMap) -> Self {
        if self.face_maps.len() <= face {
            self.face_maps.resize(face + 1, None);
        }
        self.face_maps[face] = Some(map);
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn face_count(&self) -> usize {
        self.face_maps.len()
    }

    pub fn face_map(&self, face: usize) -> Option<&FaceMap> {
        self.face_maps.get(face).and_then(|m| m.as_ref())
    }
}

/// Mesh topology queries the engine consumes.
///
/// Parent enumeration returns immediate parents in the provider's stored
/// order; the inheritance resolver tries them in that order and the first
/// qualifying parent wins.
pub trait MeshTopology {
    /// Dimension of an element
    fn dimension(&self, element: ElementId) -> Result<usize, EvalError>;

    /// Shape of an element, stable for the lifetime of an evaluation
    fn shape(&self, element: ElementId) -> Result<&ElementShape, EvalError>;

    /// Immediate parent elements of an element
    fn parents(&self, element: ElementId) -> Vec<ElementId>;

    /// Which face of `parent` the element `child` occupies
    fn face_number(&self, parent: ElementId, child: ElementId) -> Option<usize>;
}
