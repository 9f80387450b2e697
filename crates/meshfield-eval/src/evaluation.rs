//! Element field evaluation
//!
//! [`ElementFieldEvaluation`] caches everything needed to interpolate one
//! field on one element at one time: the ancestor element actually
//! carrying the definition, per-component parameter blocks blended to the
//! shared monomial basis (or kept as a legacy grid lattice), and the
//! inheritance transform when the definition lives on an ancestor.
//! Values and derivatives then come out of dot products against the
//! monomial basis.
//!
//! The object moves between three states: empty (constructed or cleared),
//! populated (after a successful [`calculate`](ElementFieldEvaluation::calculate))
//! and stale (identity mismatch or the field's parameters changed). A
//! failed calculate leaves it cleared so the next calculate can retry.

use crate::basis::{
    multilinear_to_monomial, projection_matrix, BasisFunctionSource, StandardBasis,
};
use crate::error::EvalError;
use crate::inheritance::{self, Inherited};
use crate::mesh::MeshTopology;
use crate::template::{FieldDataSource, NodeValueSource, ParameterMapping};
use log::trace;
use meshfield_field::{Field, FieldError, FieldHandle, SourceKind};
use meshfield_types::{ElementId, ValueType};
use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::rc::Rc;

/// Maximum number of simultaneous parameter perturbations
pub const MAX_PERTURBATIONS: usize = 2;

/// Collaborator handles an evaluation draws on
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub mesh: &'a dyn MeshTopology,
    pub data: &'a dyn FieldDataSource,
    pub nodes: &'a dyn NodeValueSource,
    pub bases: &'a dyn BasisFunctionSource,
}

/// Outcome of a calculate call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calculated {
    /// Parameters gathered, the evaluation is populated
    Done,
    /// No definition reachable from the element; the evaluation is empty
    NotDefined,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PerturbationEntry {
    component: usize,
    parameter: usize,
    delta: f64,
}

/// Transient additive offsets on element parameters, used to approximate
/// derivatives of downstream composite fields by finite differencing
/// without mutating stored parameters.
///
/// The stack is an explicit value threaded through evaluate calls.
/// Entries must be removed in reverse order of addition, and at most
/// [`MAX_PERTURBATIONS`] may be active at once. Perturbations only apply
/// while the evaluation's ancestor is its top-level element.
#[derive(Debug, Default)]
pub struct Perturbations {
    entries: Vec<PerturbationEntry>,
}

impl Perturbations {
    pub fn new() -> Self {
        Perturbations::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add `delta x parameterBasisValue` to evaluations of `component`
    pub fn push(
        &mut self,
        component: usize,
        parameter: usize,
        delta: f64,
    ) -> Result<(), EvalError> {
        if self.entries.len() >= MAX_PERTURBATIONS {
            return Err(EvalError::PerturbationCapacity);
        }
        self.entries.push(PerturbationEntry {
            component,
            parameter,
            delta,
        });
        Ok(())
    }

    /// Remove the most recent perturbation, which must match
    /// `(component, parameter)`
    pub fn pop(&mut self, component: usize, parameter: usize) -> Result<(), EvalError> {
        match self.entries.last() {
            Some(top) if top.component == component && top.parameter == parameter => {
                self.entries.pop();
                Ok(())
            }
            _ => Err(EvalError::PerturbationOrder),
        }
    }

    fn entries(&self) -> &[PerturbationEntry] {
        &self.entries
    }
}

/// Values and derivative blocks from a real evaluation.
///
/// `derivatives` is component-major: for each evaluated component, one
/// value per derivative block (xi directions first, then direction pairs
/// at order two, first direction varying fastest). Empty at order zero.
#[derive(Debug, Clone, PartialEq)]
pub struct RealEvaluation {
    pub values: Vec<f64>,
    pub derivatives: Vec<f64>,
}

/// Monomial shape of a component in standard-basis form
#[derive(Debug, Clone, PartialEq)]
pub struct MonomialInfo {
    /// Polynomial order per xi direction
    pub orders: Vec<usize>,
    /// Number of monomial coefficients
    pub value_count: usize,
}

/// Per-component gathered parameters
#[derive(Debug, Clone)]
enum ComponentEvaluation {
    /// Legacy grid lattice, blended to monomial form per cell at evaluate
    /// time
    Grid {
        /// Grid cells per xi direction; the lattice holds one more point
        /// per direction
        numbers_in_xi: Vec<usize>,
        /// Lattice values, xi1 varying fastest
        values: Vec<f64>,
    },
    /// Standard monomial form
    Monomial {
        basis: StandardBasis,
        /// Monomial coefficients: `parameter_matrix . parameters`
        coefficients: Vec<f64>,
        /// Raw gathered element parameters
        parameters: Vec<f64>,
        /// Maps parameters to monomial coefficients, scale factors folded
        /// in
        parameter_matrix: Array2<f64>,
    },
}

impl ComponentEvaluation {
    fn parameter_count(&self) -> usize {
        match self {
            ComponentEvaluation::Grid { values, .. } => values.len(),
            ComponentEvaluation::Monomial { parameters, .. } => parameters.len(),
        }
    }
}

/// The per-(field, element, time) interpolation cache
#[derive(Default)]
pub struct ElementFieldEvaluation {
    field: Option<FieldHandle>,
    element: Option<ElementId>,
    ancestor: Option<ElementId>,
    top_level: Option<ElementId>,
    time: f64,
    xi_dimension: usize,
    field_stamp: u64,
    indexer_stamp: Option<u64>,
    transform: Option<Array2<f64>>,
    components: Vec<ComponentEvaluation>,
}

impl ElementFieldEvaluation {
    pub fn new() -> Self {
        ElementFieldEvaluation::default()
    }

    /// Drop all cached state, returning to the empty state
    pub fn clear(&mut self) {
        self.field = None;
        self.element = None;
        self.ancestor = None;
        self.top_level = None;
        self.time = 0.0;
        self.xi_dimension = 0;
        self.field_stamp = 0;
        self.indexer_stamp = None;
        self.transform = None;
        self.components.clear();
    }

    pub fn is_populated(&self) -> bool {
        self.field.is_some()
    }

    pub fn element(&self) -> Option<ElementId> {
        self.element
    }

    /// The element actually carrying the field's definition
    pub fn ancestor(&self) -> Option<ElementId> {
        self.ancestor
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// The inheritance transform, `None` when the definition is direct
    pub fn transform(&self) -> Option<&Array2<f64>> {
        self.transform.as_ref()
    }

    /// Whether this evaluation was calculated for exactly this identity
    pub fn matches(&self, field: &FieldHandle, element: ElementId, time: f64) -> bool {
        self.is_populated()
            && self
                .field
                .as_ref()
                .map_or(false, |held| Rc::ptr_eq(held, field))
            && self.element == Some(element)
            && self.time.to_bits() == time.to_bits()
    }

    /// Whether the cached state is still usable: same identity and the
    /// field (and its indexer) report no parameter changes since
    pub fn is_current(&self, field: &FieldHandle, element: ElementId, time: f64) -> bool {
        if !self.matches(field, element, time) {
            return false;
        }
        let f = field.borrow();
        if f.change_count() != self.field_stamp {
            return false;
        }
        match (&self.indexer_stamp, f.indexer()) {
            (Some(stamp), Some(indexer)) => indexer.borrow().change_count() == *stamp,
            (None, None) => true,
            _ => false,
        }
    }

    /// Resolve the ancestor and gather per-component parameter blocks for
    /// `(field, element, time)`.
    ///
    /// Any prior state is cleared first. On failure, and when the field is
    /// not defined for the element, the evaluation is left empty.
    pub fn calculate(
        &mut self,
        field: &FieldHandle,
        element: ElementId,
        time: f64,
        top_level: Option<ElementId>,
        ctx: &EvalContext<'_>,
    ) -> Result<Calculated, EvalError> {
        self.clear();
        match self.calculate_inner(field, element, time, top_level, ctx) {
            Ok(Calculated::Done) => Ok(Calculated::Done),
            Ok(Calculated::NotDefined) => {
                self.clear();
                Ok(Calculated::NotDefined)
            }
            Err(error) => {
                self.clear();
                Err(error)
            }
        }
    }

    fn calculate_inner(
        &mut self,
        field: &FieldHandle,
        element: ElementId,
        time: f64,
        top_level: Option<ElementId>,
        ctx: &EvalContext<'_>,
    ) -> Result<Calculated, EvalError> {
        let kind = field.borrow().source_kind();
        match kind {
            SourceKind::Constant => {
                self.xi_dimension = ctx.mesh.dimension(element)?;
                self.install_identity(field, element, element, time, top_level);
                Ok(Calculated::Done)
            }
            SourceKind::Indexed => {
                let indexer = field
                    .borrow()
                    .indexer()
                    .expect("indexed field carries an indexer");
                match self.calculate(&indexer, element, time, top_level, ctx)? {
                    Calculated::NotDefined => return Ok(Calculated::NotDefined),
                    Calculated::Done => {}
                }
                // substitute the original field back as the cached
                // identity; index resolution happens at evaluate time
                self.field = Some(Rc::clone(field));
                self.field_stamp = field.borrow().change_count();
                self.indexer_stamp = Some(indexer.borrow().change_count());
                Ok(Calculated::Done)
            }
            SourceKind::General => self.calculate_general(field, element, time, top_level, ctx),
        }
    }

    fn calculate_general(
        &mut self,
        field: &FieldHandle,
        element: ElementId,
        time: f64,
        top_level: Option<ElementId>,
        ctx: &EvalContext<'_>,
    ) -> Result<Calculated, EvalError> {
        let f = field.borrow();
        let inherited =
            match inheritance::resolve(&f, element, None, top_level, ctx.mesh, ctx.data)? {
                Some(inherited) => inherited,
                None => return Ok(Calculated::NotDefined),
            };
        match f.value_type() {
            ValueType::String | ValueType::Url => {
                return Err(EvalError::StringGeneralUnsupported {
                    field: f.name().to_string(),
                })
            }
            ValueType::MeshLocation => {
                return Err(EvalError::InvalidArgument(
                    "mesh location fields only support constant or indexed parameters",
                ))
            }
            _ => {}
        }

        let Inherited {
            ancestor,
            transform,
        } = inherited;
        let xi_dimension = ctx.mesh.dimension(element)?;
        let ancestor_dimension = ctx.mesh.dimension(ancestor)?;
        trace!(
            "gathering {} components of field {} on {} (defined on {})",
            f.component_count(),
            f.name(),
            element,
            ancestor
        );

        // projection matrices are built once per distinct basis and shared
        // across components
        let mut projections: HashMap<Vec<usize>, Rc<(StandardBasis, Array2<f64>)>> =
            HashMap::new();
        let mut components = Vec::with_capacity(f.component_count());
        for component in 0..f.component_count() {
            let template = ctx.data.template(&f, ancestor, component).ok_or_else(|| {
                EvalError::ComponentTemplateMissing {
                    field: f.name().to_string(),
                    element: ancestor,
                    component,
                }
            })?;
            let evaluated = match template.mapping() {
                ParameterMapping::LegacyGrid { numbers_in_xi } => {
                    if transform.is_some() {
                        return Err(EvalError::GridInheritanceUnsupported {
                            field: f.name().to_string(),
                        });
                    }
                    if numbers_in_xi.len() != xi_dimension {
                        return Err(EvalError::XiDimensionMismatch {
                            expected: xi_dimension,
                            got: numbers_in_xi.len(),
                        });
                    }
                    let values = ctx.data.grid_values(&f, ancestor, component)?;
                    let expected: usize = numbers_in_xi.iter().map(|n| n + 1).product();
                    if values.len() != expected {
                        return Err(EvalError::ParameterCountMismatch {
                            expected,
                            got: values.len(),
                        });
                    }
                    ComponentEvaluation::Grid {
                        numbers_in_xi: numbers_in_xi.clone(),
                        values: values.to_vec(),
                    }
                }
                ParameterMapping::NodeBased { basis, terms } => {
                    let mut parameters = Vec::with_capacity(terms.len());
                    for term in terms {
                        parameters.push(ctx.nodes.node_value(term.node, &f, component, time)?);
                    }
                    let standard = StandardBasis::new(basis.monomial_orders.clone());
                    if standard.dimension() != ancestor_dimension {
                        return Err(EvalError::Basis(format!(
                            "basis {} has dimension {}, element {} has {}",
                            basis.name,
                            standard.dimension(),
                            ancestor,
                            ancestor_dimension
                        )));
                    }
                    let mut parameter_matrix = ctx.bases.blending_matrix(basis)?;
                    if parameter_matrix.nrows() != standard.function_count()
                        || parameter_matrix.ncols() != terms.len()
                    {
                        return Err(EvalError::Basis(format!(
                            "blending matrix for {} is {}x{}, expected {}x{}",
                            basis.name,
                            parameter_matrix.nrows(),
                            parameter_matrix.ncols(),
                            standard.function_count(),
                            terms.len()
                        )));
                    }
                    // fold per-term scale factors into the parameter map
                    for (term_index, term) in terms.iter().enumerate() {
                        if let Some(scale) = term.scale {
                            parameter_matrix
                                .column_mut(term_index)
                                .mapv_inplace(|v| v * scale);
                        }
                    }
                    Self::finish_monomial(
                        standard,
                        parameter_matrix,
                        parameters,
                        transform.as_ref(),
                        &mut projections,
                    )?
                }
                ParameterMapping::ElementConstant | ParameterMapping::FieldConstant => {
                    let values = match template.mapping() {
                        ParameterMapping::ElementConstant => {
                            ctx.data.constant_values(&f, ancestor, component)?
                        }
                        _ => ctx.data.field_values(&f, component)?,
                    };
                    if values.len() != 1 {
                        return Err(EvalError::ParameterCountMismatch {
                            expected: 1,
                            got: values.len(),
                        });
                    }
                    Self::finish_monomial(
                        StandardBasis::constant(ancestor_dimension),
                        Array2::eye(1),
                        values.to_vec(),
                        transform.as_ref(),
                        &mut projections,
                    )?
                }
            };
            components.push(evaluated);
        }
        drop(f);

        self.xi_dimension = xi_dimension;
        self.transform = transform;
        self.components = components;
        self.install_identity(field, element, ancestor, time, top_level);
        Ok(Calculated::Done)
    }

    /// Blend gathered parameters to monomial coefficients, projecting them
    /// onto the evaluated descendant element when the definition was
    /// inherited
    fn finish_monomial(
        basis: StandardBasis,
        parameter_matrix: Array2<f64>,
        parameters: Vec<f64>,
        transform: Option<&Array2<f64>>,
        projections: &mut HashMap<Vec<usize>, Rc<(StandardBasis, Array2<f64>)>>,
    ) -> Result<ComponentEvaluation, EvalError> {
        let (basis, parameter_matrix) = match transform {
            None => (basis, parameter_matrix),
            Some(transform) => {
                let key = basis.orders().to_vec();
                let projection = match projections.get(&key) {
                    Some(projection) => Rc::clone(projection),
                    None => {
                        let built = Rc::new(projection_matrix(&basis, transform)?);
                        projections.insert(key, Rc::clone(&built));
                        built
                    }
                };
                let (child_basis, matrix) = projection.as_ref();
                (child_basis.clone(), matrix.dot(&parameter_matrix))
            }
        };
        let coefficients = parameter_matrix
            .dot(&Array1::from(parameters.clone()))
            .to_vec();
        Ok(ComponentEvaluation::Monomial {
            basis,
            coefficients,
            parameters,
            parameter_matrix,
        })
    }

    fn install_identity(
        &mut self,
        field: &FieldHandle,
        element: ElementId,
        ancestor: ElementId,
        time: f64,
        top_level: Option<ElementId>,
    ) {
        self.field = Some(Rc::clone(field));
        self.element = Some(element);
        self.ancestor = Some(ancestor);
        self.top_level = Some(top_level.unwrap_or(element));
        self.time = time;
        self.field_stamp = field.borrow().change_count();
        self.indexer_stamp = None;
    }

    fn require_field(&self) -> Result<&FieldHandle, EvalError> {
        self.field.as_ref().ok_or(EvalError::NotCalculated)
    }

    fn check_xi(&self, xi: &[f64]) -> Result<(), EvalError> {
        if xi.len() != self.xi_dimension {
            return Err(EvalError::XiDimensionMismatch {
                expected: self.xi_dimension,
                got: xi.len(),
            });
        }
        Ok(())
    }

    fn component_indices(
        &self,
        field: &Field,
        component: Option<usize>,
    ) -> Result<Vec<usize>, EvalError> {
        let count = field.component_count();
        match component {
            None => Ok((0..count).collect()),
            Some(index) if index < count => Ok(vec![index]),
            Some(index) => Err(EvalError::Field(FieldError::InvalidComponent {
                field: field.name().to_string(),
                component: index,
            })),
        }
    }

    /// Whether perturbations apply: only when the definition carrier is
    /// the top-level evaluation element
    fn perturbations_apply(&self) -> bool {
        self.ancestor.is_some() && self.ancestor == self.top_level
    }

    /// Derivative direction sequences for the layout documented on
    /// [`RealEvaluation`]: for each order `1..=order`, all `n^order`
    /// direction sequences with the first direction varying fastest
    fn derivative_counts(&self, order: usize) -> Vec<Vec<usize>> {
        let n = self.xi_dimension;
        let mut all = Vec::new();
        for d in 1..=order {
            for block in 0..n.pow(d as u32) {
                let mut counts = vec![0usize; n];
                let mut rem = block;
                for _ in 0..d {
                    counts[rem % n] += 1;
                    rem /= n;
                }
                all.push(counts);
            }
        }
        all
    }

    /// Evaluate real values and derivatives at `xi`.
    ///
    /// `component` of `None` evaluates every component. Integer-valued
    /// fields produce nearest-grid-point (grid) or rounded (monomial)
    /// values with all derivatives zero.
    pub fn evaluate_real(
        &self,
        component: Option<usize>,
        xi: &[f64],
        derivative_order: usize,
        perturbations: Option<&Perturbations>,
    ) -> Result<RealEvaluation, EvalError> {
        let field = self.require_field()?;
        let f = field.borrow();
        self.check_xi(xi)?;
        let indices = self.component_indices(&f, component)?;
        let counts = self.derivative_counts(derivative_order);
        let mut out = RealEvaluation {
            values: Vec::with_capacity(indices.len()),
            derivatives: Vec::with_capacity(indices.len() * counts.len()),
        };

        match f.source_kind() {
            SourceKind::Constant => {
                for &index in &indices {
                    let value = f.value(index)?.to_numeric().ok_or(
                        EvalError::InvalidArgument("field value type is not numeric"),
                    )?;
                    out.values.push(value);
                    out.derivatives.extend(std::iter::repeat(0.0).take(counts.len()));
                }
            }
            SourceKind::Indexed => {
                let index_value = self.index_value(&f, xi)?;
                for &index in &indices {
                    let linear = f.indexed_value_index(index, index_value).map_err(|_| {
                        EvalError::IndexValueOutOfRange {
                            field: f.name().to_string(),
                            value: index_value,
                            count: f.index_count().unwrap_or(0),
                        }
                    })?;
                    let value = f.value(linear)?.to_numeric().ok_or(
                        EvalError::InvalidArgument("field value type is not numeric"),
                    )?;
                    out.values.push(value);
                    out.derivatives.extend(std::iter::repeat(0.0).take(counts.len()));
                }
            }
            SourceKind::General => {
                let integer_valued = f.value_type().is_numeric() && f.value_type() != ValueType::Real;
                let active = if self.perturbations_apply() {
                    perturbations
                } else {
                    None
                };
                for &index in &indices {
                    let evaluated =
                        self.components.get(index).ok_or(EvalError::NotCalculated)?;
                    if integer_valued {
                        out.values.push(self.integer_component_value(evaluated, xi)? as f64);
                        out.derivatives.extend(std::iter::repeat(0.0).take(counts.len()));
                        continue;
                    }
                    let zeros = vec![0usize; self.xi_dimension];
                    let mut value = self.component_term(evaluated, xi, &zeros)?;
                    if let Some(perturbations) = active {
                        for entry in perturbations.entries() {
                            if entry.component == index {
                                value += entry.delta
                                    * self.parameter_basis_value(
                                        evaluated,
                                        xi,
                                        &zeros,
                                        entry.parameter,
                                    )?;
                            }
                        }
                    }
                    out.values.push(value);
                    for count in &counts {
                        let mut derivative = self.component_term(evaluated, xi, count)?;
                        if let Some(perturbations) = active {
                            for entry in perturbations.entries() {
                                if entry.component == index {
                                    derivative += entry.delta
                                        * self.parameter_basis_value(
                                            evaluated,
                                            xi,
                                            count,
                                            entry.parameter,
                                        )?;
                                }
                            }
                        }
                        out.derivatives.push(derivative);
                    }
                }
            }
        }
        Ok(out)
    }

    /// One derivative term of a component: the mixed partial given by
    /// `counts` differentiations per xi direction (all zeros for the
    /// value)
    fn component_term(
        &self,
        component: &ComponentEvaluation,
        xi: &[f64],
        counts: &[usize],
    ) -> Result<f64, EvalError> {
        match component {
            ComponentEvaluation::Monomial {
                basis,
                coefficients,
                ..
            } => {
                let functions = basis.evaluate_counts(xi, counts)?;
                Ok(functions
                    .iter()
                    .zip(coefficients)
                    .map(|(m, c)| m * c)
                    .sum())
            }
            ComponentEvaluation::Grid {
                numbers_in_xi,
                values,
            } => {
                let cell = GridCell::locate(numbers_in_xi, xi)?;
                cell.term(values, counts)
            }
        }
    }

    /// The basis value a single parameter contributes under the given
    /// derivative counts, used by perturbations and parameter derivatives
    fn parameter_basis_value(
        &self,
        component: &ComponentEvaluation,
        xi: &[f64],
        counts: &[usize],
        parameter: usize,
    ) -> Result<f64, EvalError> {
        match component {
            ComponentEvaluation::Monomial {
                basis,
                parameter_matrix,
                parameters,
                ..
            } => {
                if parameter >= parameters.len() {
                    return Err(EvalError::ParameterCountMismatch {
                        expected: parameters.len(),
                        got: parameter,
                    });
                }
                let functions = basis.evaluate_counts(xi, counts)?;
                Ok(functions
                    .iter()
                    .zip(parameter_matrix.column(parameter))
                    .map(|(m, b)| m * b)
                    .sum())
            }
            ComponentEvaluation::Grid {
                numbers_in_xi,
                values,
            } => {
                if parameter >= values.len() {
                    return Err(EvalError::ParameterCountMismatch {
                        expected: values.len(),
                        got: parameter,
                    });
                }
                let cell = GridCell::locate(numbers_in_xi, xi)?;
                Ok(cell.point_weight(parameter, counts))
            }
        }
    }

    /// Nearest-grid-point (grid) or rounded (monomial) integer value
    fn integer_component_value(
        &self,
        component: &ComponentEvaluation,
        xi: &[f64],
    ) -> Result<i32, EvalError> {
        match component {
            ComponentEvaluation::Grid {
                numbers_in_xi,
                values,
            } => {
                let mut index = 0;
                let mut stride = 1;
                for (i, &cells) in numbers_in_xi.iter().enumerate() {
                    let point = if cells == 0 {
                        0
                    } else {
                        (xi[i].clamp(0.0, 1.0) * cells as f64).round() as usize
                    };
                    index += point * stride;
                    stride *= cells + 1;
                }
                Ok(values[index].round() as i32)
            }
            ComponentEvaluation::Monomial { .. } => {
                let zeros = vec![0usize; self.xi_dimension];
                Ok(self.component_term(component, xi, &zeros)?.round() as i32)
            }
        }
    }

    /// The indexer's integer value for this evaluation at `xi`
    fn index_value(&self, field: &Field, xi: &[f64]) -> Result<i32, EvalError> {
        let indexer = field
            .indexer()
            .ok_or(EvalError::InvalidArgument("field is not indexed"))?;
        let idx = indexer.borrow();
        match idx.source_kind() {
            SourceKind::Constant => Ok(idx.int_value(0)?),
            SourceKind::General => {
                // the cached component state belongs to the indexer
                let component = self
                    .components
                    .first()
                    .ok_or(EvalError::NotCalculated)?;
                self.integer_component_value(component, xi)
            }
            SourceKind::Indexed => Err(EvalError::InvalidArgument(
                "indexer fields may not be indexed",
            )),
        }
    }

    /// Evaluate integer values; grid components use the nearest grid
    /// point, never interpolation
    pub fn evaluate_int(
        &self,
        component: Option<usize>,
        xi: &[f64],
    ) -> Result<Vec<i32>, EvalError> {
        let field = self.require_field()?;
        let f = field.borrow();
        if !f.value_type().is_numeric() {
            return Err(EvalError::InvalidArgument(
                "integer evaluation requires a numeric field",
            ));
        }
        self.check_xi(xi)?;
        let indices = self.component_indices(&f, component)?;
        let mut out = Vec::with_capacity(indices.len());
        match f.source_kind() {
            SourceKind::Constant => {
                for &index in &indices {
                    let value = f.value(index)?.to_numeric().ok_or(
                        EvalError::InvalidArgument("field value type is not numeric"),
                    )?;
                    out.push(value.round() as i32);
                }
            }
            SourceKind::Indexed => {
                let index_value = self.index_value(&f, xi)?;
                for &index in &indices {
                    let linear = f.indexed_value_index(index, index_value).map_err(|_| {
                        EvalError::IndexValueOutOfRange {
                            field: f.name().to_string(),
                            value: index_value,
                            count: f.index_count().unwrap_or(0),
                        }
                    })?;
                    let value = f.value(linear)?.to_numeric().ok_or(
                        EvalError::InvalidArgument("field value type is not numeric"),
                    )?;
                    out.push(value.round() as i32);
                }
            }
            SourceKind::General => {
                for &index in &indices {
                    let evaluated =
                        self.components.get(index).ok_or(EvalError::NotCalculated)?;
                    out.push(self.integer_component_value(evaluated, xi)?);
                }
            }
        }
        Ok(out)
    }

    /// Evaluate a string-valued field; only constant and indexed variants
    /// store strings
    pub fn evaluate_string(
        &self,
        component: usize,
        xi: &[f64],
    ) -> Result<Option<String>, EvalError> {
        let field = self.require_field()?;
        let f = field.borrow();
        if !matches!(f.value_type(), ValueType::String | ValueType::Url) {
            return Err(EvalError::InvalidArgument(
                "string evaluation requires a string field",
            ));
        }
        match f.source_kind() {
            SourceKind::Constant => Ok(f.string_value(component)?.map(str::to_string)),
            SourceKind::Indexed => {
                self.check_xi(xi)?;
                let index_value = self.index_value(&f, xi)?;
                let linear = f.indexed_value_index(component, index_value).map_err(|_| {
                    EvalError::IndexValueOutOfRange {
                        field: f.name().to_string(),
                        value: index_value,
                        count: f.index_count().unwrap_or(0),
                    }
                })?;
                Ok(f.string_value(linear)?.map(str::to_string))
            }
            SourceKind::General => Err(EvalError::StringGeneralUnsupported {
                field: f.name().to_string(),
            }),
        }
    }

    /// Evaluate any field as display text, comma-separating components
    pub fn evaluate_as_string(
        &self,
        component: Option<usize>,
        xi: &[f64],
    ) -> Result<String, EvalError> {
        let field = self.require_field()?;
        let value_type = field.borrow().value_type();
        match value_type {
            ValueType::String | ValueType::Url => Ok(self
                .evaluate_string(component.unwrap_or(0), xi)?
                .unwrap_or_default()),
            ValueType::Int | ValueType::Short => {
                let values = self.evaluate_int(component, xi)?;
                Ok(join(values.iter()))
            }
            ValueType::Real => {
                let evaluated = self.evaluate_real(component, xi, 0, None)?;
                Ok(join(evaluated.values.iter()))
            }
            _ => Err(EvalError::InvalidArgument(
                "field value type has no text form",
            )),
        }
    }

    /// Derivatives of one component's value with respect to each of its
    /// own element parameters. Derivatives with respect to other
    /// components' parameters are zero by definition, and integer-valued
    /// fields have all-zero derivatives.
    pub fn parameter_derivatives(
        &self,
        component: usize,
        xi: &[f64],
    ) -> Result<Vec<f64>, EvalError> {
        let field = self.require_field()?;
        let f = field.borrow();
        self.check_xi(xi)?;
        if f.source_kind() != SourceKind::General {
            return Err(EvalError::InvalidArgument(
                "parameter derivatives require element parameters",
            ));
        }
        let indices = self.component_indices(&f, Some(component))?;
        let evaluated = self
            .components
            .get(indices[0])
            .ok_or(EvalError::NotCalculated)?;
        let count = evaluated.parameter_count();
        if f.value_type() != ValueType::Real {
            return Ok(vec![0.0; count]);
        }
        let zeros = vec![0usize; self.xi_dimension];
        let mut out = Vec::with_capacity(count);
        for parameter in 0..count {
            out.push(self.parameter_basis_value(evaluated, xi, &zeros, parameter)?);
        }
        Ok(out)
    }

    /// Copy of the gathered parameter block of one component
    pub fn component_values(&self, component: usize) -> Result<Vec<f64>, EvalError> {
        let field = self.require_field()?;
        let f = field.borrow();
        if f.source_kind() != SourceKind::General {
            return Err(EvalError::InvalidArgument(
                "component values require element parameters",
            ));
        }
        let indices = self.component_indices(&f, Some(component))?;
        let evaluated = self
            .components
            .get(indices[0])
            .ok_or(EvalError::NotCalculated)?;
        Ok(match evaluated {
            ComponentEvaluation::Grid { values, .. } => values.clone(),
            ComponentEvaluation::Monomial { parameters, .. } => parameters.clone(),
        })
    }

    /// Monomial shape of one component, for consumers inspecting the
    /// standard-basis form directly
    pub fn monomial_component_info(&self, component: usize) -> Result<MonomialInfo, EvalError> {
        let field = self.require_field()?;
        let f = field.borrow();
        let indices = self.component_indices(&f, Some(component))?;
        match self.components.get(indices[0]) {
            Some(ComponentEvaluation::Monomial { basis, .. }) => Ok(MonomialInfo {
                orders: basis.orders().to_vec(),
                value_count: basis.function_count(),
            }),
            Some(ComponentEvaluation::Grid { .. }) | None => {
                Err(EvalError::NonMonomialComponent {
                    field: f.name().to_string(),
                    component,
                })
            }
        }
    }
}

fn join<T: std::fmt::Display>(values: impl Iterator<Item = T>) -> String {
    let mut out = String::new();
    for (i, v) in values.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out
}

/// The active cell of a legacy grid at some xi location
struct GridCell {
    /// Per axis: cell index, cell-local coordinate, derivative scale and
    /// whether the axis has any cells at all
    axes: Vec<GridAxis>,
    /// Lattice strides per axis
    strides: Vec<usize>,
}

struct GridAxis {
    cells: usize,
    cell: usize,
    local: f64,
    scale: f64,
}

impl GridCell {
    fn locate(numbers_in_xi: &[usize], xi: &[f64]) -> Result<GridCell, EvalError> {
        if xi.len() != numbers_in_xi.len() {
            return Err(EvalError::XiDimensionMismatch {
                expected: numbers_in_xi.len(),
                got: xi.len(),
            });
        }
        let mut axes = Vec::with_capacity(numbers_in_xi.len());
        let mut strides = Vec::with_capacity(numbers_in_xi.len());
        let mut stride = 1;
        for (i, &cells) in numbers_in_xi.iter().enumerate() {
            strides.push(stride);
            stride *= cells + 1;
            if cells == 0 {
                axes.push(GridAxis {
                    cells,
                    cell: 0,
                    local: 0.0,
                    scale: 0.0,
                });
                continue;
            }
            // clamp into [0,1]; the top boundary falls in the last cell
            let position = xi[i].clamp(0.0, 1.0) * cells as f64;
            let cell = (position.floor() as usize).min(cells - 1);
            axes.push(GridAxis {
                cells,
                cell,
                local: position - cell as f64,
                scale: cells as f64,
            });
        }
        Ok(GridCell { axes, strides })
    }

    fn active_axes(&self) -> Vec<usize> {
        (0..self.axes.len())
            .filter(|&i| self.axes[i].cells > 0)
            .collect()
    }

    /// Evaluate one derivative term over the active cell by blending its
    /// corners to monomial form
    fn term(&self, values: &[f64], counts: &[usize]) -> Result<f64, EvalError> {
        // differentiating along an axis without cells gives zero
        for (axis, &count) in self.axes.iter().zip(counts) {
            if axis.cells == 0 && count > 0 {
                return Ok(0.0);
            }
        }
        let active = self.active_axes();
        let mut corners = vec![0.0; 1 << active.len()];
        for (slot, corner) in corners.iter_mut().enumerate() {
            let mut index = 0;
            for (bit, &axis) in active.iter().enumerate() {
                let offset = (slot >> bit) & 1;
                index += (self.axes[axis].cell + offset) * self.strides[axis];
            }
            *corner = values[index];
        }
        multilinear_to_monomial(&mut corners);

        let basis = StandardBasis::new(vec![1; active.len()]);
        let local: Vec<f64> = active.iter().map(|&axis| self.axes[axis].local).collect();
        let local_counts: Vec<usize> = active.iter().map(|&axis| counts[axis]).collect();
        let functions = basis.evaluate_counts(&local, &local_counts)?;
        let mut value: f64 = functions.iter().zip(&corners).map(|(m, c)| m * c).sum();
        // chain rule from cell-local coordinates back to element xi
        for &axis in &active {
            for _ in 0..counts[axis] {
                value *= self.axes[axis].scale;
            }
        }
        Ok(value)
    }

    /// The multilinear weight one lattice point contributes under the
    /// given derivative counts; zero for points outside the active cell
    fn point_weight(&self, parameter: usize, counts: &[usize]) -> f64 {
        let mut remaining = parameter;
        let mut weight = 1.0;
        for (i, axis) in self.axes.iter().enumerate() {
            let coordinate = remaining % (axis.cells + 1);
            remaining /= axis.cells + 1;
            let count = counts[i];
            if axis.cells == 0 {
                if count > 0 {
                    return 0.0;
                }
                continue;
            }
            let factor = if coordinate == axis.cell {
                match count {
                    0 => 1.0 - axis.local,
                    1 => -axis.scale,
                    _ => 0.0,
                }
            } else if coordinate == axis.cell + 1 {
                match count {
                    0 => axis.local,
                    1 => axis.scale,
                    _ => 0.0,
                }
            } else {
                return 0.0;
            };
            weight *= factor;
        }
        weight
    }
}
