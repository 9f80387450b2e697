//! Element field templates and external parameter providers
//!
//! An [`ElementFieldTemplate`] describes how one field component's
//! parameters map to basis functions on one element: a legacy grid over
//! the element, node-mapped parameters with per-term scale factors, a
//! single element-constant parameter, or a field-constant parameter shared
//! across the mesh. Templates and the parameter values themselves live
//! with the mesh data, outside this engine, and are consumed through the
//! [`FieldDataSource`] and [`NodeValueSource`] traits.

use crate::basis::BasisDescription;
use crate::error::EvalError;
use meshfield_field::Field;
use meshfield_types::{ElementId, NodeId};

/// One node-mapped parameter term: the node it is gathered from and an
/// optional scale factor applied to it
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTerm {
    pub node: NodeId,
    pub scale: Option<f64>,
}

impl NodeTerm {
    pub fn unscaled(node: NodeId) -> Self {
        NodeTerm { node, scale: None }
    }

    pub fn scaled(node: NodeId, scale: f64) -> Self {
        NodeTerm {
            node,
            scale: Some(scale),
        }
    }
}

/// How a component's parameters map to basis functions on an element
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterMapping {
    /// Parameters on a regular linear-Lagrange lattice over the element;
    /// `numbers_in_xi` counts grid cells per xi direction, so the lattice
    /// holds `prod(numbers_in_xi[i] + 1)` values with xi1 varying fastest
    LegacyGrid { numbers_in_xi: Vec<usize> },
    /// Parameters gathered from incident nodes and blended through a basis
    NodeBased {
        basis: BasisDescription,
        terms: Vec<NodeTerm>,
    },
    /// One parameter stored with the element
    ElementConstant,
    /// One parameter stored once for the whole mesh
    FieldConstant,
}

/// Per-element description of one component's parameter mapping
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFieldTemplate {
    mapping: ParameterMapping,
}

impl ElementFieldTemplate {
    pub fn new(mapping: ParameterMapping) -> Self {
        ElementFieldTemplate { mapping }
    }

    pub fn mapping(&self) -> &ParameterMapping {
        &self.mapping
    }

    /// Number of element parameters this mapping contributes
    pub fn parameter_count(&self) -> usize {
        match &self.mapping {
            ParameterMapping::LegacyGrid { numbers_in_xi } => {
                numbers_in_xi.iter().map(|n| n + 1).product()
            }
            ParameterMapping::NodeBased { terms, .. } => terms.len(),
            ParameterMapping::ElementConstant | ParameterMapping::FieldConstant => 1,
        }
    }
}

/// External storage of per-element field parameters, kept per mesh
/// dimension by the mesh data layer
pub trait FieldDataSource {
    /// Whether the field has a direct definition on the element
    fn has_definition(&self, field: &Field, element: ElementId) -> bool;

    /// The template for one component on one element, if defined there
    fn template(
        &self,
        field: &Field,
        element: ElementId,
        component: usize,
    ) -> Option<&ElementFieldTemplate>;

    /// Lattice values of a grid-mapped component, xi1 varying fastest
    fn grid_values(
        &self,
        field: &Field,
        element: ElementId,
        component: usize,
    ) -> Result<&[f64], EvalError>;

    /// The single parameter of an element-constant component
    fn constant_values(
        &self,
        field: &Field,
        element: ElementId,
        component: usize,
    ) -> Result<&[f64], EvalError>;

    /// The single parameter of a field-constant component
    fn field_values(&self, field: &Field, component: usize) -> Result<&[f64], EvalError>;
}

/// External provider of nodal field values and node-mapped scale factors
pub trait NodeValueSource {
    /// Real value of a field component at a node and time
    fn node_value(
        &self,
        node: NodeId,
        field: &Field,
        component: usize,
        time: f64,
    ) -> Result<f64, EvalError>;

    /// Integer value of a field component at a node and time
    fn node_int_value(
        &self,
        node: NodeId,
        field: &Field,
        component: usize,
        time: f64,
    ) -> Result<i32, EvalError> {
        Ok(self.node_value(node, field, component, time)?.round() as i32)
    }

    /// String value of a field component at a node and time
    fn node_string_value(
        &self,
        node: NodeId,
        field: &Field,
        component: usize,
        time: f64,
    ) -> Result<String, EvalError>;
}
