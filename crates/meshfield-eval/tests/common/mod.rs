//! Shared mock mesh, parameter storage and basis provider for the
//! integration tests.

// each test binary exercises a different subset of the helpers
#![allow(dead_code)]

use meshfield_eval::basis::{BasisDescription, BasisFunctionSource};
use meshfield_eval::error::EvalError;
use meshfield_eval::evaluation::EvalContext;
use meshfield_eval::mesh::{ElementShape, FaceMap, MeshTopology};
use meshfield_eval::template::{ElementFieldTemplate, FieldDataSource, NodeValueSource};
use meshfield_field::Field;
use meshfield_types::{ElementId, NodeId};
use ndarray::{array, Array2};
use std::collections::HashMap;

/// In-memory mesh topology, field data and node values for tests
#[derive(Default)]
pub struct MockWorld {
    shapes: HashMap<ElementId, ElementShape>,
    parents: HashMap<ElementId, Vec<ElementId>>,
    faces: HashMap<(ElementId, ElementId), usize>,
    templates: HashMap<(String, ElementId, usize), ElementFieldTemplate>,
    grid_values: HashMap<(String, ElementId, usize), Vec<f64>>,
    constant_values: HashMap<(String, ElementId, usize), Vec<f64>>,
    field_values: HashMap<(String, usize), Vec<f64>>,
    node_values: HashMap<(NodeId, String, usize), f64>,
    node_strings: HashMap<(NodeId, String, usize), String>,
}

impl MockWorld {
    pub fn new() -> Self {
        MockWorld::default()
    }

    pub fn ctx(&self) -> EvalContext<'_> {
        EvalContext {
            mesh: self,
            data: self,
            nodes: self,
            bases: self,
        }
    }

    pub fn add_element(&mut self, element: ElementId, shape: ElementShape) {
        self.shapes.insert(element, shape);
    }

    /// Register `child` as occupying `face` of `parent`
    pub fn add_parent(&mut self, child: ElementId, parent: ElementId, face: usize) {
        self.parents.entry(child).or_default().push(parent);
        self.faces.insert((parent, child), face);
    }

    pub fn set_template(
        &mut self,
        field_name: &str,
        element: ElementId,
        component: usize,
        template: ElementFieldTemplate,
    ) {
        self.templates
            .insert((field_name.to_string(), element, component), template);
    }

    pub fn set_grid_values(
        &mut self,
        field_name: &str,
        element: ElementId,
        component: usize,
        values: Vec<f64>,
    ) {
        self.grid_values
            .insert((field_name.to_string(), element, component), values);
    }

    pub fn set_constant_values(
        &mut self,
        field_name: &str,
        element: ElementId,
        component: usize,
        values: Vec<f64>,
    ) {
        self.constant_values
            .insert((field_name.to_string(), element, component), values);
    }

    pub fn set_field_values(&mut self, field_name: &str, component: usize, values: Vec<f64>) {
        self.field_values
            .insert((field_name.to_string(), component), values);
    }

    pub fn set_node_value(&mut self, node: NodeId, field_name: &str, component: usize, value: f64) {
        self.node_values
            .insert((node, field_name.to_string(), component), value);
    }

    pub fn set_node_string(
        &mut self,
        node: NodeId,
        field_name: &str,
        component: usize,
        value: &str,
    ) {
        self.node_strings
            .insert((node, field_name.to_string(), component), value.to_string());
    }
}

impl MeshTopology for MockWorld {
    fn dimension(&self, element: ElementId) -> Result<usize, EvalError> {
        self.shapes
            .get(&element)
            .map(|shape| shape.dimension())
            .ok_or(EvalError::InvalidArgument("unknown element"))
    }

    fn shape(&self, element: ElementId) -> Result<&ElementShape, EvalError> {
        self.shapes
            .get(&element)
            .ok_or(EvalError::InvalidArgument("unknown element"))
    }

    fn parents(&self, element: ElementId) -> Vec<ElementId> {
        self.parents.get(&element).cloned().unwrap_or_default()
    }

    fn face_number(&self, parent: ElementId, child: ElementId) -> Option<usize> {
        self.faces.get(&(parent, child)).copied()
    }
}

impl FieldDataSource for MockWorld {
    fn has_definition(&self, field: &Field, element: ElementId) -> bool {
        self.templates
            .contains_key(&(field.name().to_string(), element, 0))
    }

    fn template(
        &self,
        field: &Field,
        element: ElementId,
        component: usize,
    ) -> Option<&ElementFieldTemplate> {
        self.templates
            .get(&(field.name().to_string(), element, component))
    }

    fn grid_values(
        &self,
        field: &Field,
        element: ElementId,
        component: usize,
    ) -> Result<&[f64], EvalError> {
        self.grid_values
            .get(&(field.name().to_string(), element, component))
            .map(Vec::as_slice)
            .ok_or(EvalError::InvalidArgument("no grid values stored"))
    }

    fn constant_values(
        &self,
        field: &Field,
        element: ElementId,
        component: usize,
    ) -> Result<&[f64], EvalError> {
        self.constant_values
            .get(&(field.name().to_string(), element, component))
            .map(Vec::as_slice)
            .ok_or(EvalError::InvalidArgument("no constant values stored"))
    }

    fn field_values(&self, field: &Field, component: usize) -> Result<&[f64], EvalError> {
        self.field_values
            .get(&(field.name().to_string(), component))
            .map(Vec::as_slice)
            .ok_or(EvalError::InvalidArgument("no field values stored"))
    }
}

impl NodeValueSource for MockWorld {
    fn node_value(
        &self,
        node: NodeId,
        field: &Field,
        component: usize,
        _time: f64,
    ) -> Result<f64, EvalError> {
        self.node_values
            .get(&(node, field.name().to_string(), component))
            .copied()
            .ok_or_else(|| EvalError::Node(format!("no value for {}", node)))
    }

    fn node_string_value(
        &self,
        node: NodeId,
        field: &Field,
        component: usize,
        _time: f64,
    ) -> Result<String, EvalError> {
        self.node_strings
            .get(&(node, field.name().to_string(), component))
            .cloned()
            .ok_or_else(|| EvalError::Node(format!("no string for {}", node)))
    }
}

impl BasisFunctionSource for MockWorld {
    fn blending_matrix(&self, basis: &BasisDescription) -> Result<Array2<f64>, EvalError> {
        match basis.name.as_str() {
            // nodal values [p0, p1] -> monomial [p0, p1 - p0]
            "l.Lagrange" => Ok(array![[1.0, 0.0], [-1.0, 1.0]]),
            // corner values (xi1 fastest) -> coefficients of 1, x, y, xy
            "l.Lagrange*l.Lagrange" => Ok(array![
                [1.0, 0.0, 0.0, 0.0],
                [-1.0, 1.0, 0.0, 0.0],
                [-1.0, 0.0, 1.0, 0.0],
                [1.0, -1.0, -1.0, 1.0],
            ]),
            other => Err(EvalError::Basis(format!("unknown basis {}", other))),
        }
    }
}

/// Basis description for 1-D linear Lagrange
pub fn linear_lagrange() -> BasisDescription {
    BasisDescription {
        name: "l.Lagrange".to_string(),
        monomial_orders: vec![1],
    }
}

/// Basis description for 2-D bilinear Lagrange
pub fn bilinear_lagrange() -> BasisDescription {
    BasisDescription {
        name: "l.Lagrange*l.Lagrange".to_string(),
        monomial_orders: vec![1, 1],
    }
}

/// A 1-D line shape with no faces
pub fn line_shape() -> ElementShape {
    ElementShape::new(1)
}

/// The unit square with face maps for its four edges:
/// 0: xi1=0, 1: xi1=1, 2: xi2=0, 3: xi2=1
pub fn unit_square_shape() -> ElementShape {
    ElementShape::new(2)
        .with_face_map(0, FaceMap::from_rows(&[&[0.0, 0.0], &[0.0, 1.0]]).unwrap())
        .with_face_map(1, FaceMap::from_rows(&[&[1.0, 0.0], &[0.0, 1.0]]).unwrap())
        .with_face_map(2, FaceMap::from_rows(&[&[0.0, 1.0], &[0.0, 0.0]]).unwrap())
        .with_face_map(3, FaceMap::from_rows(&[&[0.0, 1.0], &[1.0, 0.0]]).unwrap())
}
