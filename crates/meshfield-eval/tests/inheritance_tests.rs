//! Coordinate inheritance across parent chains

mod common;

use common::{line_shape, linear_lagrange, unit_square_shape, MockWorld};
use meshfield_eval::error::EvalError;
use meshfield_eval::inheritance::resolve;
use meshfield_eval::template::{ElementFieldTemplate, NodeTerm, ParameterMapping};
use meshfield_field::Field;
use meshfield_types::{ElementId, NodeId};

fn node_based_template() -> ElementFieldTemplate {
    ElementFieldTemplate::new(ParameterMapping::NodeBased {
        basis: linear_lagrange(),
        terms: vec![
            NodeTerm::unscaled(NodeId::new(1)),
            NodeTerm::unscaled(NodeId::new(2)),
        ],
    })
}

#[test]
fn direct_definition_resolves_to_identity() {
    let quad = ElementId::new(1);
    let mut world = MockWorld::new();
    world.add_element(quad, unit_square_shape());
    world.set_template("temperature", quad, 0, node_based_template());

    let field = Field::new_handle("temperature", "test");
    field.borrow_mut().set_component_count(1).unwrap();

    let inherited = resolve(&field.borrow(), quad, None, None, &world, &world)
        .unwrap()
        .unwrap();
    assert_eq!(inherited.ancestor, quad);
    assert!(inherited.transform.is_none());
    assert_eq!(inherited.map_xi(&[0.3, 0.7]).unwrap(), vec![0.3, 0.7]);
}

#[test]
fn line_inherits_from_quad_through_its_face() {
    let quad = ElementId::new(1);
    let line = ElementId::new(2);
    let mut world = MockWorld::new();
    world.add_element(quad, unit_square_shape());
    world.add_element(line, line_shape());
    world.add_parent(line, quad, 2);
    world.set_template("temperature", quad, 0, node_based_template());

    let field = Field::new_handle("temperature", "test");
    field.borrow_mut().set_component_count(1).unwrap();

    let inherited = resolve(&field.borrow(), line, None, None, &world, &world)
        .unwrap()
        .unwrap();
    assert_eq!(inherited.ancestor, quad);

    // the affine map reproduces the corners of face 2 (xi2 = 0)
    assert_eq!(inherited.map_xi(&[0.0]).unwrap(), vec![0.0, 0.0]);
    assert_eq!(inherited.map_xi(&[1.0]).unwrap(), vec![1.0, 0.0]);
}

#[test]
fn first_qualifying_parent_wins() {
    let left = ElementId::new(1);
    let right = ElementId::new(2);
    let line = ElementId::new(3);
    let mut world = MockWorld::new();
    world.add_element(left, unit_square_shape());
    world.add_element(right, unit_square_shape());
    world.add_element(line, line_shape());
    // the shared edge: face 1 of the left quad, face 0 of the right quad
    world.add_parent(line, left, 1);
    world.add_parent(line, right, 0);
    world.set_template("temperature", left, 0, node_based_template());
    world.set_template("temperature", right, 0, node_based_template());

    let field = Field::new_handle("temperature", "test");
    field.borrow_mut().set_component_count(1).unwrap();

    let inherited = resolve(&field.borrow(), line, None, None, &world, &world)
        .unwrap()
        .unwrap();
    // parents are tried in stored order; the left quad was stored first
    assert_eq!(inherited.ancestor, left);
    assert_eq!(inherited.map_xi(&[0.5]).unwrap(), vec![1.0, 0.5]);
}

#[test]
fn top_level_hint_overrides_direct_definition() {
    let quad = ElementId::new(1);
    let line = ElementId::new(2);
    let mut world = MockWorld::new();
    world.add_element(quad, unit_square_shape());
    world.add_element(line, line_shape());
    world.add_parent(line, quad, 3);
    // defined both directly on the line and on the quad
    world.set_template("temperature", line, 0, node_based_template());
    world.set_template("temperature", quad, 0, node_based_template());

    let field = Field::new_handle("temperature", "test");
    field.borrow_mut().set_component_count(1).unwrap();

    // without a hint the direct definition wins
    let direct = resolve(&field.borrow(), line, None, None, &world, &world)
        .unwrap()
        .unwrap();
    assert_eq!(direct.ancestor, line);

    // the hint forces resolution up to the quad
    let hinted = resolve(&field.borrow(), line, None, Some(quad), &world, &world)
        .unwrap()
        .unwrap();
    assert_eq!(hinted.ancestor, quad);
    assert_eq!(hinted.map_xi(&[0.25]).unwrap(), vec![0.25, 1.0]);
}

#[test]
fn forced_face_composes_with_the_elements_own_map() {
    let quad = ElementId::new(1);
    let mut world = MockWorld::new();
    world.add_element(quad, unit_square_shape());
    world.set_template("temperature", quad, 0, node_based_template());

    let field = Field::new_handle("temperature", "test");
    field.borrow_mut().set_component_count(1).unwrap();

    let inherited = resolve(&field.borrow(), quad, Some(3), None, &world, &world)
        .unwrap()
        .unwrap();
    assert_eq!(inherited.ancestor, quad);
    // face 3 is the xi2 = 1 edge
    assert_eq!(inherited.map_xi(&[0.0]).unwrap(), vec![0.0, 1.0]);
    assert_eq!(inherited.map_xi(&[1.0]).unwrap(), vec![1.0, 1.0]);
}

#[test]
fn unreachable_definition_is_a_normal_none() {
    let line = ElementId::new(1);
    let mut world = MockWorld::new();
    world.add_element(line, line_shape());

    let field = Field::new_handle("temperature", "test");
    field.borrow_mut().set_component_count(1).unwrap();

    let resolved = resolve(&field.borrow(), line, None, None, &world, &world).unwrap();
    assert!(resolved.is_none());
}

#[test]
fn missing_face_map_is_an_error() {
    let quad = ElementId::new(1);
    let line = ElementId::new(2);
    let mut world = MockWorld::new();
    // a quad shape with no face maps at all
    world.add_element(quad, meshfield_eval::mesh::ElementShape::new(2));
    world.add_element(line, line_shape());
    world.add_parent(line, quad, 2);
    world.set_template("temperature", quad, 0, node_based_template());

    let field = Field::new_handle("temperature", "test");
    field.borrow_mut().set_component_count(1).unwrap();

    let error = resolve(&field.borrow(), line, None, None, &world, &world).unwrap_err();
    assert_eq!(
        error,
        EvalError::MissingFaceMap {
            element: quad,
            face: 2
        }
    );
}
