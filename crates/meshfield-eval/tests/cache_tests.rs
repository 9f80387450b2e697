//! Bounding and staleness behavior of the evaluation cache

mod common;

use common::{line_shape, linear_lagrange, MockWorld};
use meshfield_eval::cache::{CacheConfig, FieldEvaluationCache};
use meshfield_eval::template::{ElementFieldTemplate, NodeTerm, ParameterMapping};
use meshfield_field::{Field, FieldHandle};
use meshfield_types::{ElementId, NodeId, ValueType};
use std::rc::Rc;

/// A world of `count` line elements, each carrying a linear field whose
/// value at xi is `element_index + xi`
fn lines_with_field(count: u32) -> (MockWorld, FieldHandle) {
    let mut world = MockWorld::new();
    for index in 1..=count {
        let element = ElementId::new(index);
        let lower = NodeId::new(index * 10);
        let upper = NodeId::new(index * 10 + 1);
        world.add_element(element, line_shape());
        world.set_template(
            "temperature",
            element,
            0,
            ElementFieldTemplate::new(ParameterMapping::NodeBased {
                basis: linear_lagrange(),
                terms: vec![NodeTerm::unscaled(lower), NodeTerm::unscaled(upper)],
            }),
        );
        world.set_node_value(lower, "temperature", 0, index as f64);
        world.set_node_value(upper, "temperature", 0, index as f64 + 1.0);
    }
    let field = Field::new_handle("temperature", "test");
    field.borrow_mut().set_component_count(1).unwrap();
    (world, field)
}

#[test]
fn entry_count_never_exceeds_the_capacity() {
    let (world, field) = lines_with_field(10);
    let config = CacheConfig {
        time_slots: 3,
        element_capacity: 4,
    };
    let mut cache = FieldEvaluationCache::with_config(Rc::clone(&field), config);

    // hold on to an early evaluation across the coming eviction
    let held = cache
        .evaluation(ElementId::new(1), 0.0, None, &world.ctx())
        .unwrap()
        .unwrap();

    for index in 1..=10 {
        cache
            .evaluation(ElementId::new(index), 0.0, None, &world.ctx())
            .unwrap()
            .unwrap();
        assert!(cache.entry_count(0.0) <= 4);
    }

    // the held object survived the bulk clears, still valid for its own
    // element
    let result = held.borrow().evaluate_real(None, &[0.5], 0, None).unwrap();
    assert!((result.values[0] - 1.5).abs() < 1e-12);
}

#[test]
fn repeated_lookups_reuse_the_cached_object() {
    let (world, field) = lines_with_field(1);
    let mut cache = FieldEvaluationCache::new(Rc::clone(&field));

    let first = cache
        .evaluation(ElementId::new(1), 0.0, None, &world.ctx())
        .unwrap()
        .unwrap();
    let second = cache
        .evaluation(ElementId::new(1), 0.0, None, &world.ctx())
        .unwrap()
        .unwrap();
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
fn field_changes_invalidate_lazily() {
    let mut world = MockWorld::new();
    world.add_element(ElementId::new(1), line_shape());
    let field = Field::new_handle("gravity", "test");
    {
        let mut f = field.borrow_mut();
        f.set_component_count(1).unwrap();
        f.set_source_constant();
        f.set_real_value(0, 9.8).unwrap();
    }
    let mut cache = FieldEvaluationCache::new(Rc::clone(&field));

    let handle = cache
        .evaluation(ElementId::new(1), 0.0, None, &world.ctx())
        .unwrap()
        .unwrap();
    let result = handle.borrow().evaluate_real(None, &[0.5], 0, None).unwrap();
    assert_eq!(result.values, vec![9.8]);

    // mutate the stored value: the cache must notice on next lookup, not
    // by notification
    field.borrow_mut().set_real_value(0, 1.6).unwrap();
    let handle = cache
        .evaluation(ElementId::new(1), 0.0, None, &world.ctx())
        .unwrap()
        .unwrap();
    let result = handle.borrow().evaluate_real(None, &[0.5], 0, None).unwrap();
    assert_eq!(result.values, vec![1.6]);
}

#[test]
fn indexer_changes_also_invalidate() {
    let mut world = MockWorld::new();
    world.add_element(ElementId::new(1), line_shape());

    let indexer = Field::new_handle("index", "test");
    {
        let mut idx = indexer.borrow_mut();
        idx.set_component_count(1).unwrap();
        idx.set_value_type(ValueType::Int).unwrap();
        idx.set_source_constant();
        idx.set_int_value(0, 1).unwrap();
    }
    let field = Field::new_handle("lookup", "test");
    field.borrow_mut().set_component_count(1).unwrap();
    Field::set_source_indexed(&field, &indexer, 2).unwrap();
    {
        let mut f = field.borrow_mut();
        f.set_real_value(0, 100.0).unwrap();
        f.set_real_value(1, 200.0).unwrap();
    }

    let mut cache = FieldEvaluationCache::new(Rc::clone(&field));
    let handle = cache
        .evaluation(ElementId::new(1), 0.0, None, &world.ctx())
        .unwrap()
        .unwrap();
    let result = handle.borrow().evaluate_real(None, &[0.0], 0, None).unwrap();
    assert_eq!(result.values, vec![100.0]);

    indexer.borrow_mut().set_int_value(0, 2).unwrap();
    let handle = cache
        .evaluation(ElementId::new(1), 0.0, None, &world.ctx())
        .unwrap()
        .unwrap();
    let result = handle.borrow().evaluate_real(None, &[0.0], 0, None).unwrap();
    assert_eq!(result.values, vec![200.0]);
}

#[test]
fn time_slots_evict_least_recently_used() {
    let (world, field) = lines_with_field(1);
    let mut cache = FieldEvaluationCache::new(Rc::clone(&field));
    let element = ElementId::new(1);

    for time in [0.0, 1.0, 2.0] {
        cache
            .evaluation(element, time, None, &world.ctx())
            .unwrap()
            .unwrap();
    }
    assert_eq!(cache.entry_count(0.0), 1);

    // touch time 0 so it is most recent, then add a fourth time
    cache.evaluation(element, 0.0, None, &world.ctx()).unwrap();
    cache.evaluation(element, 3.0, None, &world.ctx()).unwrap();

    // time 1 was least recently used and lost its slot
    assert_eq!(cache.entry_count(1.0), 0);
    assert_eq!(cache.entry_count(0.0), 1);
    assert_eq!(cache.entry_count(3.0), 1);
}

#[test]
fn undefined_and_failed_entries_are_not_cached() {
    let (mut world, field) = lines_with_field(1);
    let mut cache = FieldEvaluationCache::new(Rc::clone(&field));

    // an element with no reachable definition is a normal None, not cached
    world.add_element(ElementId::new(7), line_shape());
    let outcome = cache
        .evaluation(ElementId::new(7), 0.0, None, &world.ctx())
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(cache.entry_count(0.0), 0);

    // a second component with no template on the element: the calculation
    // fails and the failed entry is dropped, not kept
    field.borrow_mut().set_component_count(2).unwrap();
    assert!(cache
        .evaluation(ElementId::new(1), 0.0, None, &world.ctx())
        .is_err());
    assert_eq!(cache.entry_count(0.0), 0);
}
