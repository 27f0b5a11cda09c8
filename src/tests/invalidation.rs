//! Tests for precise invalidation across the quib graph

use super::helpers::*;
use crate::{
    cache::CacheStatus,
    event::QuibEvent,
    path::{array_path, Index},
    value::Value,
};
use std::sync::atomic::Ordering;
use test_log::test;

#[test]
fn test_elementwise_change_invalidates_one_element() {
    let project = test_project();
    let a = project.iquib(Value::from_vec(vec![1.0, 2.0, 3.0]));
    let b = &a + 1.0;
    b.get_value().unwrap();
    assert_eq!(b.cache_status(), CacheStatus::AllValid);

    a.assign_at(array_path([Index::Int(0)]), Value::Float(5.0)).unwrap();
    assert_eq!(b.cache_status(), CacheStatus::Partial);
    assert_eq!(floats(&b.get_value().unwrap()), vec![6.0, 3.0, 4.0]);
    assert_eq!(b.cache_status(), CacheStatus::AllValid);
}

#[test]
fn test_invalidating_twice_matches_once() {
    let project = test_project();
    let a = project.iquib(Value::from_vec(vec![1.0, 2.0, 3.0]));
    let b = &a * 2.0;
    b.get_value().unwrap();
    a.invalidate_and_redraw_at_path(&array_path([Index::Int(1)]));
    let once = b.cache_status();
    a.invalidate_and_redraw_at_path(&array_path([Index::Int(1)]));
    assert_eq!(b.cache_status(), once);
    assert_eq!(floats(&b.get_value().unwrap()), vec![2.0, 4.0, 6.0]);
}

#[test]
fn test_broadcast_operand_invalidates_everything() {
    let project = test_project();
    let a = project.iquib(Value::from_vec(vec![1.0, 2.0, 3.0]));
    let offset = project.iquib(Value::from_vec(vec![10.0]));
    let b = &a + &offset;
    b.get_value().unwrap();
    offset.assign_at(array_path([Index::Int(0)]), Value::Float(20.0)).unwrap();
    assert_eq!(b.cache_status(), CacheStatus::AllInvalid);
    assert_eq!(floats(&b.get_value().unwrap()), vec![21.0, 22.0, 23.0]);
}

#[test]
fn test_getitem_outside_change_stays_valid() {
    let project = test_project();
    let a = project.iquib(Value::from_vec(vec![1.0, 2.0, 3.0, 4.0]));
    let third = a.getitem(Index::Int(2));
    assert_eq!(third.get_value().unwrap().as_f64(), Some(3.0));

    a.assign_at(array_path([Index::Int(0)]), Value::Float(9.0)).unwrap();
    assert_eq!(third.cache_status(), CacheStatus::AllValid);

    a.assign_at(array_path([Index::Int(2)]), Value::Float(7.0)).unwrap();
    assert_eq!(third.cache_status(), CacheStatus::AllInvalid);
    assert_eq!(third.get_value().unwrap().as_f64(), Some(7.0));
}

#[test]
fn test_custom_function_is_recomputed_whole() {
    let project = test_project();
    let a = project.iquib(Value::from_vec(vec![1.0, 2.0]));
    let (identity, count) = counted_identity(&project, &a);
    identity.get_value().unwrap();
    identity.get_value().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    a.assign_at(array_path([Index::Int(1)]), Value::Float(5.0)).unwrap();
    assert_eq!(identity.cache_status(), CacheStatus::AllInvalid);
    assert_eq!(floats(&identity.get_value().unwrap()), vec![1.0, 5.0]);
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_overridden_element_hides_upstream_change() {
    let project = test_project();
    let a = project.iquib(Value::from_vec(vec![1.0, 2.0]));
    let b = &a + 1.0;
    b.set_allow_overriding(true);
    b.set_assigned_quibs(Some(&[b.clone()]));
    b.assign_at(array_path([Index::Int(0)]), Value::Float(7.0)).unwrap();
    let c = &b * 2.0;
    assert_eq!(floats(&c.get_value().unwrap()), vec![14.0, 6.0]);

    a.assign_at(array_path([Index::Int(0)]), Value::Float(10.0)).unwrap();
    assert_eq!(c.cache_status(), CacheStatus::AllValid);
    assert_eq!(floats(&c.get_value().unwrap()), vec![14.0, 6.0]);
}

#[test]
fn test_invalidation_events_name_the_path() {
    let project = test_project();
    let events = project.subscribe();
    let a = project.iquib(Value::from_vec(vec![1.0, 2.0]));
    let b = &a - 1.0;
    b.get_value().unwrap();
    a.assign_at(array_path([Index::Int(1)]), Value::Float(4.0)).unwrap();
    let invalidated: Vec<_> = drain_events(&events)
        .into_iter()
        .filter_map(|event| match event {
            QuibEvent::Invalidated { quib, path } if quib == b.id() => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(invalidated.len(), 1);
    assert!(!invalidated[0].is_empty());
}

#[test]
fn test_invalidation_does_not_evaluate_siblings() {
    let project = test_project();
    let x = project.iquib(Value::from_vec(vec![1.0, 2.0, 3.0]));
    let (uncached, evaluations) = counted_identity(&project, &x);
    uncached.set_cache_mode(crate::CacheMode::Off);
    let y = project.iquib(Value::from_vec(vec![10.0, 20.0, 30.0]));
    let total = &y + &uncached;
    total.get_value().unwrap();
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);

    y.assign_at(array_path([Index::Int(0)]), Value::Float(11.0)).unwrap();
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);
    assert_eq!(total.cache_status(), CacheStatus::Partial);
    assert_eq!(floats(&total.get_value().unwrap()), vec![12.0, 22.0, 33.0]);
}
