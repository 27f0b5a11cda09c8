//! End-to-end properties of evaluation, invalidation and assignment through the public API.

mod common;

use common::{numbers, project, vector};
use quib_core::{
    assignment::OverrideChoice,
    cache::CacheStatus,
    event::QuibEvent,
    path::{array_path, Index, PathComponent, SliceIndex},
    value::Value,
    Arg, Quib, QuibError,
};
use std::{collections::BTreeMap, sync::Arc};

#[test]
fn test_partial_value_agrees_with_full_value() {
    let project = project();
    let a = project.iquib(vector(&[1.0, 2.0, 3.0]));
    let b = &(&a * 3.0) - 1.0;
    let partial = b.get_value_valid_at_path(&array_path([Index::Int(1)])).unwrap();
    assert_eq!(b.cache_status(), CacheStatus::Partial);
    let full = b.get_value().unwrap();
    assert_eq!(partial.to_array().unwrap().data()[1], full.to_array().unwrap().data()[1]);
    assert_eq!(full, vector(&[2.0, 5.0, 8.0]));
}

#[test]
fn test_override_wins_over_upstream_value() {
    let project = project();
    let a = project.iquib(vector(&[1.0, 2.0, 3.0]));
    a.assign_at(array_path([Index::Int(1)]), Value::Float(50.0)).unwrap();
    let b = &a + 0.5;
    assert_eq!(numbers(&b), vec![1.5, 50.5, 3.5]);
    a.assign_at(array_path([Index::Int(1)]), Value::Float(60.0)).unwrap();
    assert_eq!(numbers(&b), vec![1.5, 60.5, 3.5]);
    assert_eq!(a.overrides().len(), 1);
}

#[test]
fn test_override_mask_marks_assigned_elements() {
    let project = project();
    let a = project.iquib(vector(&[0.0; 4]));
    a.assign_at(array_path([Index::Int(3)]), Value::Float(1.0)).unwrap();
    let mask = a.get_override_mask().unwrap();
    assert_eq!(mask.true_positions(), vec![3]);
}

#[test]
fn test_inverted_assignment_round_trips_through_arithmetic() {
    let project = project();
    let a = project.iquib(vector(&[1.0, 2.0, 3.0]));
    let b = &(&a + 1.0) * 10.0;
    b.assign_at(array_path([Index::Int(0)]), Value::Float(100.0)).unwrap();
    assert_eq!(numbers(&a), vec![9.0, 2.0, 3.0]);
    assert_eq!(numbers(&b), vec![100.0, 30.0, 40.0]);
}

#[test]
fn test_sum_along_axis_invalidates_its_row() {
    let project = project();
    let a = project.iquib(Value::array(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap());
    let mut kwargs = BTreeMap::new();
    kwargs.insert("axis".to_string(), Arg::Value(Value::Int(1)));
    let rows = a.apply("sum", Vec::new(), kwargs).unwrap();
    assert_eq!(numbers(&rows), vec![6.0, 15.0]);

    a.assign_at(array_path([Index::Tuple(vec![Index::Int(1), Index::Int(0)])]), Value::Float(10.0))
        .unwrap();
    assert_eq!(rows.cache_status(), CacheStatus::Partial);
    assert_eq!(numbers(&rows), vec![6.0, 21.0]);
}

#[test]
fn test_dict_item_assignment_writes_into_dict() {
    let project = project();
    let mut entries = BTreeMap::new();
    entries.insert("gain".to_string(), vector(&[1.0, 2.0]));
    entries.insert("offset".to_string(), Value::Float(0.0));
    let settings = project.iquib(Value::Dict(entries));
    let gain = settings.getitem_key("gain");
    gain.assign_at(array_path([Index::Int(1)]), Value::Float(4.0)).unwrap();
    assert_eq!(numbers(&gain), vec![1.0, 4.0]);
    assert_eq!(
        settings.overrides()[0].path,
        vec![PathComponent::key("gain"), PathComponent::array(Index::Int(1))]
    );
}

#[test]
fn test_common_ancestor_blocks_assignment() {
    let project = project();
    let a = project.iquib(vector(&[1.0, 2.0]));
    let b = &a * 2.0;
    let c = &a + &b;
    let result = c.assign_at(array_path([Index::Int(0)]), Value::Float(0.0));
    assert!(matches!(result, Err(QuibError::CommonAncestor(_))));
}

#[test]
fn test_disconnect_freezes_value() {
    let project = project();
    let a = project.iquib(vector(&[1.0, 2.0]));
    let b = &a + 1.0;
    b.disconnect().unwrap();
    assert!(b.is_iquib());
    assert!(a.children().is_empty());
    a.assign_at(array_path([Index::Int(0)]), Value::Float(10.0)).unwrap();
    assert_eq!(numbers(&b), vec![2.0, 3.0]);
}

#[test]
fn test_replacing_call_rewires_parents() {
    let project = project();
    let a = project.iquib(vector(&[1.0, 2.0]));
    let other = project.iquib(vector(&[5.0, 5.0]));
    let b = &a + 1.0;
    assert_eq!(numbers(&b), vec![2.0, 3.0]);
    let replacement = quib_core::func::FuncCall::new(
        quib_core::func::FUNCTION_REGISTRY.lookup("multiply").unwrap(),
        vec![Arg::Source(other.clone()), Arg::Value(Value::Float(2.0))],
        BTreeMap::new(),
    );
    b.replace_func_call(replacement).unwrap();
    assert_eq!(numbers(&b), vec![10.0, 10.0]);
    assert!(a.children().is_empty());
    assert_eq!(other.children(), vec![b.clone()]);

    let cyclic = quib_core::func::FuncCall::new(
        quib_core::func::FUNCTION_REGISTRY.lookup("negative").unwrap(),
        vec![Arg::Source(b.clone())],
        BTreeMap::new(),
    );
    assert!(matches!(b.replace_func_call(cyclic), Err(QuibError::InvalidArgument(_))));
}

#[test]
fn test_later_override_wins_on_overlap() {
    let project = project();
    let a = project.iquib(vector(&[1.0, 2.0, 3.0]));
    a.assign(vector(&[10.0, 20.0, 30.0])).unwrap();
    a.assign_at(array_path([Index::Int(0)]), Value::Float(5.0)).unwrap();
    assert_eq!(numbers(&a), vec![5.0, 20.0, 30.0]);

    // reassigning the whole value moves it last
    a.assign(vector(&[10.0, 20.0, 30.0])).unwrap();
    assert_eq!(numbers(&a), vec![10.0, 20.0, 30.0]);
}

#[test]
fn test_broadcast_row_change_invalidates_column() {
    let project = project();
    let events = project.subscribe();
    let row = project.iquib(Value::array(vec![1, 3], vec![1.0, 2.0, 3.0]).unwrap());
    let column = project.iquib(Value::array(vec![3, 1], vec![1.0, 2.0, 3.0]).unwrap());
    let sum = &row + &column;
    sum.get_value().unwrap();

    row.assign_at(array_path([Index::Tuple(vec![Index::Int(0), Index::Int(0)])]), Value::Float(7.0))
        .unwrap();
    assert_eq!(sum.cache_status(), CacheStatus::Partial);
    let invalidated: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            QuibEvent::Invalidated { quib, path } if quib == sum.id() => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(invalidated.len(), 1);
    match &invalidated[0][0].component {
        Index::Mask(mask) => assert_eq!(mask.true_positions(), vec![0, 3, 6]),
        other => panic!("expected a mask, got {other}"),
    }
    assert_eq!(numbers(&sum)[3], 9.0);
}

#[test]
fn test_split_assignment_diverges_into_both_sources() {
    let project = project();
    let first = project.iquib(Value::array(vec![1, 3], vec![1.0, 2.0, 3.0]).unwrap());
    let second = project.iquib(Value::array(vec![1, 3], vec![8.0, 12.0, 14.0]).unwrap());
    let joined = project
        .call_named(
            "concatenate",
            vec![Arg::List(vec![Arg::Source(first.clone()), Arg::Source(second.clone())])],
            BTreeMap::new(),
        )
        .unwrap();
    let column = array_path([Index::Tuple(vec![Index::Slice(SliceIndex::full()), Index::Int(0)])]);
    joined.assign_at(column, vector(&[20.0, 30.0])).unwrap();
    assert_eq!(numbers(&first), vec![20.0, 2.0, 3.0]);
    assert_eq!(numbers(&second), vec![30.0, 12.0, 14.0]);
    assert!(project.undo());
    assert_eq!(numbers(&first), vec![1.0, 2.0, 3.0]);
    assert_eq!(numbers(&second), vec![8.0, 12.0, 14.0]);
}

#[test]
fn test_chooser_can_pick_divergence() {
    let project = project();
    project.set_override_chooser(Some(Arc::new(
        |candidates: &[Quib], can_diverge: bool| -> Result<OverrideChoice, QuibError> {
            assert_eq!(candidates.len(), 1);
            assert!(can_diverge);
            Ok(OverrideChoice::Diverge)
        },
    )));
    let first = project.iquib(vector(&[1.0]));
    let second = project.iquib(vector(&[2.0]));
    let joined = project
        .call_named(
            "concatenate",
            vec![Arg::List(vec![Arg::Source(first.clone()), Arg::Source(second.clone())])],
            BTreeMap::new(),
        )
        .unwrap();
    joined.set_allow_overriding(true);
    joined.assign(vector(&[5.0, 6.0])).unwrap();
    assert_eq!(numbers(&first), vec![5.0]);
    assert_eq!(numbers(&second), vec![6.0]);
    assert!(joined.overrides().is_empty());
}

#[test]
fn test_upstream_write_then_downstream_inversion() {
    let project = project();
    let x = project.iquib(vector(&[1.0, 2.0, 3.0]));
    let scaled = &x * 2.0;
    let a = project.iquib(vector(&[0.0, 0.0, 0.0]));
    let total = &a + &scaled;
    assert_eq!(numbers(&total), vec![2.0, 4.0, 6.0]);

    x.assign_at(array_path([Index::Int(1)]), Value::Float(10.0)).unwrap();
    assert_eq!(scaled.cache_status(), CacheStatus::Partial);
    total.assign_at(array_path([Index::Int(1)]), Value::Float(25.0)).unwrap();
    assert_eq!(numbers(&a), vec![0.0, 5.0, 0.0]);
    assert_eq!(numbers(&total), vec![2.0, 25.0, 6.0]);
}

#[test]
fn test_full_read_revalidates_partial_cache() {
    let project = project();
    let x = project.iquib(vector(&[1.0, 2.0, 3.0]));
    let shifted = &x + 1.0;
    assert_eq!(numbers(&shifted), vec![2.0, 3.0, 4.0]);

    x.assign_at(array_path([Index::Int(2)]), Value::Float(7.0)).unwrap();
    assert_eq!(shifted.cache_status(), CacheStatus::Partial);
    assert_eq!(numbers(&shifted), vec![2.0, 3.0, 8.0]);
    assert_eq!(shifted.cache_status(), CacheStatus::AllValid);
}
