//! Benchmarks for evaluation and invalidation through quib chains
//!
//! - Evaluating a long elementwise chain from scratch
//! - Re-evaluating after a single-element change (partial invalidation)
//! - Routing an assignment from the end of the chain back to its input
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use quib_core::{
    path::{array_path, Index},
    project::Project,
    value::Value,
    GraphConfig, Quib,
};
use std::sync::Arc;

const CHAIN_LENGTH: usize = 20;
const ARRAY_SIZE: usize = 1_000;

fn build_chain(project: &Arc<Project>) -> (Quib, Quib) {
    let input = project.iquib(Value::from_vec((0..ARRAY_SIZE).map(|i| i as f64).collect()));
    let mut last = input.clone();
    for step in 0..CHAIN_LENGTH {
        last = if step % 2 == 0 { &last + 1.0 } else { &last * 1.5 };
    }
    (input, last)
}

fn bench_full_evaluation(c: &mut Criterion) {
    c.bench_function("evaluate_chain", |b| {
        b.iter_batched(
            || {
                let project = Project::new(GraphConfig::default());
                let (input, last) = build_chain(&project);
                (project, input, last)
            },
            |(_project, _input, last)| last.get_value().unwrap(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_partial_invalidation(c: &mut Criterion) {
    let project = Project::new(GraphConfig::default());
    let (input, last) = build_chain(&project);
    last.get_value().unwrap();
    let mut value = 0.0;
    c.bench_function("change_one_element", |b| {
        b.iter(|| {
            value += 1.0;
            input
                .assign_at(array_path([Index::Int(7)]), Value::Float(value))
                .unwrap();
            last.get_value_valid_at_path(&array_path([Index::Int(7)])).unwrap()
        })
    });
}

fn bench_inverse_assignment(c: &mut Criterion) {
    let project = Project::new(GraphConfig::default());
    let (_input, last) = build_chain(&project);
    last.get_value().unwrap();
    let mut value = 0.0;
    c.bench_function("assign_through_chain", |b| {
        b.iter(|| {
            value += 1.0;
            last.assign_at(array_path([Index::Int(3)]), Value::Float(value)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_full_evaluation,
    bench_partial_invalidation,
    bench_inverse_assignment
);
criterion_main!(benches);
