//! Shared test utilities for quib graph testing

use crate::{
    event::QuibEvent,
    func::FuncDefinition,
    project::Project,
    quib::Quib,
    value::Value,
    Arg, GraphConfig,
};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::Receiver,
        Arc,
    },
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn test_project() -> Arc<Project> {
    init_logging();
    Project::new(GraphConfig::default())
}

/// Events received so far, without blocking.
pub fn drain_events(events: &Receiver<QuibEvent>) -> Vec<QuibEvent> {
    events.try_iter().collect()
}

/// A custom identity function quib counting its evaluations.
pub fn counted_identity(project: &Arc<Project>, source: &Quib) -> (Quib, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let definition = FuncDefinition::custom("counted", move |args: &[Value], _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(args[0].clone())
    });
    let quib = project.call(definition.into_arc(), vec![Arg::Source(source.clone())], BTreeMap::new());
    (quib, count)
}

pub fn floats(value: &Value) -> Vec<f64> {
    value.to_array().map(|array| array.data().to_vec()).unwrap_or_default()
}
