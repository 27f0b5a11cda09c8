//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use quib_core::{project::Project, value::Value, GraphConfig, Quib};
use std::sync::Arc;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times, subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[allow(dead_code)]
pub fn project() -> Arc<Project> {
    init_logging();
    Project::new(GraphConfig::default())
}

/// The numbers of an array quib, flattened.
#[allow(dead_code)]
pub fn numbers(quib: &Quib) -> Vec<f64> {
    quib.get_value()
        .and_then(|value| value.to_array())
        .map(|array| array.data().to_vec())
        .unwrap()
}

#[allow(dead_code)]
pub fn vector(data: &[f64]) -> Value {
    Value::from_vec(data.to_vec())
}
