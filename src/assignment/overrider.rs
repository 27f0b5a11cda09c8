use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Assignment, AssignmentValue};
use crate::{
    path::{deep_assign_data_in_path, deep_get, Index, Path, PathComponent},
    value::{NdArray, Value, ValueKind},
    QuibError,
};

/// The ordered log of assignments made directly to one quib.
///
/// Entries are addressed by a stable index: removing one never renumbers the others, so undo
/// and redo can put an entry back exactly where it was. Applying the log walks the entries in
/// index order, later entries winning where paths overlap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Assignment>", into = "Vec<Assignment>")]
pub struct Overrider {
    assignments: BTreeMap<usize, Assignment>,
    next_index: usize,
}

impl From<Vec<Assignment>> for Overrider {
    fn from(assignments: Vec<Assignment>) -> Self {
        let next_index = assignments.len();
        Overrider {
            assignments: assignments.into_iter().enumerate().collect(),
            next_index,
        }
    }
}

impl From<Overrider> for Vec<Assignment> {
    fn from(overrider: Overrider) -> Self {
        overrider.assignments.into_values().collect()
    }
}

impl Overrider {
    pub fn new() -> Overrider {
        Overrider::default()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Assignment)> {
        self.assignments.iter().map(|(index, assignment)| (*index, assignment))
    }

    pub fn assignments(&self) -> Vec<Assignment> {
        self.assignments.values().cloned().collect()
    }

    pub fn get(&self, index: usize) -> Option<&Assignment> {
        self.assignments.get(&index)
    }

    /// Append `assignment`. An existing entry at the same path is dropped first, so the new one
    /// moves to the end; it is returned with its index so the replacement can be undone.
    pub fn add_assignment(&mut self, assignment: Assignment) -> (usize, Option<(usize, Assignment)>) {
        let replaced = self
            .assignments
            .iter()
            .find(|(_, existing)| existing.path == assignment.path)
            .map(|(index, _)| *index)
            .and_then(|index| self.assignments.remove(&index).map(|existing| (index, existing)));
        let index = self.next_index;
        self.assignments.insert(index, assignment);
        self.next_index += 1;
        (index, replaced)
    }

    /// Record a removal of the overrides at `path`.
    pub fn remove_assignment(&mut self, path: Path) -> (usize, Option<(usize, Assignment)>) {
        self.add_assignment(Assignment::default_at(path))
    }

    pub fn pop_assignment_at_index(&mut self, index: usize) -> Option<Assignment> {
        self.assignments.remove(&index)
    }

    pub fn insert_assignment_at_index(&mut self, index: usize, assignment: Assignment) {
        self.assignments.insert(index, assignment);
        self.next_index = self.next_index.max(index + 1);
    }

    /// Drop every entry, returning the paths they covered.
    pub fn clear_assignments(&mut self) -> Vec<Path> {
        let paths = self.assignments.values().map(|assignment| assignment.path.clone()).collect();
        self.assignments.clear();
        paths
    }

    /// `base` with every entry applied in order. `Default` entries restore `base` at their path.
    ///
    /// Entries that no longer fit the data (a since-resized array) are skipped with a warning,
    /// or fail when `raise_on_failure` is set.
    pub fn override_value(&self, base: &Value, raise_on_failure: bool) -> Result<Value, QuibError> {
        let mut data = base.clone();
        for assignment in self.assignments.values() {
            let value = match &assignment.value {
                AssignmentValue::Default => match deep_get(base, &assignment.path) {
                    Ok(value) => value,
                    Err(err) if raise_on_failure => return Err(err),
                    Err(err) => {
                        tracing::warn!("Skipping removal at {}: {err}", crate::path::path_repr(&assignment.path));
                        continue;
                    }
                },
                AssignmentValue::Delta(delta) => {
                    match deep_get(&data, &assignment.path).and_then(|current| resolve_delta(&current, delta)) {
                        Ok(value) => value,
                        Err(err) if raise_on_failure => return Err(err),
                        Err(err) => {
                            tracing::warn!("Skipping delta at {}: {err}", crate::path::path_repr(&assignment.path));
                            continue;
                        }
                    }
                }
                _ => match assignment.written_value()? {
                    Some(value) => value,
                    None => continue,
                },
            };
            data = deep_assign_data_in_path(&data, &assignment.path, &value, raise_on_failure)?;
        }
        Ok(data)
    }

    /// Element mask over `shape` of the positions currently overridden.
    pub fn fill_override_mask(&self, shape: &[usize]) -> NdArray<bool> {
        let mut mask = NdArray::full(shape, false);
        for assignment in self.assignments.values() {
            let overridden = !assignment.is_default();
            match element_index(&assignment.path) {
                None => mask = NdArray::full(shape, overridden),
                Some(index) => {
                    if let Err(err) = mask.fill_at(&index, overridden) {
                        tracing::debug!("Override at {} is outside the value: {err}", crate::path::path_repr(&assignment.path));
                    }
                }
            }
        }
        mask
    }

    /// Whether the region at `path` is entirely shadowed by overrides, so that changes to the
    /// computed value there are not visible.
    pub fn covers(&self, shape: Option<&[usize]>, path: &[PathComponent]) -> bool {
        // field and key overrides only shadow part of an element
        let partial_elements = self
            .assignments
            .values()
            .any(|assignment| assignment.path.first().is_some_and(|first| first.component.is_field()));
        if partial_elements {
            return false;
        }
        let Some(shape) = shape else {
            return self.whole_override_is_last();
        };
        let Some(index) = element_index(path) else {
            return self.fill_override_mask(shape).all();
        };
        match NdArray::mask_for_index(shape, &index) {
            Ok(requested) => {
                let overridden = self.fill_override_mask(shape);
                requested
                    .zip_with(&overridden, |requested, overridden| !*requested || *overridden)
                    .map(|covered| covered.all())
                    .unwrap_or(false)
            }
            Err(_) => false,
        }
    }

    fn whole_override_is_last(&self) -> bool {
        let mut covered = false;
        for assignment in self.assignments.values() {
            if assignment.path.is_empty() {
                covered = !assignment.is_default();
            } else if assignment.is_default() {
                covered = false;
            }
        }
        covered
    }
}

/// The element index a path addresses, seen at array level. `None` for the whole value.
fn element_index(path: &[PathComponent]) -> Option<Index> {
    let first = path.first()?;
    match first.indexed_cls {
        ValueKind::Record if first.component.is_field() => match path.get(1) {
            Some(element) => Some(element.component.clone()),
            None => Some(Index::All),
        },
        ValueKind::Dict => Some(Index::All),
        _ if first.is_whole() => None,
        _ => Some(first.component.clone()),
    }
}

/// `current + delta`, for resolving relative assignments.
pub(crate) fn resolve_delta(current: &Value, delta: &Value) -> Result<Value, QuibError> {
    match (current, delta) {
        (Value::Int(c), Value::Int(d)) => Ok(Value::Int(c + d)),
        (c, d) if c.is_scalar() && d.is_scalar() => Ok(Value::Float(c.as_f64().unwrap_or(0.0) + d.as_f64().unwrap_or(0.0))),
        (c, d) => Ok(Value::from_ndarray(c.to_array()?.zip_with(&d.to_array()?, |c, d| c + d)?)),
    }
}
