use super::{path_repr, Index, PathComponent, SliceIndex};
use crate::{
    value::{ndarray::slice_indices, Value},
    QuibError,
};

fn normalize_position(position: i64, len: usize) -> Result<usize, QuibError> {
    let resolved = if position < 0 { position + len as i64 } else { position };
    if resolved < 0 || resolved >= len as i64 {
        return Err(QuibError::InvalidIndex(format!(
            "index {position} out of range for sequence of length {len}"
        )));
    }
    Ok(resolved as usize)
}

fn sequence_positions(index: &Index, len: usize) -> Result<Vec<usize>, QuibError> {
    match index {
        Index::All | Index::Ellipsis => Ok((0..len).collect()),
        Index::Slice(slice) => slice_indices(slice, len),
        Index::Ints(list) => list.iter().map(|p| normalize_position(*p, len)).collect(),
        Index::Mask(mask) if mask.ndim() == 1 && mask.len() == len => Ok(mask.true_positions()),
        other => Err(QuibError::InvalidIndex(format!(
            "{other} cannot index a sequence"
        ))),
    }
}

fn slice_attribute_value(value: Option<i64>) -> Value {
    value.map(Value::Int).unwrap_or(Value::None)
}

/// Item access (or attribute access, for slice components) of a single path step.
pub fn get_item(value: &Value, component: &PathComponent) -> Result<Value, QuibError> {
    let index = &component.component;
    if component.is_attribute() {
        return match (value, index) {
            (Value::Slice(slice), Index::Field(name)) => Ok(slice_attribute_value(slice.attribute(name)?)),
            (other, _) => Err(QuibError::InvalidIndex(format!(
                "attribute access {component} on {}",
                other.kind()
            ))),
        };
    }
    match value {
        Value::Array(array) => {
            let selection = array.select(index)?;
            let selected = array.take(&selection);
            if selection.is_scalar {
                Ok(Value::Float(selected.data()[0]))
            } else {
                Ok(Value::Array(selected))
            }
        }
        Value::Record(record) => match index {
            Index::Field(name) => Ok(Value::Array(record.field(name)?.clone())),
            other => Ok(Value::Record(record.get_at(other)?)),
        },
        Value::List(items) | Value::Tuple(items) => {
            let rebuild = |items: Vec<Value>| match value {
                Value::Tuple(_) => Value::Tuple(items),
                _ => Value::List(items),
            };
            match index {
                Index::Int(position) => Ok(items[normalize_position(*position, items.len())?].clone()),
                Index::Tuple(parts) if matches!(parts.first(), Some(Index::Int(_))) => {
                    // numpy-style `[i, j]` on nested lists: step into the element, then index it.
                    let first = get_item(value, &PathComponent::new(parts[0].clone(), component.indexed_cls))?;
                    let rest = match &parts[1..] {
                        [] => return Ok(first),
                        [single] => single.clone(),
                        many => Index::Tuple(many.to_vec()),
                    };
                    get_item(&first, &PathComponent::new(rest, first.kind()))
                }
                other => Ok(rebuild(
                    sequence_positions(other, items.len())?
                        .into_iter()
                        .map(|position| items[position].clone())
                        .collect(),
                )),
            }
        }
        Value::Dict(map) => match index {
            Index::Field(key) => map
                .get(key)
                .cloned()
                .ok_or_else(|| QuibError::InvalidIndex(format!("key '{key}' not found"))),
            Index::All | Index::Ellipsis => Ok(value.clone()),
            other => Err(QuibError::InvalidIndex(format!("{other} cannot index a dict"))),
        },
        Value::Slice(slice) => match index {
            Index::Field(name) => Ok(slice_attribute_value(slice.attribute(name)?)),
            Index::All | Index::Ellipsis => Ok(value.clone()),
            other => Err(QuibError::InvalidIndex(format!("{other} cannot index a slice"))),
        },
        other => match index {
            Index::All | Index::Ellipsis => Ok(other.clone()),
            _ => Err(QuibError::InvalidIndex(format!(
                "{} object is not subscriptable",
                other.kind()
            ))),
        },
    }
}

/// Write `new` into `container` at a single path step, mutating it in place.
pub fn set_item(container: &mut Value, component: &PathComponent, new: &Value) -> Result<(), QuibError> {
    let index = &component.component;
    if component.is_attribute() {
        return match (container, index) {
            (Value::Slice(slice), Index::Field(name)) => slice.set_attribute(name, slice_attribute_from(new)?),
            (other, _) => Err(QuibError::InvalidIndex(format!(
                "attribute assignment {component} on {}",
                other.kind()
            ))),
        };
    }
    match container {
        Value::Array(array) => array.set_at(index, &new.to_array()?),
        Value::Record(record) => match (index, new) {
            (Index::Field(name), new) => record.set_field(name, &new.to_array()?),
            (other, Value::Record(values)) => record.set_at(other, values),
            (other, new) => record.set_all_fields_at(other, &new.to_array()?),
        },
        Value::List(items) | Value::Tuple(items) => match index {
            Index::Int(position) => {
                let position = normalize_position(*position, items.len())?;
                items[position] = new.clone();
                Ok(())
            }
            Index::Slice(slice) if slice.step.is_none_or(|step| step == 1) => {
                let replacement = sequence_items(new)?;
                let positions = slice_indices(slice, items.len())?;
                let start = positions
                    .first()
                    .copied()
                    .unwrap_or_else(|| clamp_slice_start(slice, items.len()));
                let end = start + positions.len();
                items.splice(start..end, replacement);
                Ok(())
            }
            other => {
                let positions = sequence_positions(other, items.len())?;
                let replacement = sequence_items(new)?;
                if replacement.len() != positions.len() {
                    return Err(QuibError::InvalidIndex(format!(
                        "attempt to assign sequence of size {} to extended slice of size {}",
                        replacement.len(),
                        positions.len()
                    )));
                }
                for (position, item) in positions.into_iter().zip(replacement) {
                    items[position] = item;
                }
                Ok(())
            }
        },
        Value::Dict(map) => match index {
            Index::Field(key) => {
                map.insert(key.clone(), new.clone());
                Ok(())
            }
            other => Err(QuibError::InvalidIndex(format!("{other} cannot index a dict"))),
        },
        Value::Slice(slice) => match index {
            Index::Field(name) => slice.set_attribute(name, slice_attribute_from(new)?),
            other => Err(QuibError::InvalidIndex(format!("{other} cannot index a slice"))),
        },
        other => match index {
            Index::All | Index::Ellipsis => {
                *other = new.clone();
                Ok(())
            }
            _ => Err(QuibError::InvalidIndex(format!(
                "{} object does not support item assignment",
                other.kind()
            ))),
        },
    }
}

fn slice_attribute_from(new: &Value) -> Result<Option<i64>, QuibError> {
    match new {
        Value::None => Ok(None),
        other => other.as_i64().map(Some).ok_or_else(|| {
            QuibError::InvalidArgument(format!("slice attribute must be an integer, got {other}"))
        }),
    }
}

fn clamp_slice_start(slice: &SliceIndex, len: usize) -> usize {
    let start = slice.start.unwrap_or(0);
    let resolved = if start < 0 { start + len as i64 } else { start };
    resolved.clamp(0, len as i64) as usize
}

fn sequence_items(value: &Value) -> Result<Vec<Value>, QuibError> {
    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
        Value::Array(array) if array.ndim() == 1 => {
            Ok(array.data().iter().map(|x| Value::Float(*x)).collect())
        }
        other => Err(QuibError::InvalidArgument(format!(
            "can only assign an iterable, got {}",
            other.kind()
        ))),
    }
}

/// Walk `path` left to right and return the addressed sub-value.
pub fn deep_get(value: &Value, path: &[PathComponent]) -> Result<Value, QuibError> {
    let mut current = value.clone();
    for component in path {
        current = get_item(&current, component)?;
    }
    Ok(current)
}

/// Return a copy of `data` with `value` written at `path`.
///
/// The containers along the path are collected first, then rebuilt from the innermost level
/// outward, each one cloned before it is written to. `data` itself is never mutated, so values
/// sharing structure with it (earlier cache contents, override values) stay intact.
///
/// A failing write is reported as [`QuibError::DeepAssign`] when `raise_on_failure` is set;
/// otherwise it is logged and `data` is returned unchanged.
pub fn deep_assign_data_in_path(
    data: &Value,
    path: &[PathComponent],
    value: &Value,
    raise_on_failure: bool,
) -> Result<Value, QuibError> {
    let Some((last, outer)) = path.split_last() else {
        return Ok(value.clone());
    };
    match assign_along(data, outer, last, value) {
        Ok(assigned) => Ok(assigned),
        Err(err) => {
            let path = path_repr(path);
            if raise_on_failure {
                Err(QuibError::DeepAssign {
                    path,
                    reason: err.to_string(),
                })
            } else {
                tracing::warn!("Skipping assignment at {path}: {err}");
                Ok(data.clone())
            }
        }
    }
}

fn assign_along(
    data: &Value,
    outer: &[PathComponent],
    last: &PathComponent,
    value: &Value,
) -> Result<Value, QuibError> {
    let mut levels = Vec::with_capacity(outer.len() + 1);
    levels.push(data.clone());
    for component in outer {
        let inner = get_item(levels.last().unwrap_or(data), component)?;
        levels.push(inner);
    }
    let components: Vec<&PathComponent> = outer.iter().chain(std::iter::once(last)).collect();
    let mut new_value = value.clone();
    for (mut container, component) in levels.into_iter().zip(components).rev() {
        set_item(&mut container, component, &new_value)?;
        new_value = container;
    }
    Ok(new_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        path::array_path,
        value::{FieldArray, NdArray},
    };
    use std::collections::BTreeMap;

    #[test]
    fn test_deep_get_composes() {
        let mut inner = BTreeMap::new();
        inner.insert("xs".to_string(), Value::from_vec(vec![1.0, 2.0, 3.0]));
        let data = Value::List(vec![Value::Int(0), Value::Dict(inner)]);
        let path = vec![
            PathComponent::item(1),
            PathComponent::key("xs"),
            PathComponent::array(Index::Int(2)),
        ];
        assert_eq!(deep_get(&data, &path).unwrap(), Value::Float(3.0));
        let head = deep_get(&data, &path[..2]).unwrap();
        assert_eq!(deep_get(&head, &path[2..]).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_deep_assign_through_slice_writes_back() {
        let data = Value::Array(NdArray::arange(&[2, 3]));
        let path = array_path([Index::Int(1), Index::Slice(SliceIndex::range(0, 2))]);
        let assigned = deep_assign_data_in_path(&data, &path, &Value::Float(9.0), true).unwrap();
        assert_eq!(
            assigned.to_array().unwrap().data(),
            &[0.0, 1.0, 2.0, 9.0, 9.0, 5.0]
        );
        // the source value is untouched
        assert_eq!(data.to_array().unwrap().data()[3], 3.0);
    }

    #[test]
    fn test_deep_assign_rebuilds_every_level() {
        let mut inner = BTreeMap::new();
        inner.insert("xs".to_string(), Value::from_vec(vec![1.0, 2.0, 3.0]));
        let data = Value::List(vec![Value::Int(0), Value::Dict(inner)]);
        let path = vec![
            PathComponent::item(1),
            PathComponent::key("xs"),
            PathComponent::array(Index::Int(2)),
        ];
        let assigned = deep_assign_data_in_path(&data, &path, &Value::Float(8.0), true).unwrap();
        assert_eq!(deep_get(&assigned, &path).unwrap(), Value::Float(8.0));
        assert_eq!(deep_get(&assigned, &[PathComponent::item(0)]).unwrap(), Value::Int(0));
        assert_eq!(deep_get(&data, &path).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_deep_assign_field_then_index() {
        let record = FieldArray::new(vec![
            ("x".to_string(), NdArray::from_vec(vec![1.0, 2.0])),
            ("y".to_string(), NdArray::from_vec(vec![3.0, 4.0])),
        ])
        .unwrap();
        let data = Value::Record(record);
        let path = vec![PathComponent::field("y"), PathComponent::array(Index::Int(0))];
        let assigned = deep_assign_data_in_path(&data, &path, &Value::Float(7.0), true).unwrap();
        assert_eq!(
            deep_get(&assigned, &[PathComponent::field("y")]).unwrap(),
            Value::from_vec(vec![7.0, 4.0])
        );
    }

    #[test]
    fn test_slice_attribute_access() {
        let data = Value::Slice(SliceIndex::range(1, 4));
        let stop = deep_get(&data, &[PathComponent::attribute("stop")]).unwrap();
        assert_eq!(stop, Value::Int(4));
        let assigned =
            deep_assign_data_in_path(&data, &[PathComponent::attribute("start")], &Value::Int(2), true).unwrap();
        assert_eq!(assigned, Value::Slice(SliceIndex::range(2, 4)));
    }

    #[test]
    fn test_out_of_range_assignment() {
        let data = Value::from_vec(vec![1.0, 2.0]);
        let path = array_path([Index::Int(5)]);
        assert!(matches!(
            deep_assign_data_in_path(&data, &path, &Value::Float(0.0), true),
            Err(QuibError::DeepAssign { .. })
        ));
        let unchanged = deep_assign_data_in_path(&data, &path, &Value::Float(0.0), false).unwrap();
        assert_eq!(unchanged, data);
    }
}
