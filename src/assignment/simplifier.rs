use super::{Assignment, AssignmentValue};
use crate::{
    path::{deep_get, Index, PathComponent},
    value::{ndarray::unravel, Value},
};

/// Normalize an assignment before it is stored. `None` when it would change nothing.
///
/// `data` is the current value of the quib, used to tell whether the target is a scalar.
pub fn simplify_assignment(assignment: Assignment, data: Option<&Value>) -> Option<Assignment> {
    let mut path = assignment.path;
    while path.last().is_some_and(PathComponent::is_whole) {
        path.pop();
    }
    let mut value = assignment.value;
    if let Some(last) = path.last_mut() {
        if let Index::Mask(mask) = &last.component {
            match mask.count() {
                0 => return None,
                1 => {
                    let flat = mask.true_positions()[0];
                    let index = unravel(flat, mask.shape());
                    last.component = match index.as_slice() {
                        [single] => Index::Int(*single as i64),
                        _ => Index::Tuple(index.iter().map(|i| Index::Int(*i as i64)).collect()),
                    };
                    value = value_unwrapped(value);
                }
                _ => {}
            }
        }
    }
    let target_is_scalar = data
        .and_then(|data| deep_get(data, &path).ok())
        .is_some_and(|target| target.is_scalar());
    if target_is_scalar {
        value = value_unwrapped(value);
    }
    Some(Assignment { path, value })
}

fn value_unwrapped(value: AssignmentValue) -> AssignmentValue {
    match value.try_map(|v| Ok(drop_leading_unit_axis(v))) {
        Ok(mapped) => mapped,
        Err(_) => value,
    }
}

/// `[x]` becomes `x`, `[[x, y]]` becomes `[x, y]`.
fn drop_leading_unit_axis(value: &Value) -> Value {
    match value {
        Value::Array(array) if array.shape().first() == Some(&1) => array
            .reshape(&array.shape()[1..])
            .map(Value::from_ndarray)
            .unwrap_or_else(|_| value.clone()),
        Value::List(items) | Value::Tuple(items) if items.len() == 1 => items[0].clone(),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        path::{array_path, SliceIndex},
        value::NdArray,
    };

    #[test]
    fn test_trailing_whole_components_stripped() {
        let assignment = Assignment::new(
            array_path([Index::Int(1), Index::Slice(SliceIndex::full())]),
            Value::Float(1.0),
        );
        let simplified = simplify_assignment(assignment, None).unwrap();
        assert_eq!(simplified.path, array_path([Index::Int(1)]));
    }

    #[test]
    fn test_empty_mask_is_noop() {
        let mask = NdArray::full(&[3], false);
        let assignment = Assignment::new(array_path([Index::Mask(mask)]), Value::from_vec(Vec::new()));
        assert_eq!(simplify_assignment(assignment, None), None);
    }

    #[test]
    fn test_single_true_mask_collapses() {
        let mut mask = NdArray::full(&[2, 2], false);
        mask.set_flat(3, true);
        let assignment = Assignment::new(array_path([Index::Mask(mask)]), Value::from_vec(vec![9.0]));
        let simplified = simplify_assignment(assignment, None).unwrap();
        assert_eq!(simplified.path, array_path([Index::Tuple(vec![Index::Int(1), Index::Int(1)])]));
        assert_eq!(simplified.value, AssignmentValue::Value(Value::Float(9.0)));
    }

    #[test]
    fn test_one_element_value_unwrapped_at_scalar_target() {
        let data = Value::from_vec(vec![1.0, 2.0]);
        let assignment = Assignment::new(array_path([Index::Int(0)]), Value::list([Value::Int(5)]));
        let simplified = simplify_assignment(assignment, Some(&data)).unwrap();
        assert_eq!(simplified.value, AssignmentValue::Value(Value::Int(5)));
    }
}
