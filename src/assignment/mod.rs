//! Assignments and the per-quib override log.
//!
//! - [`overrider`]: the ordered, index-stable [`Overrider`] log applied over computed values
//! - [`template`]: value restrictions applied to incoming assignments
//! - [`simplifier`]: normalization of assignment paths and values before they are stored
//! - [`choice`]: the external override-choice collaborator and its per-quib cache
//! - [`override_group`]: a batch of overrides and removals applied as one undo step

pub mod choice;
pub mod override_group;
pub mod overrider;
pub mod simplifier;
pub mod template;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use choice::{ChoiceContext, OverrideChoice, OverrideChooser};
pub use override_group::OverrideGroup;
pub use overrider::Overrider;
pub use template::AssignmentTemplate;

use crate::{
    path::{path_repr, Path},
    value::{NdArray, Value},
    QuibError,
};

/// What an assignment writes at its path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignmentValue {
    Value(Value),
    /// Removes earlier overrides at the path, restoring the computed value.
    Default,
    /// Added to the current value at the path; resolved into a `Value` before inversion.
    Delta(Value),
    /// A dragged value with the precision the drag can resolve.
    WithTolerance { nominal: Value, down: Value, up: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub path: Path,
    pub value: AssignmentValue,
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = path_repr(&self.path);
        match &self.value {
            AssignmentValue::Value(value) => write!(f, "{path} = {value}"),
            AssignmentValue::Default => write!(f, "{path} = default"),
            AssignmentValue::Delta(delta) => write!(f, "{path} += {delta}"),
            AssignmentValue::WithTolerance { nominal, down, up } => {
                write!(f, "{path} = {nominal} [{down}, {up}]")
            }
        }
    }
}

impl Assignment {
    pub fn new(path: Path, value: Value) -> Assignment {
        Assignment {
            path,
            value: AssignmentValue::Value(value),
        }
    }

    pub fn default_at(path: Path) -> Assignment {
        Assignment {
            path,
            value: AssignmentValue::Default,
        }
    }

    pub fn delta(path: Path, delta: Value) -> Assignment {
        Assignment {
            path,
            value: AssignmentValue::Delta(delta),
        }
    }

    pub fn with_tolerance(path: Path, nominal: Value, down: Value, up: Value) -> Assignment {
        Assignment {
            path,
            value: AssignmentValue::WithTolerance { nominal, down, up },
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self.value, AssignmentValue::Default)
    }

    /// The same assignment value placed at another path.
    pub fn at_path(&self, path: Path) -> Assignment {
        Assignment {
            path,
            value: self.value.clone(),
        }
    }

    /// The value written by this assignment; `None` for removals.
    pub fn written_value(&self) -> Result<Option<Value>, QuibError> {
        match &self.value {
            AssignmentValue::Value(value) => Ok(Some(value.clone())),
            AssignmentValue::Default => Ok(None),
            AssignmentValue::WithTolerance { nominal, down, up } => resolve_tolerance(nominal, down, up).map(Some),
            AssignmentValue::Delta(_) => Err(QuibError::InvalidArgument(format!(
                "delta assignment {self} must be resolved before it is applied"
            ))),
        }
    }
}

impl AssignmentValue {
    /// Apply `f` to every value carried, keeping the variant. Tolerance brackets are kept
    /// ordered, since a decreasing map swaps the ends.
    pub fn try_map<F>(&self, mut f: F) -> Result<AssignmentValue, QuibError>
    where
        F: FnMut(&Value) -> Result<Value, QuibError>,
    {
        match self {
            AssignmentValue::Value(value) => Ok(AssignmentValue::Value(f(value)?)),
            AssignmentValue::Default => Ok(AssignmentValue::Default),
            AssignmentValue::Delta(delta) => Ok(AssignmentValue::Delta(f(delta)?)),
            AssignmentValue::WithTolerance { nominal, down, up } => {
                let (down, up) = ordered_bracket(&f(down)?, &f(up)?)?;
                Ok(AssignmentValue::WithTolerance {
                    nominal: f(nominal)?,
                    down,
                    up,
                })
            }
        }
    }
}

fn ordered_bracket(down: &Value, up: &Value) -> Result<(Value, Value), QuibError> {
    if down.is_scalar() && up.is_scalar() {
        let (low, high) = (down.as_f64().unwrap_or(0.0), up.as_f64().unwrap_or(0.0));
        return Ok(if low <= high {
            (down.clone(), up.clone())
        } else {
            (up.clone(), down.clone())
        });
    }
    let low = down.to_array()?;
    let high = up.to_array()?;
    let min = low.zip_with(&high, |l, h| f64::min(*l, *h))?;
    let max = low.zip_with(&high, |l, h| f64::max(*l, *h))?;
    Ok((Value::from_ndarray(min), Value::from_ndarray(max)))
}

/// The number with the fewest decimals inside `[down, up]`, falling back to `nominal`.
pub fn shortest_in_bracket(nominal: f64, down: f64, up: f64) -> f64 {
    let (low, high) = if down <= up { (down, up) } else { (up, down) };
    if !nominal.is_finite() || !low.is_finite() || !high.is_finite() {
        return nominal;
    }
    for decimals in 0..=15 {
        let scale = 10f64.powi(decimals);
        let rounded = (nominal * scale).round() / scale;
        if (low..=high).contains(&rounded) {
            return rounded;
        }
    }
    nominal
}

fn resolve_tolerance(nominal: &Value, down: &Value, up: &Value) -> Result<Value, QuibError> {
    match (nominal.as_f64(), down.as_f64(), up.as_f64()) {
        (Some(n), Some(d), Some(u)) if nominal.is_scalar() => Ok(Value::Float(shortest_in_bracket(n, d, u))),
        _ => {
            let nominal_array = nominal.to_array()?;
            let shape = nominal_array.shape().to_vec();
            let down = down.to_array()?.broadcast_to(&shape)?;
            let up = up.to_array()?.broadcast_to(&shape)?;
            let data = nominal_array
                .data()
                .iter()
                .zip(down.data().iter().zip(up.data()))
                .map(|(n, (d, u))| shortest_in_bracket(*n, *d, *u))
                .collect();
            Ok(Value::from_ndarray(NdArray::from_shape_vec(shape, data)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortest_in_bracket() {
        assert_eq!(shortest_in_bracket(3.14159, 3.13, 3.15), 3.14);
        assert_eq!(shortest_in_bracket(2.7, 2.0, 3.0), 3.0);
        assert_eq!(shortest_in_bracket(0.123456, 0.123455, 0.123457), 0.123456);
    }

    #[test]
    fn test_try_map_keeps_bracket_ordered() {
        let value = AssignmentValue::WithTolerance {
            nominal: Value::Float(1.0),
            down: Value::Float(0.5),
            up: Value::Float(1.5),
        };
        let negated = value.try_map(|v| Ok(Value::Float(-v.as_f64().unwrap_or(0.0)))).unwrap();
        assert_eq!(
            negated,
            AssignmentValue::WithTolerance {
                nominal: Value::Float(-1.0),
                down: Value::Float(-1.5),
                up: Value::Float(-0.5),
            }
        );
    }

    #[test]
    fn test_written_value_resolves_tolerance() {
        let assignment = Assignment::with_tolerance(Vec::new(), Value::Float(0.4871), Value::Float(0.47), Value::Float(0.51));
        assert_eq!(assignment.written_value().unwrap(), Some(Value::Float(0.5)));
        assert_eq!(Assignment::default_at(Vec::new()).written_value().unwrap(), None);
    }
}
