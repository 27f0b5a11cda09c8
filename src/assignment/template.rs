use serde::{Deserialize, Serialize};

use crate::{value::Value, QuibError};

/// Restriction applied to every value assigned to a quib.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AssignmentTemplate {
    /// Clamp into `[min, max]`.
    Bound { min: f64, max: f64 },
    /// Snap to `start + k * step` and clamp into `[start, stop]`.
    Range { start: f64, stop: f64, step: f64 },
}

impl AssignmentTemplate {
    pub fn bound(min: f64, max: f64) -> Result<AssignmentTemplate, QuibError> {
        if max < min {
            return Err(QuibError::Template(format!("max ({max}) is smaller than min ({min})")));
        }
        Ok(AssignmentTemplate::Bound { min, max })
    }

    pub fn range(start: f64, stop: f64, step: f64) -> Result<AssignmentTemplate, QuibError> {
        if stop < start {
            return Err(QuibError::Template(format!("stop ({stop}) is smaller than start ({start})")));
        }
        if step <= 0.0 || !step.is_finite() {
            return Err(QuibError::Template(format!("step must be positive, got {step}")));
        }
        Ok(AssignmentTemplate::Range { start, stop, step })
    }

    pub fn convert_scalar(&self, value: f64) -> f64 {
        match *self {
            AssignmentTemplate::Bound { min, max } => value.clamp(min, max),
            AssignmentTemplate::Range { start, stop, step } => {
                let last = ((stop - start) / step).floor();
                let k = ((value - start) / step).round().clamp(0.0, last);
                start + k * step
            }
        }
    }

    /// Apply to every number in `value`. Integers stay integers when the result is integral.
    pub fn convert(&self, value: &Value) -> Result<Value, QuibError> {
        match value {
            Value::Int(i) => {
                let converted = self.convert_scalar(*i as f64);
                Ok(if converted.fract() == 0.0 {
                    Value::Int(converted as i64)
                } else {
                    Value::Float(converted)
                })
            }
            Value::Float(f) => Ok(Value::Float(self.convert_scalar(*f))),
            Value::Array(array) => Ok(Value::Array(array.map(|x| self.convert_scalar(*x)))),
            Value::List(items) => Ok(Value::List(
                items.iter().map(|item| self.convert(item)).collect::<Result<_, _>>()?,
            )),
            Value::Tuple(items) => Ok(Value::Tuple(
                items.iter().map(|item| self.convert(item)).collect::<Result<_, _>>()?,
            )),
            other => Err(QuibError::Template(format!(
                "cannot apply a numeric template to a value of kind {}",
                other.kind()
            ))),
        }
    }
}
