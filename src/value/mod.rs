//! The dynamically typed values flowing through a quib graph.
//!
//! - [`ndarray`]: dense numeric n-d arrays, selection and broadcasting
//! - [`field_array`]: structured arrays with named fields

pub mod field_array;
pub mod ndarray;

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

pub use field_array::FieldArray;
pub use ndarray::{broadcast_all_shapes, broadcast_shapes, NdArray, Selection};

use crate::{path::SliceIndex, QuibError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(NdArray<f64>),
    Record(FieldArray),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(BTreeMap<String, Value>),
    Slice(SliceIndex),
    Ellipsis,
}

/// The container type of a value. Recorded on every path component (as `indexed_cls`) so the
/// addressing semantics of the component can be recovered when paths are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueKind {
    None,
    Bool,
    Int,
    Float,
    Str,
    Array,
    Record,
    List,
    Tuple,
    Dict,
    Slice,
    Ellipsis,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Array => "array",
            ValueKind::Record => "record",
            ValueKind::List => "list",
            ValueKind::Tuple => "tuple",
            ValueKind::Dict => "dict",
            ValueKind::Slice => "slice",
            ValueKind::Ellipsis => "ellipsis",
        };
        write!(f, "{name}")
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::None,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Array(_) => ValueKind::Array,
            Value::Record(_) => ValueKind::Record,
            Value::List(_) => ValueKind::List,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::Dict(_) => ValueKind::Dict,
            Value::Slice(_) => ValueKind::Slice,
            Value::Ellipsis => ValueKind::Ellipsis,
        }
    }

    pub fn array(shape: Vec<usize>, data: Vec<f64>) -> Result<Value, QuibError> {
        Ok(Value::Array(NdArray::from_shape_vec(shape, data)?))
    }

    pub fn from_vec(data: Vec<f64>) -> Value {
        Value::Array(NdArray::from_vec(data))
    }

    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(items.into_iter().collect())
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    pub fn is_numeric_array_like(&self) -> bool {
        self.to_array().is_ok()
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Array(array) if array.len() == 1 => array.data().first().copied(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Convert to a numeric array (numpy `np.asarray` semantics for numbers and nested lists).
    pub fn to_array(&self) -> Result<NdArray<f64>, QuibError> {
        match self {
            Value::Array(array) => Ok(array.clone()),
            Value::List(items) | Value::Tuple(items) => {
                let arrays = items.iter().map(Value::to_array).collect::<Result<Vec<_>, _>>()?;
                let inner_shape = arrays.first().map(|a| a.shape().to_vec()).unwrap_or_default();
                if arrays.iter().any(|a| a.shape() != inner_shape.as_slice()) {
                    return Err(QuibError::InvalidArgument(
                        "cannot build an array from a ragged sequence".to_string(),
                    ));
                }
                let mut shape = vec![arrays.len()];
                shape.extend(inner_shape);
                let data = arrays.into_iter().flat_map(NdArray::into_data).collect();
                NdArray::from_shape_vec(shape, data)
            }
            other => other
                .as_f64()
                .map(NdArray::scalar)
                .ok_or_else(|| QuibError::InvalidArgument(format!("{} is not array-like", other.kind()))),
        }
    }

    /// Wrap a numeric result. Zero-dimensional results collapse to scalars, as numpy returns
    /// scalars for elementwise operations on scalars.
    pub fn from_ndarray(array: NdArray<f64>) -> Value {
        if array.ndim() == 0 {
            Value::Float(array.data()[0])
        } else {
            Value::Array(array)
        }
    }

    /// Shape of the value when viewed as an array; `None` for values that are not array-like.
    pub fn shape(&self) -> Option<Vec<usize>> {
        match self {
            Value::Array(array) => Some(array.shape().to_vec()),
            Value::Record(record) => Some(record.shape().to_vec()),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => Some(Vec::new()),
            Value::List(items) | Value::Tuple(items) => match self.to_array() {
                Ok(array) => Some(array.shape().to_vec()),
                Err(_) => Some(vec![items.len()]),
            },
            _ => None,
        }
    }

    /// Number of top-level elements (`len()` in the usual container sense).
    pub fn len(&self) -> Result<usize, QuibError> {
        match self {
            Value::Array(array) => array
                .shape()
                .first()
                .copied()
                .ok_or_else(|| QuibError::InvalidArgument("len() of unsized object".to_string())),
            Value::Record(record) => record
                .shape()
                .first()
                .copied()
                .ok_or_else(|| QuibError::InvalidArgument("len() of unsized object".to_string())),
            Value::List(items) | Value::Tuple(items) => Ok(items.len()),
            Value::Dict(map) => Ok(map.len()),
            Value::Str(s) => Ok(s.chars().count()),
            other => Err(QuibError::InvalidArgument(format!(
                "object of kind {} has no len()",
                other.kind()
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len().map(|len| len == 0).unwrap_or(false)
    }

    /// Whether two values have the same kind and structure (shape, fields, keys), which is
    /// what decides if a cache built for one can hold the other.
    pub fn structurally_matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(l), Value::Array(r)) => l.shape() == r.shape(),
            (Value::Record(l), Value::Record(r)) => l.shape() == r.shape() && l.same_fields(r),
            (Value::List(l), Value::List(r)) | (Value::Tuple(l), Value::Tuple(r)) => l.len() == r.len(),
            (Value::Dict(l), Value::Dict(r)) => l.keys().eq(r.keys()),
            (l, r) => l.kind() == r.kind(),
        }
    }

    /// Approximate equality used by tests and no-op detection.
    pub fn approx_eq(&self, other: &Value, tolerance: f64) -> bool {
        match (self, other) {
            (Value::Array(l), Value::Array(r)) => {
                l.shape() == r.shape()
                    && l.data().iter().zip(r.data()).all(|(a, b)| (a - b).abs() <= tolerance)
            }
            (Value::List(l), Value::List(r)) | (Value::Tuple(l), Value::Tuple(r)) => {
                l.len() == r.len() && l.iter().zip(r).all(|(a, b)| a.approx_eq(b, tolerance))
            }
            (l, r) if l.is_scalar() && r.is_scalar() => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() <= tolerance,
                _ => false,
            },
            (l, r) => l == r,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "'{s}'"),
            Value::Array(array) => write!(f, "array(shape={:?}, data={:?})", array.shape(), array.data()),
            Value::Record(record) => write!(
                f,
                "record(shape={:?}, fields={:?})",
                record.shape(),
                record.field_names().collect::<Vec<_>>()
            ),
            Value::List(items) | Value::Tuple(items) => {
                let (open, close) = if matches!(self, Value::List(_)) { ("[", "]") } else { ("(", ")") };
                write!(f, "{open}")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "{close}")
            }
            Value::Dict(map) => {
                write!(f, "{{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{key}': {item}")?;
                }
                write!(f, "}}")
            }
            Value::Slice(slice) => write!(f, "slice({slice})"),
            Value::Ellipsis => write!(f, "Ellipsis"),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::Int(x)
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Value::Bool(x)
    }
}

impl From<&str> for Value {
    fn from(x: &str) -> Self {
        Value::Str(x.to_string())
    }
}

impl From<String> for Value {
    fn from(x: String) -> Self {
        Value::Str(x)
    }
}

impl From<NdArray<f64>> for Value {
    fn from(x: NdArray<f64>) -> Self {
        Value::Array(x)
    }
}

impl From<FieldArray> for Value {
    fn from(x: FieldArray) -> Self {
        Value::Record(x)
    }
}

impl From<Vec<f64>> for Value {
    fn from(x: Vec<f64>) -> Self {
        Value::from_vec(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_list_to_array() {
        let value = Value::list([Value::from_vec(vec![1.0, 2.0]), Value::from_vec(vec![3.0, 4.0])]);
        let array = value.to_array().unwrap();
        assert_eq!(array.shape(), &[2, 2]);
        assert_eq!(value.shape(), Some(vec![2, 2]));
    }

    #[test]
    fn test_structural_match_detects_shape_change() {
        let a = Value::from_vec(vec![1.0, 2.0]);
        let b = Value::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(!a.structurally_matches(&b));
        assert!(a.structurally_matches(&Value::from_vec(vec![5.0, 6.0])));
    }
}
