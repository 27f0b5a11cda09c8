use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    value::{NdArray, Value},
    QuibError,
};

/// A python-style `start:stop:step` slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SliceIndex {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceIndex {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> SliceIndex {
        SliceIndex { start, stop, step }
    }

    pub fn range(start: i64, stop: i64) -> SliceIndex {
        SliceIndex::new(Some(start), Some(stop), None)
    }

    /// `[:]`
    pub fn full() -> SliceIndex {
        SliceIndex::default()
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.stop.is_none() && self.step.is_none_or(|step| step == 1)
    }

    pub fn attribute(&self, name: &str) -> Result<Option<i64>, QuibError> {
        match name {
            "start" => Ok(self.start),
            "stop" => Ok(self.stop),
            "step" => Ok(self.step),
            other => Err(QuibError::InvalidIndex(format!("slice has no attribute '{other}'"))),
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: Option<i64>) -> Result<(), QuibError> {
        match name {
            "start" => self.start = value,
            "stop" => self.stop = value,
            "step" => self.step = value,
            other => return Err(QuibError::InvalidIndex(format!("slice has no attribute '{other}'"))),
        }
        Ok(())
    }
}

impl fmt::Display for SliceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}:{}", part(self.start), part(self.stop))?;
        if let Some(step) = self.step {
            write!(f, ":{step}")?;
        }
        Ok(())
    }
}

/// One addressing step into a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Index {
    /// The whole object (python `[...]` applied to a non-array, or "no narrowing").
    All,
    Ellipsis,
    Int(i64),
    Slice(SliceIndex),
    /// Fancy indexing with a list of integers along the first axis.
    Ints(Vec<i64>),
    /// Boolean mask over the leading axes.
    Mask(NdArray<bool>),
    /// Multi-axis index made of `Int`, `Slice`, `Ints`, `All` and at most one `Ellipsis`.
    Tuple(Vec<Index>),
    /// Record field name, dict key, or slice attribute.
    Field(String),
}

impl Index {
    pub fn is_whole(&self) -> bool {
        match self {
            Index::All | Index::Ellipsis => true,
            Index::Slice(slice) => slice.is_full(),
            Index::Tuple(items) => items.iter().all(Index::is_whole),
            _ => false,
        }
    }

    pub fn is_field(&self) -> bool {
        matches!(self, Index::Field(_))
    }

    pub fn tuple(items: impl IntoIterator<Item = Index>) -> Index {
        Index::Tuple(items.into_iter().collect())
    }

    /// Interpret a runtime value as an index (the second argument of `getitem`).
    pub fn from_value(value: &Value) -> Result<Index, QuibError> {
        match value {
            Value::Int(i) => Ok(Index::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 => Ok(Index::Int(*f as i64)),
            Value::Str(name) => Ok(Index::Field(name.clone())),
            Value::Slice(slice) => Ok(Index::Slice(*slice)),
            Value::Ellipsis => Ok(Index::Ellipsis),
            Value::None => Ok(Index::All),
            Value::Tuple(items) => Ok(Index::Tuple(
                items.iter().map(Index::from_value).collect::<Result<_, _>>()?,
            )),
            Value::List(_) => match bool_leaves(value) {
                Some(mask) => Ok(Index::Mask(mask)),
                None => integer_list(value).map(Index::Ints),
            },
            Value::Array(array) => array
                .data()
                .iter()
                .map(|f| {
                    (f.fract() == 0.0)
                        .then_some(*f as i64)
                        .ok_or_else(|| QuibError::InvalidIndex(format!("{f} is not an integer index")))
                })
                .collect::<Result<_, _>>()
                .map(Index::Ints),
            other => Err(QuibError::InvalidIndex(format!(
                "{} cannot be used as an index",
                other.kind()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Index::All => Value::Slice(SliceIndex::full()),
            Index::Ellipsis => Value::Ellipsis,
            Index::Int(i) => Value::Int(*i),
            Index::Slice(slice) => Value::Slice(*slice),
            Index::Ints(list) => Value::List(list.iter().map(|i| Value::Int(*i)).collect()),
            Index::Mask(mask) => nested_bools(mask.shape(), mask.data()),
            Index::Tuple(items) => Value::Tuple(items.iter().map(Index::to_value).collect()),
            Index::Field(name) => Value::Str(name.clone()),
        }
    }
}

fn bool_leaves(value: &Value) -> Option<NdArray<bool>> {
    fn collect(value: &Value, shape: &mut Vec<usize>, depth: usize, out: &mut Vec<bool>) -> bool {
        match value {
            Value::Bool(b) => {
                out.push(*b);
                shape.len() == depth
            }
            Value::List(items) => {
                if shape.len() == depth {
                    shape.push(items.len());
                } else if shape.get(depth) != Some(&items.len()) {
                    return false;
                }
                items.iter().all(|item| collect(item, shape, depth + 1, out))
            }
            _ => false,
        }
    }
    let mut shape = Vec::new();
    let mut data = Vec::new();
    if !collect(value, &mut shape, 0, &mut data) || data.is_empty() {
        return None;
    }
    NdArray::from_shape_vec(shape, data).ok()
}

fn integer_list(value: &Value) -> Result<Vec<i64>, QuibError> {
    match value {
        Value::List(items) => items
            .iter()
            .map(|item| {
                item.as_i64()
                    .ok_or_else(|| QuibError::InvalidIndex(format!("{item} is not an integer index")))
            })
            .collect(),
        other => Err(QuibError::InvalidIndex(format!("{other} is not an integer list"))),
    }
}

fn nested_bools(shape: &[usize], data: &[bool]) -> Value {
    match shape.split_first() {
        None => Value::Bool(data.first().copied().unwrap_or(false)),
        Some((&len, rest)) => {
            let chunk = rest.iter().product::<usize>();
            Value::List(
                (0..len)
                    .map(|i| nested_bools(rest, &data[i * chunk..(i + 1) * chunk]))
                    .collect(),
            )
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::All => write!(f, ":"),
            Index::Ellipsis => write!(f, "..."),
            Index::Int(i) => write!(f, "{i}"),
            Index::Slice(slice) => write!(f, "{slice}"),
            Index::Ints(list) => write!(f, "{list:?}"),
            Index::Mask(mask) => write!(f, "<mask {:?}: {} true>", mask.shape(), mask.count()),
            Index::Tuple(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Index::Field(name) => write!(f, "'{name}'"),
        }
    }
}
