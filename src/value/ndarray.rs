//! A small dense, row-major n-dimensional array.
//!
//! [`NdArray`] carries exactly what the quib engine needs from an array library: shapes,
//! broadcasting, numpy-style selection ([`NdArray::select`]) and the handful of structural
//! operations used by the transpositional kernels.

use serde::{Deserialize, Serialize};

use crate::{
    path::{Index, SliceIndex},
    QuibError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

/// The result of applying an [`Index`] to an array of a given shape: the shape of the selected
/// region and the flat (row-major) positions it covers, in selection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub shape: Vec<usize>,
    pub flat: Vec<usize>,
    /// Every axis was consumed by an integer index: the selection is a single element.
    pub is_scalar: bool,
}

pub fn shape_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

pub fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for axis in (0..shape.len()).rev() {
        if shape[axis] > 0 {
            index[axis] = flat % shape[axis];
            flat /= shape[axis];
        }
    }
    index
}

pub fn ravel(index: &[usize], shape: &[usize]) -> usize {
    index
        .iter()
        .zip(strides(shape))
        .map(|(idx, stride)| idx * stride)
        .sum()
}

/// Numpy broadcasting of two shapes.
pub fn broadcast_shapes(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>, QuibError> {
    let ndim = lhs.len().max(rhs.len());
    let mut shape = vec![0; ndim];
    for axis in 0..ndim {
        let l = axis_from_right(lhs, ndim, axis);
        let r = axis_from_right(rhs, ndim, axis);
        shape[axis] = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            (l, r) => {
                return Err(QuibError::InvalidArgument(format!(
                    "operands could not be broadcast together: {lhs:?} vs {rhs:?} (axis {axis}: {l} vs {r})"
                )))
            }
        };
    }
    Ok(shape)
}

pub fn broadcast_all_shapes<'a, I>(shapes: I) -> Result<Vec<usize>, QuibError>
where
    I: IntoIterator<Item = &'a [usize]>,
{
    shapes
        .into_iter()
        .try_fold(Vec::new(), |acc, shape| broadcast_shapes(&acc, shape))
}

fn axis_from_right(shape: &[usize], ndim: usize, axis: usize) -> usize {
    let offset = ndim - shape.len();
    if axis < offset {
        1
    } else {
        shape[axis - offset]
    }
}

/// Map a position in a broadcast result back to the position in an operand of `shape`.
pub fn broadcast_source_index(result_index: &[usize], shape: &[usize]) -> Vec<usize> {
    let offset = result_index.len() - shape.len();
    shape
        .iter()
        .enumerate()
        .map(|(axis, &len)| if len == 1 { 0 } else { result_index[axis + offset] })
        .collect()
}

fn normalize_int(index: i64, len: usize, axis: usize) -> Result<usize, QuibError> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(QuibError::InvalidIndex(format!(
            "index {index} is out of bounds for axis {axis} with size {len}"
        )));
    }
    Ok(resolved as usize)
}

/// Resolve a slice into the explicit list of indices it selects on an axis of length `len`.
pub fn slice_indices(slice: &SliceIndex, len: usize) -> Result<Vec<usize>, QuibError> {
    let step = slice.step.unwrap_or(1);
    if step == 0 {
        return Err(QuibError::InvalidIndex("slice step cannot be zero".to_string()));
    }
    let len = len as i64;
    let clamp = |value: i64, lower: i64, upper: i64| value.max(lower).min(upper);
    let resolve = |value: i64| if value < 0 { value + len } else { value };
    let mut indices = Vec::new();
    if step > 0 {
        let start = slice.start.map(|s| clamp(resolve(s), 0, len)).unwrap_or(0);
        let stop = slice.stop.map(|s| clamp(resolve(s), 0, len)).unwrap_or(len);
        let mut i = start;
        while i < stop {
            indices.push(i as usize);
            i += step;
        }
    } else {
        let start = slice
            .start
            .map(|s| clamp(resolve(s), -1, len - 1))
            .unwrap_or(len - 1);
        let stop = slice.stop.map(|s| clamp(resolve(s), -1, len - 1)).unwrap_or(-1);
        let mut i = start;
        while i > stop {
            indices.push(i as usize);
            i += step;
        }
    }
    Ok(indices)
}

enum AxisSelection {
    Dropped(usize),
    Kept(Vec<usize>),
}

impl<T: Clone> NdArray<T> {
    pub fn from_shape_vec(shape: Vec<usize>, data: Vec<T>) -> Result<Self, QuibError> {
        if shape_size(&shape) != data.len() {
            return Err(QuibError::InvalidArgument(format!(
                "cannot build an array of shape {shape:?} from {} elements",
                data.len()
            )));
        }
        Ok(NdArray { shape, data })
    }

    pub fn full(shape: &[usize], value: T) -> Self {
        NdArray {
            shape: shape.to_vec(),
            data: vec![value; shape_size(shape)],
        }
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        NdArray {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn scalar(value: T) -> Self {
        NdArray {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, index: &[usize]) -> Option<&T> {
        if index.len() != self.ndim() || index.iter().zip(&self.shape).any(|(i, len)| i >= len) {
            return None;
        }
        self.data.get(ravel(index, &self.shape))
    }

    pub fn get_flat(&self, flat: usize) -> Option<&T> {
        self.data.get(flat)
    }

    pub fn set_flat(&mut self, flat: usize, value: T) {
        if let Some(slot) = self.data.get_mut(flat) {
            *slot = value;
        }
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> NdArray<U> {
        NdArray {
            shape: self.shape.clone(),
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Zip with another array after broadcasting both to their common shape.
    pub fn zip_with<U: Clone, V, F: FnMut(&T, &U) -> V>(
        &self,
        other: &NdArray<U>,
        mut f: F,
    ) -> Result<NdArray<V>, QuibError> {
        let shape = broadcast_shapes(&self.shape, &other.shape)?;
        let lhs = self.broadcast_to(&shape)?;
        let rhs = other.broadcast_to(&shape)?;
        Ok(NdArray {
            shape,
            data: lhs.data.iter().zip(rhs.data.iter()).map(|(l, r)| f(l, r)).collect(),
        })
    }

    pub fn broadcast_to(&self, shape: &[usize]) -> Result<NdArray<T>, QuibError> {
        if self.shape == shape {
            return Ok(self.clone());
        }
        let target = broadcast_shapes(&self.shape, shape)?;
        if target != shape {
            return Err(QuibError::InvalidArgument(format!(
                "cannot broadcast shape {:?} to {shape:?}",
                self.shape
            )));
        }
        let data = (0..shape_size(shape))
            .map(|flat| {
                let result_index = unravel(flat, shape);
                let source_index = broadcast_source_index(&result_index, &self.shape);
                self.data[ravel(&source_index, &self.shape)].clone()
            })
            .collect();
        Ok(NdArray {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Resolve an index against this array's shape.
    pub fn select(&self, index: &Index) -> Result<Selection, QuibError> {
        select_in_shape(&self.shape, index)
    }

    pub fn take(&self, selection: &Selection) -> NdArray<T> {
        NdArray {
            shape: selection.shape.clone(),
            data: selection.flat.iter().map(|&flat| self.data[flat].clone()).collect(),
        }
    }

    pub fn get_at(&self, index: &Index) -> Result<NdArray<T>, QuibError> {
        Ok(self.take(&self.select(index)?))
    }

    /// Scatter `values` (broadcast to the selection's shape) into the selected positions.
    pub fn put(&mut self, selection: &Selection, values: &NdArray<T>) -> Result<(), QuibError> {
        let values = if values.len() == 1 {
            NdArray::full(&selection.shape, values.data[0].clone())
        } else {
            values.broadcast_to(&selection.shape)?
        };
        for (flat, value) in selection.flat.iter().zip(values.data) {
            self.data[*flat] = value;
        }
        Ok(())
    }

    pub fn set_at(&mut self, index: &Index, values: &NdArray<T>) -> Result<(), QuibError> {
        let selection = self.select(index)?;
        self.put(&selection, values)
    }

    pub fn fill_at(&mut self, index: &Index, value: T) -> Result<(), QuibError> {
        let selection = self.select(index)?;
        for flat in selection.flat {
            self.data[flat] = value.clone();
        }
        Ok(())
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<NdArray<T>, QuibError> {
        NdArray::from_shape_vec(shape.to_vec(), self.data.clone())
    }

    /// Permute axes; `None` reverses them.
    pub fn transpose(&self, axes: Option<&[usize]>) -> Result<NdArray<T>, QuibError> {
        let axes: Vec<usize> = match axes {
            Some(axes) => axes.to_vec(),
            None => (0..self.ndim()).rev().collect(),
        };
        let mut sorted = axes.clone();
        sorted.sort_unstable();
        if sorted != (0..self.ndim()).collect::<Vec<_>>() {
            return Err(QuibError::InvalidArgument(format!(
                "axes {axes:?} don't match array of dimension {}",
                self.ndim()
            )));
        }
        let shape: Vec<usize> = axes.iter().map(|&axis| self.shape[axis]).collect();
        let data = (0..self.len())
            .map(|flat| {
                let out_index = unravel(flat, &shape);
                let mut in_index = vec![0; self.ndim()];
                for (out_axis, &in_axis) in axes.iter().enumerate() {
                    in_index[in_axis] = out_index[out_axis];
                }
                self.data[ravel(&in_index, &self.shape)].clone()
            })
            .collect();
        Ok(NdArray { shape, data })
    }

    /// Reverse the order of elements along `axis`, or along every axis when `None`.
    pub fn flip(&self, axis: Option<usize>) -> Result<NdArray<T>, QuibError> {
        if let Some(axis) = axis {
            self.check_axis(axis)?;
        }
        let data = (0..self.len())
            .map(|flat| {
                let mut index = unravel(flat, &self.shape);
                for (ax, idx) in index.iter_mut().enumerate() {
                    if axis.is_none_or(|flip_axis| flip_axis == ax) {
                        *idx = self.shape[ax] - 1 - *idx;
                    }
                }
                self.data[ravel(&index, &self.shape)].clone()
            })
            .collect();
        Ok(NdArray {
            shape: self.shape.clone(),
            data,
        })
    }

    pub fn concatenate(arrays: &[NdArray<T>], axis: usize) -> Result<NdArray<T>, QuibError> {
        let first = arrays
            .first()
            .ok_or_else(|| QuibError::InvalidArgument("need at least one array to concatenate".to_string()))?;
        first.check_axis(axis)?;
        let mut shape = first.shape.clone();
        shape[axis] = 0;
        for array in arrays {
            let compatible = array.ndim() == first.ndim()
                && array
                    .shape
                    .iter()
                    .zip(&first.shape)
                    .enumerate()
                    .all(|(ax, (l, r))| ax == axis || l == r);
            if !compatible {
                return Err(QuibError::InvalidArgument(format!(
                    "all the input array dimensions except for the concatenation axis must match: {:?} vs {:?}",
                    array.shape, first.shape
                )));
            }
            shape[axis] += array.shape[axis];
        }
        let data = (0..shape_size(&shape))
            .map(|flat| {
                let mut index = unravel(flat, &shape);
                let mut array_iter = arrays.iter();
                loop {
                    // The lengths along `axis` sum to shape[axis], so some array always matches.
                    let array = array_iter.next().unwrap_or(first);
                    if index[axis] < array.shape[axis] {
                        return array.data[ravel(&index, &array.shape)].clone();
                    }
                    index[axis] -= array.shape[axis];
                }
            })
            .collect();
        Ok(NdArray { shape, data })
    }

    /// Split into lanes along `axis`: one `Vec` per position of the remaining axes, in row-major
    /// order of those axes.
    pub fn lanes(&self, axis: usize) -> Result<Vec<Vec<T>>, QuibError> {
        self.check_axis(axis)?;
        let outer_shape = remove_axis(&self.shape, axis);
        Ok((0..shape_size(&outer_shape))
            .map(|outer| {
                let outer_index = unravel(outer, &outer_shape);
                (0..self.shape[axis])
                    .map(|position| {
                        let index = insert_axis(&outer_index, axis, position);
                        self.data[ravel(&index, &self.shape)].clone()
                    })
                    .collect()
            })
            .collect())
    }

    /// Fold every lane along `axis` into a single element.
    pub fn reduce_axis<U, F: FnMut(&[T]) -> U>(&self, axis: usize, mut f: F) -> Result<NdArray<U>, QuibError> {
        let shape = remove_axis(&self.shape, axis);
        let data = self.lanes(axis)?.iter().map(|lane| f(lane)).collect();
        Ok(NdArray { shape, data })
    }

    pub fn check_axis(&self, axis: usize) -> Result<(), QuibError> {
        if axis >= self.ndim() {
            return Err(QuibError::InvalidArgument(format!(
                "axis {axis} is out of bounds for array of dimension {}",
                self.ndim()
            )));
        }
        Ok(())
    }
}

impl NdArray<bool> {
    pub fn any(&self) -> bool {
        self.data.iter().any(|v| *v)
    }

    pub fn all(&self) -> bool {
        self.data.iter().all(|v| *v)
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// Boolean mask of `shape` that is true exactly where `index` selects.
    pub fn mask_for_index(shape: &[usize], index: &Index) -> Result<NdArray<bool>, QuibError> {
        let mut mask = NdArray::full(shape, false);
        mask.fill_at(index, true)?;
        Ok(mask)
    }

    pub fn and(&self, other: &NdArray<bool>) -> Result<NdArray<bool>, QuibError> {
        self.zip_with(other, |l, r| *l && *r)
    }

    pub fn or(&self, other: &NdArray<bool>) -> Result<NdArray<bool>, QuibError> {
        self.zip_with(other, |l, r| *l || *r)
    }

    pub fn true_positions(&self) -> Vec<usize> {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(flat, v)| v.then_some(flat))
            .collect()
    }
}

impl NdArray<f64> {
    pub fn arange(shape: &[usize]) -> NdArray<f64> {
        NdArray {
            shape: shape.to_vec(),
            data: (0..shape_size(shape)).map(|i| i as f64).collect(),
        }
    }
}

pub fn remove_axis(shape: &[usize], axis: usize) -> Vec<usize> {
    shape
        .iter()
        .enumerate()
        .filter_map(|(ax, len)| (ax != axis).then_some(*len))
        .collect()
}

pub fn insert_axis(index: &[usize], axis: usize, position: usize) -> Vec<usize> {
    let mut full = index.to_vec();
    full.insert(axis.min(full.len()), position);
    full
}

/// Resolve `index` against `shape` without needing the array itself.
pub fn select_in_shape(shape: &[usize], index: &Index) -> Result<Selection, QuibError> {
    match index {
        Index::All | Index::Ellipsis => Ok(Selection {
            shape: shape.to_vec(),
            flat: (0..shape_size(shape)).collect(),
            is_scalar: false,
        }),
        Index::Mask(mask) => select_with_mask(shape, mask),
        Index::Field(name) => Err(QuibError::InvalidIndex(format!(
            "field '{name}' cannot index a plain array"
        ))),
        Index::Tuple(items) => select_with_items(shape, items),
        item => select_with_items(shape, std::slice::from_ref(item)),
    }
}

fn select_with_mask(shape: &[usize], mask: &NdArray<bool>) -> Result<Selection, QuibError> {
    let mask_ndim = mask.ndim();
    if mask_ndim > shape.len() || mask.shape() != &shape[..mask_ndim] {
        return Err(QuibError::InvalidIndex(format!(
            "boolean index of shape {:?} does not match array of shape {shape:?}",
            mask.shape()
        )));
    }
    let trailing = &shape[mask_ndim..];
    let trailing_size = shape_size(trailing);
    let positions = mask.true_positions();
    let mut selected_shape = vec![positions.len()];
    selected_shape.extend_from_slice(trailing);
    let flat = positions
        .iter()
        .flat_map(|position| (0..trailing_size).map(move |inner| position * trailing_size + inner))
        .collect();
    Ok(Selection {
        shape: selected_shape,
        flat,
        is_scalar: false,
    })
}

fn select_with_items(shape: &[usize], items: &[Index]) -> Result<Selection, QuibError> {
    let ellipsis_count = items.iter().filter(|item| matches!(item, Index::Ellipsis)).count();
    if ellipsis_count > 1 {
        return Err(QuibError::InvalidIndex(
            "an index can only have a single ellipsis".to_string(),
        ));
    }
    let explicit = items.len() - ellipsis_count;
    if explicit > shape.len() {
        return Err(QuibError::InvalidIndex(format!(
            "too many indices for array: array is {}-dimensional, but {explicit} were indexed",
            shape.len()
        )));
    }
    let full_axis = Index::All;
    let mut expanded: Vec<&Index> = Vec::with_capacity(shape.len());
    for item in items {
        if matches!(item, Index::Ellipsis) {
            for _ in 0..(shape.len() - explicit) {
                expanded.push(&full_axis);
            }
        } else {
            expanded.push(item);
        }
    }
    while expanded.len() < shape.len() {
        expanded.push(&full_axis);
    }

    let mut axes = Vec::with_capacity(shape.len());
    for (axis, (item, &len)) in expanded.iter().zip(shape).enumerate() {
        axes.push(match item {
            Index::Int(i) => AxisSelection::Dropped(normalize_int(*i, len, axis)?),
            Index::Slice(slice) => AxisSelection::Kept(slice_indices(slice, len)?),
            Index::Ints(list) => AxisSelection::Kept(
                list.iter()
                    .map(|i| normalize_int(*i, len, axis))
                    .collect::<Result<_, _>>()?,
            ),
            Index::All => AxisSelection::Kept((0..len).collect()),
            other => {
                return Err(QuibError::InvalidIndex(format!(
                    "unsupported index item {other} in a multi-axis index"
                )))
            }
        });
    }

    let selected_shape: Vec<usize> = axes
        .iter()
        .filter_map(|axis| match axis {
            AxisSelection::Kept(indices) => Some(indices.len()),
            AxisSelection::Dropped(_) => None,
        })
        .collect();
    let is_scalar = axes.iter().all(|axis| matches!(axis, AxisSelection::Dropped(_)));
    let array_strides = strides(shape);
    let mut flat = Vec::with_capacity(shape_size(&selected_shape));
    for out in 0..shape_size(&selected_shape) {
        let out_index = unravel(out, &selected_shape);
        let mut kept_axis = 0;
        let mut position = 0;
        for (axis, selection) in axes.iter().enumerate() {
            let idx = match selection {
                AxisSelection::Dropped(idx) => *idx,
                AxisSelection::Kept(indices) => {
                    let idx = indices[out_index[kept_axis]];
                    kept_axis += 1;
                    idx
                }
            };
            position += idx * array_strides[axis];
        }
        flat.push(position);
    }
    Ok(Selection {
        shape: selected_shape,
        flat,
        is_scalar,
    })
}
