//! Translation for functions applied along one axis (reductions, `apply_along_axis`).
//!
//! Every lane along the axis maps to one result element (scalar lanes) or to one lane of the
//! result (vector lanes). Without an axis the call reduces the whole source to one value.

use super::{
    data_source, mask_at_first_component, mask_to_path, mask_to_paths, resolve_values, unique_data_sources,
    ResultMetadata, SourceFuncCall, SourceId, SourcePaths,
};
use crate::{
    func::functions::{axis_kwarg, reduced_shape},
    path::{PathComponent, Paths},
    value::{
        ndarray::{ravel, remove_axis, unravel},
        NdArray,
    },
    QuibError,
};

/// Functions that reduce the whole source when called without an axis.
const FULL_REDUCTIONS: [&str; 2] = ["sum", "mean"];

fn reduction_axis(func_call: &SourceFuncCall, ndim: usize) -> Result<Option<usize>, QuibError> {
    let (_, kwargs) = resolve_values(func_call)?;
    let axis = axis_kwarg(&kwargs, ndim)?;
    if axis.is_none() && !FULL_REDUCTIONS.contains(&func_call.func.name.as_str()) {
        return Ok(Some(0));
    }
    Ok(axis.filter(|_| ndim > 0))
}

/// Shape of the result: known for reductions, taken from the last run otherwise.
fn result_shape(
    func_call: &SourceFuncCall,
    source_shape: &[usize],
    axis: Option<usize>,
    metadata: Option<&ResultMetadata>,
) -> Result<Vec<usize>, QuibError> {
    if FULL_REDUCTIONS.contains(&func_call.func.name.as_str()) {
        return Ok(reduced_shape(source_shape, axis));
    }
    metadata
        .and_then(|metadata| metadata.shape.clone())
        .ok_or(QuibError::NeedsShapeAndType)
}

fn any_lane(lane: &[bool]) -> bool {
    lane.iter().any(|flag| *flag)
}

/// Spread a lane-level mask over a shape that has `axis` inserted into it.
fn expand_along_axis(outer: &NdArray<bool>, shape: &[usize], axis: usize) -> Result<NdArray<bool>, QuibError> {
    let data = (0..shape.iter().product::<usize>())
        .map(|flat| {
            let index = unravel(flat, shape);
            let outer_index = remove_axis(&index, axis);
            outer
                .get_flat(ravel(&outer_index, outer.shape()))
                .copied()
                .unwrap_or(false)
        })
        .collect();
    NdArray::from_shape_vec(shape.to_vec(), data)
}

pub fn forwards(
    func_call: &SourceFuncCall,
    source_id: SourceId,
    path: &[PathComponent],
    metadata: Option<&ResultMetadata>,
) -> Result<Paths, QuibError> {
    let source_shape = data_source(func_call, source_id)?.shape()?;
    let source_mask = mask_at_first_component(&source_shape, path)?;
    let Some(axis) = reduction_axis(func_call, source_shape.len())? else {
        return Ok(if source_mask.any() { vec![Vec::new()] } else { Vec::new() });
    };
    let outer = source_mask.reduce_axis(axis, any_lane)?;
    let result_shape = result_shape(func_call, &source_shape, Some(axis), metadata)?;
    if result_shape.as_slice() == outer.shape() {
        return Ok(mask_to_paths(outer));
    }
    if result_shape.len() != source_shape.len() {
        return Err(QuibError::NoTranslator(format!(
            "{}: result of shape {result_shape:?} does not follow the lanes of {source_shape:?}",
            func_call.func.name
        )));
    }
    Ok(mask_to_paths(expand_along_axis(&outer, &result_shape, axis)?))
}

pub fn backwards(
    func_call: &SourceFuncCall,
    path: &[PathComponent],
    metadata: Option<&ResultMetadata>,
) -> Result<SourcePaths, QuibError> {
    let mut paths = SourcePaths::new();
    let Some(source) = unique_data_sources(func_call).into_iter().next() else {
        return Ok(paths);
    };
    let source_shape = source.shape()?;
    let axis = reduction_axis(func_call, source_shape.len())?;
    let result_shape = result_shape(func_call, &source_shape, axis, metadata)?;
    let result_mask = mask_at_first_component(&result_shape, path)?;
    let source_mask = match axis {
        None => NdArray::full(&source_shape, result_mask.any()),
        Some(axis) => {
            let outer = if result_shape == remove_axis(&source_shape, axis) {
                result_mask
            } else {
                result_mask.reduce_axis(axis, any_lane)?
            };
            expand_along_axis(&outer, &source_shape, axis)?
        }
    };
    if let Some(source_path) = mask_to_path(source_mask) {
        paths.insert(source.id, source_path);
    }
    Ok(paths)
}
