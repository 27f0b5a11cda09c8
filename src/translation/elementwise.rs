use super::{
    data_source, mask_at_first_component, mask_to_path, mask_to_paths, resolve_values, unique_data_sources,
    ResultMetadata, SourceFuncCall, SourceId, SourcePaths,
};
use crate::{
    path::{PathComponent, Paths},
    value::{
        broadcast_all_shapes,
        ndarray::{broadcast_source_index, ravel, unravel},
        NdArray,
    },
    QuibError,
};

/// Broadcast the source's changed region to the result's shape.
pub fn forwards(
    func_call: &SourceFuncCall,
    source_id: SourceId,
    path: &[PathComponent],
    metadata: Option<&ResultMetadata>,
) -> Result<Paths, QuibError> {
    let result_shape = metadata
        .and_then(|metadata| metadata.shape.clone())
        .ok_or(QuibError::NeedsShapeAndType)?;
    let source_shape = data_source(func_call, source_id)?.shape()?;
    let source_mask = mask_at_first_component(&source_shape, path)?;
    let result_mask = source_mask
        .broadcast_to(&result_shape)
        .map_err(|err| QuibError::NoTranslator(format!("{}: {err}", func_call.func.name)))?;
    Ok(mask_to_paths(result_mask))
}

/// Shape every data argument broadcasts to.
pub fn result_shape(func_call: &SourceFuncCall) -> Result<Vec<usize>, QuibError> {
    let (args, _) = resolve_values(func_call)?;
    let shapes = args
        .iter()
        .map(|arg| {
            arg.shape()
                .ok_or_else(|| QuibError::NoTranslator(format!("argument of kind {} has no shape", arg.kind())))
        })
        .collect::<Result<Vec<_>, _>>()?;
    broadcast_all_shapes(shapes.iter().map(Vec::as_slice))
}

/// Collapse a result-shaped mask onto a source of `source_shape`: a source element is needed
/// when any result element it broadcasts to is.
pub fn reduce_mask_to_source(result_mask: &NdArray<bool>, source_shape: &[usize]) -> NdArray<bool> {
    let mut source_mask = NdArray::full(source_shape, false);
    for flat in result_mask.true_positions() {
        let result_index = unravel(flat, result_mask.shape());
        let source_index = broadcast_source_index(&result_index, source_shape);
        source_mask.set_flat(ravel(&source_index, source_shape), true);
    }
    source_mask
}

/// The same region on every data source, with broadcast axes collapsed back to index 0.
pub fn backwards(func_call: &SourceFuncCall, path: &[PathComponent]) -> Result<SourcePaths, QuibError> {
    let result_shape = result_shape(func_call)?;
    let result_mask = mask_at_first_component(&result_shape, path)?;
    let mut paths = SourcePaths::new();
    for source in unique_data_sources(func_call) {
        let source_mask = reduce_mask_to_source(&result_mask, &source.shape()?);
        if let Some(source_path) = mask_to_path(source_mask) {
            paths.insert(source.id, source_path);
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        func::{Arg, FuncCall, FUNCTION_REGISTRY},
        path::{array_path, Index},
        translation::Source,
        value::Value,
    };
    use std::collections::BTreeMap;

    fn broadcast_sum() -> SourceFuncCall {
        let a = Source::new(1, Value::array(vec![1, 3], vec![1.0, 2.0, 3.0]).unwrap());
        let b = Source::new(2, Value::array(vec![3, 1], vec![1.0, 2.0, 3.0]).unwrap());
        FuncCall::new(
            FUNCTION_REGISTRY.get("add").unwrap(),
            vec![Arg::Source(a), Arg::Source(b)],
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_forward_broadcasts_along_size_one_axis() {
        let call = broadcast_sum();
        let metadata = ResultMetadata {
            shape: Some(vec![3, 3]),
            kind: crate::value::ValueKind::Array,
        };
        let path = array_path([Index::Tuple(vec![Index::Int(0), Index::Int(0)])]);
        let paths = forwards(&call, 1, &path, Some(&metadata)).unwrap();
        match &paths[0][0].component {
            Index::Mask(mask) => assert_eq!(mask.true_positions(), vec![0, 3, 6]),
            other => panic!("expected mask, got {other}"),
        }
    }

    #[test]
    fn test_forward_needs_result_shape() {
        let path = array_path([Index::Int(0)]);
        assert_eq!(
            forwards(&broadcast_sum(), 1, &path, None),
            Err(QuibError::NeedsShapeAndType)
        );
    }

    #[test]
    fn test_backward_collapses_broadcast_axes() {
        let path = array_path([Index::Tuple(vec![Index::Int(2), Index::Int(1)])]);
        let paths = backwards(&broadcast_sum(), &path).unwrap();
        let mask_of = |id: SourceId| match &paths[&id][0].component {
            Index::Mask(mask) => mask.true_positions(),
            other => panic!("expected mask, got {other}"),
        };
        assert_eq!(mask_of(1), vec![1]);
        assert_eq!(mask_of(2), vec![2]);
    }
}
