//! Translation for functions that only move elements around.
//!
//! The call is re-run on marker arrays instead of the real data: once with every data source
//! replaced by an array filled with that source's marker id (constant data arguments become
//! `-1`), giving the contributing source of each result element, and once per source with the
//! source replaced by `arange` over its shape, giving the position in the source each result
//! element was taken from. Intersecting the two answers both directions of translation.
//!
//! `getitem` on records, lists and dicts cannot run on numeric markers and is handled
//! structurally.

use super::{
    data_source, mask_at_first_component, mask_to_path, mask_to_paths, unique_data_sources, Source,
    SourceFuncCall, SourceId, SourcePaths,
};
use crate::{
    func::ArgLeaf,
    path::{Index, Path, PathComponent, Paths},
    value::{ndarray::slice_indices, NdArray, Value, ValueKind},
    QuibError,
};

const CONSTANT_MARKER: f64 = -1.0;

/// Which element of which source each result element comes from.
pub struct TranspositionMaps {
    /// Marker id of the contributing source per result element.
    pub ids: NdArray<f64>,
    pub sources: Vec<SourceMap>,
}

pub struct SourceMap {
    pub id: SourceId,
    pub marker: f64,
    pub shape: Vec<usize>,
    /// Flat position in the source per result element (meaningful where `ids == marker`).
    pub positions: NdArray<f64>,
}

impl TranspositionMaps {
    pub fn build(func_call: &SourceFuncCall) -> Result<TranspositionMaps, QuibError> {
        let sources = unique_data_sources(func_call);
        let markers: Vec<(SourceId, f64)> = sources
            .iter()
            .enumerate()
            .map(|(number, source)| (source.id, number as f64 + 1.0))
            .collect();
        let marker_of = |id: SourceId| {
            markers
                .iter()
                .find(|(source_id, _)| *source_id == id)
                .map(|(_, marker)| *marker)
                .unwrap_or(CONSTANT_MARKER)
        };
        let ids = run_on_markers(func_call, |source| {
            Ok(filled(&source.shape()?, marker_of(source.id)))
        })?;
        let mut maps = Vec::with_capacity(sources.len());
        for source in sources {
            let positions = run_on_markers(func_call, |other| {
                let shape = other.shape()?;
                if other.id == source.id {
                    Ok(Value::from_ndarray(NdArray::arange(&shape)))
                } else {
                    Ok(filled(&shape, CONSTANT_MARKER))
                }
            })?;
            maps.push(SourceMap {
                id: source.id,
                marker: marker_of(source.id),
                shape: source.shape()?,
                positions,
            });
        }
        Ok(TranspositionMaps { ids, sources: maps })
    }

    pub fn result_shape(&self) -> &[usize] {
        self.ids.shape()
    }

    pub fn source(&self, id: SourceId) -> Option<&SourceMap> {
        self.sources.iter().find(|map| map.id == id)
    }

    /// `(result flat position, source flat position)` pairs of `map` within `result_mask`.
    pub fn pairs<'a>(&'a self, map: &'a SourceMap, result_mask: &'a NdArray<bool>) -> impl Iterator<Item = (usize, usize)> + 'a {
        result_mask.true_positions().into_iter().filter_map(move |flat| {
            let from_source = self.ids.get_flat(flat).is_some_and(|id| *id == map.marker);
            from_source
                .then(|| map.positions.get_flat(flat).map(|position| (flat, *position as usize)))
                .flatten()
        })
    }
}

fn filled(shape: &[usize], marker: f64) -> Value {
    Value::from_ndarray(NdArray::full(shape, marker))
}

fn run_on_markers<F>(func_call: &SourceFuncCall, mut marker: F) -> Result<NdArray<f64>, QuibError>
where
    F: FnMut(&Source) -> Result<Value, QuibError>,
{
    let result = func_call.invoke_with(|leaf| match leaf {
        ArgLeaf::Source { source, is_data: true, .. } => marker(source),
        ArgLeaf::Source { source, .. } => Ok(source.value.clone()),
        ArgLeaf::Value { value, is_data: true } => match value.shape() {
            Some(shape) if value.is_numeric_array_like() => Ok(filled(&shape, CONSTANT_MARKER)),
            _ => Ok(value.clone()),
        },
        ArgLeaf::Value { value, .. } => Ok(value.clone()),
    })?;
    result
        .to_array()
        .map_err(|err| QuibError::NoTranslator(format!("{}: {err}", func_call.func.name)))
}

/// A `getitem` call whose data is a record, list, tuple or dict.
pub(crate) struct StructuredGetItem<'a> {
    pub data: &'a Source,
    pub index: Index,
}

impl<'a> StructuredGetItem<'a> {
    pub fn detect(func_call: &'a SourceFuncCall) -> Result<Option<StructuredGetItem<'a>>, QuibError> {
        if func_call.func.name != "getitem" {
            return Ok(None);
        }
        let Some(data) = func_call.get_data_sources().into_iter().next() else {
            return Ok(None);
        };
        if !matches!(
            data.value.kind(),
            ValueKind::Record | ValueKind::List | ValueKind::Tuple | ValueKind::Dict
        ) {
            return Ok(None);
        }
        let (args, _) = super::resolve_values(func_call)?;
        let index = args
            .get(1)
            .ok_or_else(|| QuibError::InvalidArgument("getitem() missing its index".to_string()))
            .and_then(Index::from_value)?;
        Ok(Some(StructuredGetItem { data, index }))
    }

    fn kind(&self) -> ValueKind {
        self.data.value.kind()
    }

    fn component(&self) -> PathComponent {
        PathComponent::new(self.index.clone(), self.kind())
    }

    fn len(&self) -> usize {
        self.data.value.len().unwrap_or(0)
    }

    /// Positions of a sequence selected by `index`, `None` for indices that select one item.
    fn sequence_positions(&self, index: &Index) -> Result<Vec<usize>, QuibError> {
        let len = self.len();
        let normalize = |i: i64| {
            let resolved = if i < 0 { i + len as i64 } else { i };
            (0..len as i64)
                .contains(&resolved)
                .then_some(resolved as usize)
                .ok_or_else(|| QuibError::InvalidIndex(format!("index {i} out of range")))
        };
        match index {
            Index::Int(i) => Ok(vec![normalize(*i)?]),
            Index::Slice(slice) => slice_indices(slice, len),
            Index::Ints(list) => list.iter().map(|i| normalize(*i)).collect(),
            Index::All | Index::Ellipsis => Ok((0..len).collect()),
            other => Err(QuibError::NoTranslator(format!("getitem with {other} on a sequence"))),
        }
    }

    fn forwards(&self, path: &[PathComponent]) -> Result<Paths, QuibError> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(vec![Vec::new()]);
        };
        let rest = rest.to_vec();
        match self.kind() {
            ValueKind::Record => match (&self.index, &first.component) {
                (Index::Field(selected), Index::Field(changed)) => {
                    Ok(if selected == changed { vec![rest] } else { Vec::new() })
                }
                (Index::Field(_), _) => Ok(vec![vec![PathComponent::array(first.component.clone())]]),
                (_, Index::Field(changed)) => {
                    let mut paths = self.element_forwards(&rest)?;
                    for path in paths.iter_mut() {
                        path.insert(0, PathComponent::field(changed));
                    }
                    Ok(paths)
                }
                _ => self.element_forwards(path),
            },
            ValueKind::Dict => match (&self.index, &first.component) {
                (Index::Field(selected), Index::Field(changed)) => {
                    Ok(if selected == changed { vec![rest] } else { Vec::new() })
                }
                _ => Ok(vec![Vec::new()]),
            },
            _ => {
                let selected = self.sequence_positions(&self.index)?;
                let changed = self.sequence_positions(&first.component)?;
                if matches!(self.index, Index::Int(_)) {
                    return Ok(if changed.contains(&selected[0]) { vec![rest] } else { Vec::new() });
                }
                Ok(selected
                    .iter()
                    .enumerate()
                    .filter(|(_, position)| changed.contains(position))
                    .map(|(result_position, _)| {
                        let mut path = vec![PathComponent::new(Index::Int(result_position as i64), self.kind())];
                        path.extend(rest.iter().cloned());
                        path
                    })
                    .collect())
            }
        }
    }

    /// Element translation of a non-field index applied to a record.
    fn element_forwards(&self, element_path: &[PathComponent]) -> Result<Paths, QuibError> {
        let shape = self.data.shape()?;
        let source_mask = mask_at_first_component(&shape, element_path)?;
        let result_mask = self.result_mask_for(&source_mask)?;
        Ok(mask_to_paths(result_mask))
    }

    fn result_mask_for(&self, source_mask: &NdArray<bool>) -> Result<NdArray<bool>, QuibError> {
        let positions = NdArray::arange(source_mask.shape()).get_at(&self.index)?;
        Ok(positions.map(|position| source_mask.get_flat(*position as usize).copied().unwrap_or(false)))
    }

    pub fn backwards(&self, path: &[PathComponent]) -> Result<Path, QuibError> {
        match (self.kind(), &self.index) {
            (ValueKind::Record, Index::Field(_)) | (ValueKind::Dict, _) => {
                let mut source_path = vec![self.component()];
                source_path.extend(path.iter().cloned());
                Ok(source_path)
            }
            (ValueKind::Record, _) => {
                let (prefix, element_path) = match path.split_first() {
                    Some((first, rest)) if first.references_field_in_field_array() => (Some(first.clone()), rest),
                    _ => (None, path),
                };
                let shape = self.data.shape()?;
                let positions = NdArray::arange(&shape).get_at(&self.index)?;
                let result_mask = mask_at_first_component(positions.shape(), element_path)?;
                let mut source_mask = NdArray::full(&shape, false);
                for flat in result_mask.true_positions() {
                    if let Some(position) = positions.get_flat(flat) {
                        source_mask.set_flat(*position as usize, true);
                    }
                }
                let mut source_path: Path = prefix.into_iter().collect();
                source_path.extend(mask_to_path(source_mask).unwrap_or_default());
                Ok(source_path)
            }
            (_, Index::Int(_)) => {
                let mut source_path = vec![self.component()];
                source_path.extend(path.iter().cloned());
                Ok(source_path)
            }
            _ => {
                let selected = self.sequence_positions(&self.index)?;
                match path.split_first() {
                    Some((PathComponent { component: Index::Int(i), .. }, rest)) => {
                        let resolved = if *i < 0 { *i + selected.len() as i64 } else { *i };
                        let position = selected.get(resolved as usize).ok_or_else(|| {
                            QuibError::InvalidIndex(format!("index {i} out of range"))
                        })?;
                        let mut source_path = vec![PathComponent::new(Index::Int(*position as i64), self.kind())];
                        source_path.extend(rest.iter().cloned());
                        Ok(source_path)
                    }
                    _ => Ok(vec![self.component()]),
                }
            }
        }
    }
}

pub fn forwards(func_call: &SourceFuncCall, source_id: SourceId, path: &[PathComponent]) -> Result<Paths, QuibError> {
    if let Some(getitem) = StructuredGetItem::detect(func_call)? {
        return getitem.forwards(path);
    }
    let maps = TranspositionMaps::build(func_call)?;
    let source = data_source(func_call, source_id)?;
    let map = maps
        .source(source.id)
        .ok_or_else(|| QuibError::NoTranslator(format!("no marker for source {source_id}")))?;
    let source_mask = mask_at_first_component(&map.shape, path)?;
    let all_results = NdArray::full(maps.result_shape(), true);
    let mut result_mask = NdArray::full(maps.result_shape(), false);
    for (result_flat, source_flat) in maps.pairs(map, &all_results) {
        if source_mask.get_flat(source_flat).copied().unwrap_or(false) {
            result_mask.set_flat(result_flat, true);
        }
    }
    Ok(mask_to_paths(result_mask))
}

pub fn backwards(func_call: &SourceFuncCall, path: &[PathComponent]) -> Result<SourcePaths, QuibError> {
    if let Some(getitem) = StructuredGetItem::detect(func_call)? {
        return Ok(SourcePaths::from([(getitem.data.id, getitem.backwards(path)?)]));
    }
    let maps = TranspositionMaps::build(func_call)?;
    let result_mask = mask_at_first_component(maps.result_shape(), path)?;
    let mut paths = SourcePaths::new();
    for map in &maps.sources {
        let mut source_mask = NdArray::full(&map.shape, false);
        for (_, source_flat) in maps.pairs(map, &result_mask) {
            source_mask.set_flat(source_flat, true);
        }
        if let Some(source_path) = mask_to_path(source_mask) {
            paths.insert(map.id, source_path);
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        func::{Arg, FuncCall, FUNCTION_REGISTRY},
        path::{array_path, SliceIndex},
        value::FieldArray,
    };
    use std::collections::BTreeMap;

    fn concatenated() -> SourceFuncCall {
        let first = Source::new(1, Value::array(vec![1, 3], vec![1.0, 2.0, 3.0]).unwrap());
        let second = Source::new(2, Value::array(vec![1, 3], vec![8.0, 12.0, 14.0]).unwrap());
        FuncCall::new(
            FUNCTION_REGISTRY.get("concatenate").unwrap(),
            vec![Arg::List(vec![Arg::Source(first), Arg::Source(second)])],
            BTreeMap::new(),
        )
    }

    fn getitem(data: Value, index: Index) -> SourceFuncCall {
        FuncCall::new(
            FUNCTION_REGISTRY.get("getitem").unwrap(),
            vec![Arg::Source(Source::new(1, data)), Arg::Value(index.to_value())],
            BTreeMap::new(),
        )
    }

    fn mask_positions(path: &Path) -> Vec<usize> {
        match &path[0].component {
            Index::Mask(mask) => mask.true_positions(),
            other => panic!("expected mask, got {other}"),
        }
    }

    #[test]
    fn test_concatenate_forward_hits_own_block_only() {
        let paths = forwards(&concatenated(), 2, &array_path([Index::Tuple(vec![Index::Int(0), Index::Int(1)])])).unwrap();
        assert_eq!(mask_positions(&paths[0]), vec![4]);
    }

    #[test]
    fn test_concatenate_backward_partitions_result() {
        let paths = backwards(&concatenated(), &array_path([Index::Tuple(vec![Index::Int(0), Index::Int(0)])])).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(mask_positions(&paths[&1]), vec![0]);
    }

    #[test]
    fn test_getitem_slice_forward() {
        let call = getitem(Value::Array(NdArray::arange(&[5])), Index::Slice(SliceIndex::range(1, 4)));
        let paths = forwards(&call, 1, &array_path([Index::Int(3)])).unwrap();
        assert_eq!(mask_positions(&paths[0]), vec![2]);
        assert!(forwards(&call, 1, &array_path([Index::Int(4)])).unwrap().is_empty());
    }

    #[test]
    fn test_getitem_record_field() {
        let record = FieldArray::new(vec![
            ("x".to_string(), NdArray::from_vec(vec![1.0, 2.0])),
            ("y".to_string(), NdArray::from_vec(vec![3.0, 4.0])),
        ])
        .unwrap();
        let call = getitem(Value::Record(record), Index::Field("y".to_string()));
        assert!(forwards(&call, 1, &[PathComponent::field("x")]).unwrap().is_empty());
        assert_eq!(
            forwards(&call, 1, &[PathComponent::field("y"), PathComponent::array(Index::Int(1))]).unwrap(),
            vec![vec![PathComponent::array(Index::Int(1))]]
        );
        let source_paths = backwards(&call, &array_path([Index::Int(0)])).unwrap();
        assert_eq!(
            source_paths[&1],
            vec![PathComponent::field("y"), PathComponent::array(Index::Int(0))]
        );
    }

    #[test]
    fn test_getitem_list_item() {
        let list = Value::list([Value::Int(1), Value::from_vec(vec![2.0, 3.0])]);
        let call = getitem(list, Index::Int(1));
        assert!(forwards(&call, 1, &[PathComponent::item(0)]).unwrap().is_empty());
        assert_eq!(forwards(&call, 1, &[PathComponent::item(-1)]).unwrap(), vec![Vec::new()]);
    }
}
