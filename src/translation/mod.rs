//! Forward and backward path translation.
//!
//! Forward translation maps a changed region of one source to the affected region of a call's
//! result. Backward translation maps a region of the result to the regions of the data sources
//! it was computed from. Both run on a [`SourceFuncCall`]: the call with every source replaced
//! by a [`Source`] carrying its id and current value, so the same algorithms serve the quib
//! graph and synthetic calls.
//!
//! Translators are chosen by [`FunctionCategory`]. Some need the shape and kind of the result
//! ([`ResultMetadata`]); they are first tried without it, then with it, and when both attempts
//! fail the whole result is reported as affected.

pub mod axiswise;
pub mod elementwise;
pub mod transpositional;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    func::{ArgLeaf, FuncCall, FunctionCategory},
    path::{Path, PathComponent, Paths},
    value::{NdArray, Value, ValueKind},
    QuibError,
};

pub type SourceId = u64;

/// A source as seen by the translators.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: SourceId,
    pub value: Value,
    /// Ids of this source and everything upstream of it.
    pub ancestors: BTreeSet<SourceId>,
}

impl Source {
    pub fn new(id: SourceId, value: Value) -> Source {
        Source {
            id,
            value,
            ancestors: BTreeSet::from([id]),
        }
    }

    pub fn shape(&self) -> Result<Vec<usize>, QuibError> {
        self.value
            .shape()
            .ok_or_else(|| QuibError::NoTranslator(format!("source of kind {} has no shape", self.value.kind())))
    }
}

pub type SourceFuncCall = FuncCall<Source>;

/// Shape and kind of a call's last result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub shape: Option<Vec<usize>>,
    pub kind: ValueKind,
}

impl ResultMetadata {
    pub fn of(value: &Value) -> ResultMetadata {
        ResultMetadata {
            shape: value.shape(),
            kind: value.kind(),
        }
    }

    /// A zero-filled value with this shape and kind, for translators that only look at the
    /// structure of a source. `None` for kinds whose structure metadata does not capture.
    pub fn placeholder(&self) -> Option<Value> {
        match (self.kind, self.shape.as_deref()) {
            (ValueKind::Array, Some(shape)) => Some(Value::Array(NdArray::full(shape, 0.0))),
            (ValueKind::Float, _) => Some(Value::Float(0.0)),
            (ValueKind::Int, _) => Some(Value::Int(0)),
            (ValueKind::Bool, _) => Some(Value::Bool(false)),
            _ => None,
        }
    }
}

/// Source-id to the path of that source a result region depends on. Sources absent from the
/// map are not needed beyond their shape.
pub type SourcePaths = BTreeMap<SourceId, Path>;

pub(crate) fn is_data_source(func_call: &SourceFuncCall, source_id: SourceId) -> bool {
    func_call.get_data_sources().iter().any(|source| source.id == source_id)
}

pub(crate) fn data_source(func_call: &SourceFuncCall, source_id: SourceId) -> Result<&Source, QuibError> {
    func_call
        .get_data_sources()
        .into_iter()
        .find(|source| source.id == source_id)
        .ok_or_else(|| QuibError::NotFound(format!("source {source_id} is not a data source of {}", func_call.func.name)))
}

/// Data sources without repetitions, in call order.
pub(crate) fn unique_data_sources(func_call: &SourceFuncCall) -> Vec<&Source> {
    let mut seen = BTreeSet::new();
    func_call
        .get_data_sources()
        .into_iter()
        .filter(|source| seen.insert(source.id))
        .collect()
}

/// Resolve every argument to its current value.
pub(crate) fn resolve_values(func_call: &SourceFuncCall) -> Result<(Vec<Value>, BTreeMap<String, Value>), QuibError> {
    func_call.resolve_args(|leaf| match leaf {
        ArgLeaf::Source { source, .. } => Ok(source.value.clone()),
        ArgLeaf::Value { value, .. } => Ok(value.clone()),
    })
}

/// Boolean mask of `shape` selected by the first component of `path` (everything for `[]`).
pub(crate) fn mask_at_first_component(shape: &[usize], path: &[PathComponent]) -> Result<NdArray<bool>, QuibError> {
    match path.first() {
        None => Ok(NdArray::full(shape, true)),
        Some(component) if component.is_whole() => Ok(NdArray::full(shape, true)),
        Some(component) => NdArray::mask_for_index(shape, &component.component)
            .map_err(|err| QuibError::NoTranslator(format!("cannot translate {component}: {err}"))),
    }
}

/// A result-region mask as paths: nothing, the whole (0-d) value, or a single mask component.
pub(crate) fn mask_to_paths(mask: NdArray<bool>) -> Paths {
    if !mask.any() {
        Vec::new()
    } else if mask.ndim() == 0 {
        vec![Vec::new()]
    } else {
        vec![vec![PathComponent::array(crate::path::Index::Mask(mask))]]
    }
}

pub(crate) fn mask_to_path(mask: NdArray<bool>) -> Option<Path> {
    mask_to_paths(mask).into_iter().next()
}

fn forwards_translate_with(
    func_call: &SourceFuncCall,
    source_id: SourceId,
    path: &[PathComponent],
    metadata: Option<&ResultMetadata>,
) -> Result<Paths, QuibError> {
    match func_call.func.category {
        FunctionCategory::Elementwise => elementwise::forwards(func_call, source_id, path, metadata),
        FunctionCategory::Transpositional => transpositional::forwards(func_call, source_id, path),
        // a change to the source may change its shape
        FunctionCategory::ShapeOnly => Ok(vec![Vec::new()]),
        FunctionCategory::AxisWise => axiswise::forwards(func_call, source_id, path, metadata),
        FunctionCategory::Custom => Err(QuibError::NoTranslator(func_call.func.name.clone())),
    }
}

/// Paths of the result affected by a change of `source_id` at `path`.
///
/// Never fails: when no translator applies, the whole result (`[[]]`) is affected.
pub fn forwards_translate(
    func_call: &SourceFuncCall,
    source_id: SourceId,
    path: &[PathComponent],
    metadata: Option<&ResultMetadata>,
) -> Paths {
    if path.is_empty() || !is_data_source(func_call, source_id) {
        return vec![Vec::new()];
    }
    let attempt = match forwards_translate_with(func_call, source_id, path, None) {
        Err(QuibError::NeedsShapeAndType) => match metadata {
            Some(metadata) => forwards_translate_with(func_call, source_id, path, Some(metadata)),
            None => Err(QuibError::NeedsShapeAndType),
        },
        other => other,
    };
    attempt.unwrap_or_else(|err| {
        tracing::debug!(
            "Invalidating all of {} after a change to source {source_id}: {err}",
            func_call.func.name
        );
        vec![Vec::new()]
    })
}

fn backwards_translate_with(
    func_call: &SourceFuncCall,
    path: &[PathComponent],
    metadata: Option<&ResultMetadata>,
) -> Result<SourcePaths, QuibError> {
    match func_call.func.category {
        FunctionCategory::Elementwise => elementwise::backwards(func_call, path),
        FunctionCategory::Transpositional => transpositional::backwards(func_call, path),
        FunctionCategory::ShapeOnly => Ok(SourcePaths::new()),
        FunctionCategory::AxisWise => axiswise::backwards(func_call, path, metadata),
        FunctionCategory::Custom => Err(QuibError::NoTranslator(func_call.func.name.clone())),
    }
}

/// For each data source, the path needed to compute the result at `path`.
pub fn backwards_translate(
    func_call: &SourceFuncCall,
    path: &[PathComponent],
    metadata: Option<&ResultMetadata>,
) -> Result<SourcePaths, QuibError> {
    match backwards_translate_with(func_call, path, None) {
        Err(QuibError::NeedsShapeAndType) => match metadata {
            Some(metadata) => backwards_translate_with(func_call, path, Some(metadata)),
            None => Err(QuibError::NeedsShapeAndType),
        },
        other => other,
    }
}
