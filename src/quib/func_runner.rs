//! Evaluation of a quib's function call, restricted to the part of the result a caller needs.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Instant,
};

use super::{
    handler::{QuibHandler, SourceValues},
    QuibId,
};
use crate::{
    cache::{create_cache, truncate_path_to_shallow, CacheStatus},
    config::CacheMode,
    func::ArgLeaf,
    path::{deep_get, Path, PathComponent},
    translation::{backwards_translate, ResultMetadata},
    value::Value,
    QuibError,
};

impl QuibHandler {
    /// The quib's value, guaranteed correct inside `path`. Outside of it the value may be stale.
    ///
    /// `None` asks for any value of the right shape: a cached result is returned as is unless
    /// nothing of it is valid.
    pub(crate) fn get_value_valid_at_path(self: &Arc<Self>, path: Option<&[PathComponent]>) -> Result<Value, QuibError> {
        let base = self.get_base_value(path)?;
        let overrider = self.overrider.lock();
        if overrider.is_empty() {
            return Ok(base);
        }
        overrider.override_value(&base, self.project.config().debug)
    }

    fn get_base_value(self: &Arc<Self>, path: Option<&[PathComponent]>) -> Result<Value, QuibError> {
        if self.is_iquib() {
            return self.func_call().invoke_with(|leaf| match leaf {
                ArgLeaf::Value { value, .. } => Ok(value.clone()),
                ArgLeaf::Source { .. } => Err(QuibError::InvalidArgument("an iquib has no sources".to_string())),
            });
        }
        let cache_mode = self.props.read().cache_mode;
        if cache_mode == CacheMode::Off {
            let (result, _) = self.run_at(&[])?;
            *self.metadata.lock() = Some(ResultMetadata::of(&result));
            return Ok(result);
        }

        let requested: Path = match path {
            Some(path) => truncate_path_to_shallow(path),
            None => {
                if let Some(cache) = self.cache.lock().as_ref() {
                    if cache.get_cache_status() != CacheStatus::AllInvalid {
                        return Ok(cache.get_value().clone());
                    }
                }
                Vec::new()
            }
        };
        let uncached = match self.cache.lock().as_ref() {
            None => vec![requested.clone()],
            Some(cache) => cache.get_uncached_paths(&requested).unwrap_or_else(|err| {
                tracing::debug!("Recomputing {} at the requested path: {err}", self.label());
                vec![requested.clone()]
            }),
        };

        for uncached_path in uncached {
            let started = Instant::now();
            let (result, valid_path) = self.run_at(&uncached_path)?;
            let elapsed = started.elapsed();
            *self.metadata.lock() = Some(ResultMetadata::of(&result));
            if cache_mode == CacheMode::Auto
                && elapsed.as_micros() < u128::from(self.project.config().auto_cache_min_micros)
            {
                *self.cache.lock() = None;
                return Ok(result);
            }
            self.store_result(&result, &valid_path);
        }

        self.cache
            .lock()
            .as_ref()
            .map(|cache| cache.get_value().clone())
            .ok_or_else(|| QuibError::CacheMismatch(format!("{} has no cache after evaluation", self.label())))
    }

    /// Keep the part of `result` valid at `valid_path`, rebuilding the cache when the result no
    /// longer fits it.
    fn store_result(&self, result: &Value, valid_path: &[PathComponent]) {
        let mut guard = self.cache.lock();
        if guard.as_ref().map_or(true, |cache| !cache.matches_result(result)) {
            if guard.is_some() {
                tracing::debug!("Rebuilding the cache of {}: the result changed structure", self.label());
            }
            *guard = Some(create_cache(result));
        }
        let shallow = truncate_path_to_shallow(valid_path);
        let stored = match guard.as_mut() {
            Some(cache) => deep_get(result, &shallow).and_then(|valid| cache.set_valid_value_at_path(&shallow, &valid)),
            None => Ok(()),
        };
        if let Err(err) = stored {
            tracing::debug!("Could not store the result of {}: {err}", self.label());
            *guard = Some(create_cache(result));
        }
    }

    /// Run the function with each source fetched at the path it contributes to `path`.
    /// Returns the result and the path at which it is valid; when the sources cannot be
    /// narrowed, they are fetched whole and the whole result is valid.
    pub(crate) fn run_at(self: &Arc<Self>, path: &[PathComponent]) -> Result<(Value, Path), QuibError> {
        let func_call = self.func_call();
        let parameter_ids: BTreeSet<QuibId> = func_call.get_parameter_sources().iter().map(|quib| quib.id()).collect();
        let source_paths = if path.is_empty() {
            None
        } else {
            let source_call = self.source_func_call(SourceValues::Shaped)?;
            let metadata = self.metadata.lock().clone();
            match backwards_translate(&source_call, path, metadata.as_ref()) {
                Ok(source_paths) => Some(source_paths),
                Err(err) => {
                    tracing::debug!("Evaluating all of {}: {err}", self.label());
                    None
                }
            }
        };
        let valid_path = if source_paths.is_some() { path.to_vec() } else { Vec::new() };

        let mut values: BTreeMap<QuibId, Value> = BTreeMap::new();
        for source in func_call.sources() {
            let id = source.id();
            if values.contains_key(&id) {
                continue;
            }
            let source_path = if parameter_ids.contains(&id) {
                Some(Vec::new())
            } else {
                match &source_paths {
                    None => Some(Vec::new()),
                    Some(paths) => paths.get(&id).cloned(),
                }
            };
            values.insert(id, source.0.get_value_valid_at_path(source_path.as_deref())?);
        }

        let result = func_call.invoke_with(|leaf| match leaf {
            ArgLeaf::Source { source, .. } => values
                .get(&source.id())
                .cloned()
                .ok_or_else(|| QuibError::NotFound(format!("value of quib {}", source.id()))),
            ArgLeaf::Value { value, .. } => Ok(value.clone()),
        })?;
        tracing::trace!("Evaluated {} at {}", self.label(), crate::path::path_repr(path));
        Ok((result, valid_path))
    }
}
