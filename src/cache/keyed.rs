use std::collections::BTreeMap;

use super::{CacheStatus, ShallowCache};
use crate::{
    path::{deep_assign_data_in_path, Index, PathComponent, Paths},
    value::{ndarray::slice_indices, Value, ValueKind},
    QuibError,
};

/// Per-item validity of a list or tuple, per-key validity of a dict.
#[derive(Debug, Clone)]
pub struct KeyedCache {
    value: Value,
    invalid: Validity,
    /// Validity of the container as a whole, which is all an empty container has.
    whole_invalid: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Validity {
    Items(Vec<bool>),
    Keys(BTreeMap<String, bool>),
}

impl KeyedCache {
    pub fn new(value: Value) -> KeyedCache {
        let invalid = match &value {
            Value::Dict(map) => Validity::Keys(map.keys().map(|key| (key.clone(), true)).collect()),
            Value::List(items) | Value::Tuple(items) => Validity::Items(vec![true; items.len()]),
            _ => Validity::Items(Vec::new()),
        };
        KeyedCache {
            value,
            invalid,
            whole_invalid: true,
        }
    }

    fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    fn is_empty_container(&self) -> bool {
        match &self.invalid {
            Validity::Items(flags) => flags.is_empty(),
            Validity::Keys(flags) => flags.is_empty(),
        }
    }

    fn fill(&mut self, component: Option<&PathComponent>, invalid: bool) -> Result<(), QuibError> {
        if component.is_none_or(|component| component.component.is_whole()) {
            self.whole_invalid = invalid;
        }
        match (&mut self.invalid, component.map(|c| &c.component)) {
            (Validity::Items(flags), None) => flags.iter_mut().for_each(|flag| *flag = invalid),
            (Validity::Keys(flags), None) => flags.values_mut().for_each(|flag| *flag = invalid),
            (Validity::Items(flags), Some(index)) => {
                for position in item_positions(index, flags.len())? {
                    flags[position] = invalid;
                }
            }
            (Validity::Keys(flags), Some(Index::Field(key))) => match flags.get_mut(key) {
                Some(flag) => *flag = invalid,
                // a key stored after the cache was built
                None if !invalid => {
                    flags.insert(key.clone(), false);
                }
                None => {}
            },
            (Validity::Keys(flags), Some(index)) if index.is_whole() => {
                flags.values_mut().for_each(|flag| *flag = invalid)
            }
            (Validity::Keys(_), Some(index)) => {
                return Err(QuibError::InvalidIndex(format!("{index} cannot index a dict")))
            }
        }
        Ok(())
    }
}

fn item_positions(index: &Index, len: usize) -> Result<Vec<usize>, QuibError> {
    let normalize = |position: i64| {
        let resolved = if position < 0 { position + len as i64 } else { position };
        (0..len as i64)
            .contains(&resolved)
            .then_some(resolved as usize)
            .ok_or_else(|| QuibError::InvalidIndex(format!("index {position} out of range")))
    };
    match index {
        Index::All | Index::Ellipsis => Ok((0..len).collect()),
        Index::Int(position) => Ok(vec![normalize(*position)?]),
        Index::Slice(slice) => slice_indices(slice, len),
        Index::Ints(list) => list.iter().map(|p| normalize(*p)).collect(),
        Index::Mask(mask) if mask.ndim() == 1 && mask.len() == len => Ok(mask.true_positions()),
        Index::Tuple(items) => match items.first() {
            Some(first) => item_positions(first, len),
            None => Ok((0..len).collect()),
        },
        other => Err(QuibError::InvalidIndex(format!("{other} cannot index a sequence"))),
    }
}

impl ShallowCache for KeyedCache {
    fn matches_result(&self, result: &Value) -> bool {
        self.kind() == result.kind() && self.value.structurally_matches(result)
    }

    fn get_value(&self) -> &Value {
        &self.value
    }

    fn set_valid_value_at_path(&mut self, path: &[PathComponent], value: &Value) -> Result<(), QuibError> {
        if path.is_empty() && !self.matches_result(value) {
            return Err(QuibError::CacheMismatch(format!(
                "{} cache cannot hold {}",
                self.kind(),
                value.kind()
            )));
        }
        self.value = deep_assign_data_in_path(&self.value, path, value, true)?;
        if path.len() <= 1 {
            self.fill(path.first(), false)?;
        }
        Ok(())
    }

    fn set_invalid_at_path(&mut self, path: &[PathComponent]) -> Result<(), QuibError> {
        if let Err(err) = self.fill(path.first(), true) {
            tracing::debug!("Invalidating whole {} cache: {err}", self.kind());
            self.fill(None, true)?;
        }
        Ok(())
    }

    fn get_uncached_paths(&self, path: &[PathComponent]) -> Result<Paths, QuibError> {
        let kind = self.kind();
        if self.is_empty_container() {
            return Ok(if self.whole_invalid { vec![Vec::new()] } else { Vec::new() });
        }
        match &self.invalid {
            Validity::Items(flags) => {
                let requested = match path.first() {
                    Some(component) => item_positions(&component.component, flags.len())
                        .unwrap_or_else(|_| (0..flags.len()).collect()),
                    None => (0..flags.len()).collect(),
                };
                Ok(requested
                    .into_iter()
                    .filter(|position| flags[*position])
                    .map(|position| vec![PathComponent::new(Index::Int(position as i64), kind)])
                    .collect())
            }
            Validity::Keys(flags) => {
                let requested = match path.first().map(|component| &component.component) {
                    Some(Index::Field(key)) => Some(key),
                    _ => None,
                };
                Ok(flags
                    .iter()
                    .filter(|(key, invalid)| **invalid && requested.is_none_or(|wanted| wanted == *key))
                    .map(|(key, _)| vec![PathComponent::key(key)])
                    .collect())
            }
        }
    }

    fn get_cache_status(&self) -> CacheStatus {
        let (invalid, total) = match &self.invalid {
            Validity::Items(flags) => (flags.iter().filter(|f| **f).count(), flags.len()),
            Validity::Keys(flags) => (flags.values().filter(|f| **f).count(), flags.len()),
        };
        if total == 0 {
            return if self.whole_invalid {
                CacheStatus::AllInvalid
            } else {
                CacheStatus::AllValid
            };
        }
        CacheStatus::from_counts(invalid, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_items_tracked_separately() {
        let list = Value::list([Value::Int(1), Value::Int(2), Value::Int(3)]);
        let mut cache = KeyedCache::new(list.clone());
        cache.set_valid_value_at_path(&[], &list).unwrap();
        cache.set_invalid_at_path(&[PathComponent::item(-1)]).unwrap();
        let paths = cache.get_uncached_paths(&[]).unwrap();
        assert_eq!(paths, vec![vec![PathComponent::item(2)]]);
    }

    #[test]
    fn test_dict_key_invalidation() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        map.insert("b".to_string(), Value::Int(2));
        let dict = Value::Dict(map);
        let mut cache = KeyedCache::new(dict.clone());
        cache.set_valid_value_at_path(&[], &dict).unwrap();
        cache.set_invalid_at_path(&[PathComponent::key("b")]).unwrap();
        assert!(cache.get_uncached_paths(&[PathComponent::key("a")]).unwrap().is_empty());
        assert_eq!(
            cache.get_uncached_paths(&[]).unwrap(),
            vec![vec![PathComponent::key("b")]]
        );
    }

    #[test]
    fn test_empty_list_is_invalid_until_stored() {
        let empty = Value::List(Vec::new());
        let mut cache = KeyedCache::new(empty.clone());
        assert_eq!(cache.get_cache_status(), CacheStatus::AllInvalid);
        assert_eq!(cache.get_uncached_paths(&[]).unwrap(), vec![Vec::new()]);
        cache.set_valid_value_at_path(&[], &empty).unwrap();
        assert_eq!(cache.get_cache_status(), CacheStatus::AllValid);
        assert!(cache.get_uncached_paths(&[]).unwrap().is_empty());
        cache.set_invalid_at_path(&[]).unwrap();
        assert_eq!(cache.get_cache_status(), CacheStatus::AllInvalid);
    }

    #[test]
    fn test_unknown_key_invalidation_changes_nothing() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        let dict = Value::Dict(map);
        let mut cache = KeyedCache::new(dict.clone());
        cache.set_valid_value_at_path(&[], &dict).unwrap();
        cache.set_invalid_at_path(&[PathComponent::key("missing")]).unwrap();
        assert_eq!(cache.get_cache_status(), CacheStatus::AllValid);
        assert!(cache.get_uncached_paths(&[]).unwrap().is_empty());
    }
}
