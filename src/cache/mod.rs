//! Shallow, path-aware result caches.
//!
//! A cache holds the last computed value of a quib together with a validity mask aligned to
//! the value's structure. Only the first component of a path is considered when marking or
//! querying validity ("shallow"), which is enough to avoid recomputing a whole array when a
//! single element, field or key changed.
//!
//! The variants are chosen by [`create_cache`] from the shape of the result:
//! - [`WholeCache`]: opaque values, a single valid/invalid flag
//! - [`NdCache`]: numeric arrays, one flag per element
//! - [`FieldCache`]: record arrays, one element mask per field
//! - [`KeyedCache`]: lists, tuples and dicts, one flag per item or key

pub mod field;
pub mod keyed;
pub mod nd;
pub mod whole;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use field::FieldCache;
pub use keyed::KeyedCache;
pub use nd::NdCache;
pub use whole::WholeCache;

use crate::{
    path::{Path, PathComponent, Paths},
    value::Value,
    QuibError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheStatus {
    AllValid,
    AllInvalid,
    Partial,
}

impl CacheStatus {
    pub(crate) fn from_counts(invalid: usize, total: usize) -> CacheStatus {
        if invalid == 0 {
            CacheStatus::AllValid
        } else if invalid == total {
            CacheStatus::AllInvalid
        } else {
            CacheStatus::Partial
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            CacheStatus::AllValid => "ALL_VALID",
            CacheStatus::AllInvalid => "ALL_INVALID",
            CacheStatus::Partial => "PARTIAL",
        };
        write!(f, "{status}")
    }
}

pub trait ShallowCache: fmt::Debug + Send + Sync {
    /// Whether `result` can be stored in this cache: same kind, shape, fields or keys.
    fn matches_result(&self, result: &Value) -> bool;

    fn get_value(&self) -> &Value;

    /// Store `value` at `path` and mark the region it addresses as valid.
    fn set_valid_value_at_path(&mut self, path: &[PathComponent], value: &Value) -> Result<(), QuibError>;

    fn set_invalid_at_path(&mut self, path: &[PathComponent]) -> Result<(), QuibError>;

    /// The minimal paths whose union is the invalid part of the region addressed by `path`.
    /// Empty when everything requested is valid.
    fn get_uncached_paths(&self, path: &[PathComponent]) -> Result<Paths, QuibError>;

    fn get_cache_status(&self) -> CacheStatus;
}

/// Build an entirely-invalid cache shaped after `result`.
pub fn create_cache(result: &Value) -> Box<dyn ShallowCache> {
    match result {
        Value::Array(array) => Box::new(NdCache::new(array.clone())),
        Value::Record(record) => Box::new(FieldCache::new(record.clone())),
        Value::List(_) | Value::Tuple(_) | Value::Dict(_) => Box::new(KeyedCache::new(result.clone())),
        other => Box::new(WholeCache::new(other.clone())),
    }
}

/// The paths stored by a shallow cache only ever need their first component.
pub fn truncate_path_to_shallow(path: &[PathComponent]) -> Path {
    path.iter().take(1).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        path::{array_path, Index},
        value::NdArray,
    };

    #[test]
    fn test_create_cache_picks_variant() {
        let cache = create_cache(&Value::from_vec(vec![1.0, 2.0]));
        assert!(cache.matches_result(&Value::from_vec(vec![3.0, 4.0])));
        assert!(!cache.matches_result(&Value::Float(1.0)));
        assert_eq!(cache.get_cache_status(), CacheStatus::AllInvalid);
    }

    #[test]
    fn test_invalidation_is_idempotent() {
        let mut cache = create_cache(&Value::Array(NdArray::arange(&[4])));
        cache
            .set_valid_value_at_path(&[], &Value::Array(NdArray::arange(&[4])))
            .unwrap();
        let path = array_path([Index::Int(2)]);
        cache.set_invalid_at_path(&path).unwrap();
        let once = cache.get_uncached_paths(&[]).unwrap();
        cache.set_invalid_at_path(&path).unwrap();
        assert_eq!(cache.get_uncached_paths(&[]).unwrap(), once);
        assert_eq!(cache.get_cache_status(), CacheStatus::Partial);
    }
}
