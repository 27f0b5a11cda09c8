use super::{CacheStatus, ShallowCache};
use crate::{
    path::{deep_assign_data_in_path, PathComponent, Paths},
    value::Value,
    QuibError,
};

/// Cache for opaque values: any invalidation invalidates everything.
#[derive(Debug, Clone)]
pub struct WholeCache {
    value: Value,
    valid: bool,
}

impl WholeCache {
    pub fn new(value: Value) -> WholeCache {
        WholeCache { value, valid: false }
    }
}

impl ShallowCache for WholeCache {
    fn matches_result(&self, result: &Value) -> bool {
        self.value.kind() == result.kind()
    }

    fn get_value(&self) -> &Value {
        &self.value
    }

    fn set_valid_value_at_path(&mut self, path: &[PathComponent], value: &Value) -> Result<(), QuibError> {
        self.value = deep_assign_data_in_path(&self.value, path, value, true)?;
        if path.is_empty() {
            self.valid = true;
        }
        Ok(())
    }

    fn set_invalid_at_path(&mut self, _path: &[PathComponent]) -> Result<(), QuibError> {
        self.valid = false;
        Ok(())
    }

    fn get_uncached_paths(&self, _path: &[PathComponent]) -> Result<Paths, QuibError> {
        if self.valid {
            Ok(Vec::new())
        } else {
            Ok(vec![Vec::new()])
        }
    }

    fn get_cache_status(&self) -> CacheStatus {
        if self.valid {
            CacheStatus::AllValid
        } else {
            CacheStatus::AllInvalid
        }
    }
}
