use super::{CacheStatus, ShallowCache};
use crate::{
    path::{deep_assign_data_in_path, Index, PathComponent, Paths},
    value::{NdArray, Value},
    QuibError,
};

/// Element-wise validity over a numeric array.
#[derive(Debug, Clone)]
pub struct NdCache {
    value: Value,
    invalid_mask: NdArray<bool>,
}

impl NdCache {
    pub fn new(array: NdArray<f64>) -> NdCache {
        let invalid_mask = NdArray::full(array.shape(), true);
        NdCache {
            value: Value::Array(array),
            invalid_mask,
        }
    }

    fn shape(&self) -> &[usize] {
        self.invalid_mask.shape()
    }

    /// Mask of the elements addressed by the first component of `path`.
    fn requested_mask(&self, path: &[PathComponent]) -> Result<NdArray<bool>, QuibError> {
        match path.first() {
            None => Ok(NdArray::full(self.shape(), true)),
            Some(component) => Ok(NdArray::mask_for_index(self.shape(), &component.component)
                .unwrap_or_else(|_| NdArray::full(self.shape(), true))),
        }
    }
}

impl ShallowCache for NdCache {
    fn matches_result(&self, result: &Value) -> bool {
        matches!(result, Value::Array(array) if array.shape() == self.shape())
    }

    fn get_value(&self) -> &Value {
        &self.value
    }

    fn set_valid_value_at_path(&mut self, path: &[PathComponent], value: &Value) -> Result<(), QuibError> {
        if path.is_empty() && !self.matches_result(value) {
            return Err(QuibError::CacheMismatch(format!(
                "array cache of shape {:?} cannot hold {}",
                self.shape(),
                value.kind()
            )));
        }
        self.value = deep_assign_data_in_path(&self.value, path, value, true)?;
        match path {
            [] => self.invalid_mask = NdArray::full(self.shape(), false),
            [component] => self.invalid_mask.fill_at(&component.component, false)?,
            // a deeper path only partially fills its first-level region
            _ => {}
        }
        Ok(())
    }

    fn set_invalid_at_path(&mut self, path: &[PathComponent]) -> Result<(), QuibError> {
        let Some(component) = path.first() else {
            self.invalid_mask = NdArray::full(self.shape(), true);
            return Ok(());
        };
        if let Err(err) = self.invalid_mask.fill_at(&component.component, true) {
            tracing::debug!("Invalidating whole array cache, {component} does not address it: {err}");
            self.invalid_mask = NdArray::full(self.shape(), true);
        }
        Ok(())
    }

    fn get_uncached_paths(&self, path: &[PathComponent]) -> Result<Paths, QuibError> {
        let uncached = self.invalid_mask.and(&self.requested_mask(path)?)?;
        if !uncached.any() {
            return Ok(Vec::new());
        }
        Ok(vec![vec![PathComponent::array(Index::Mask(uncached))]])
    }

    fn get_cache_status(&self) -> CacheStatus {
        CacheStatus::from_counts(self.invalid_mask.count(), self.invalid_mask.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{array_path, SliceIndex};

    #[test]
    fn test_uncached_paths_are_a_single_mask() {
        let mut cache = NdCache::new(NdArray::arange(&[2, 3]));
        cache
            .set_valid_value_at_path(&[], &Value::Array(NdArray::arange(&[2, 3])))
            .unwrap();
        cache
            .set_invalid_at_path(&array_path([Index::Tuple(vec![Index::All, Index::Int(0)])]))
            .unwrap();
        let paths = cache.get_uncached_paths(&[]).unwrap();
        assert_eq!(paths.len(), 1);
        match &paths[0][0].component {
            Index::Mask(mask) => assert_eq!(mask.true_positions(), vec![0, 3]),
            other => panic!("expected mask, got {other}"),
        }
    }

    #[test]
    fn test_requested_region_already_valid() {
        let mut cache = NdCache::new(NdArray::arange(&[4]));
        let path = array_path([Index::Slice(SliceIndex::range(0, 2))]);
        cache
            .set_valid_value_at_path(&path, &Value::from_vec(vec![5.0, 6.0]))
            .unwrap();
        assert!(cache.get_uncached_paths(&path).unwrap().is_empty());
        assert_eq!(cache.get_uncached_paths(&[]).unwrap().len(), 1);
        assert_eq!(cache.get_cache_status(), CacheStatus::Partial);
    }

    #[test]
    fn test_invalid_index_invalidates_everything() {
        let mut cache = NdCache::new(NdArray::arange(&[3]));
        cache
            .set_valid_value_at_path(&[], &Value::Array(NdArray::arange(&[3])))
            .unwrap();
        cache.set_invalid_at_path(&array_path([Index::Int(10)])).unwrap();
        assert_eq!(cache.get_cache_status(), CacheStatus::AllInvalid);
    }
}
