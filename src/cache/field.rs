use super::{CacheStatus, ShallowCache};
use crate::{
    path::{deep_assign_data_in_path, Index, PathComponent, Paths},
    value::{FieldArray, NdArray, Value},
    QuibError,
};

/// Validity of a record array, tracked per field.
#[derive(Debug, Clone)]
pub struct FieldCache {
    value: Value,
    shape: Vec<usize>,
    invalid_masks: Vec<(String, NdArray<bool>)>,
}

impl FieldCache {
    pub fn new(record: FieldArray) -> FieldCache {
        let shape = record.shape().to_vec();
        let invalid_masks = record
            .field_names()
            .map(|name| (name.to_string(), NdArray::full(&shape, true)))
            .collect();
        FieldCache {
            value: Value::Record(record),
            shape,
            invalid_masks,
        }
    }

    fn fill_all(&mut self, invalid: bool) {
        for (_, mask) in self.invalid_masks.iter_mut() {
            *mask = NdArray::full(&self.shape, invalid);
        }
    }

    fn field_mask_mut(&mut self, name: &str) -> Result<&mut NdArray<bool>, QuibError> {
        self.invalid_masks
            .iter_mut()
            .find(|(field, _)| field == name)
            .map(|(_, mask)| mask)
            .ok_or_else(|| QuibError::InvalidIndex(format!("no field named '{name}'")))
    }

    /// Fill the region addressed by the first component of `path` with `invalid`.
    fn fill_at_path(&mut self, path: &[PathComponent], invalid: bool) -> Result<(), QuibError> {
        let Some(component) = path.first() else {
            self.fill_all(invalid);
            return Ok(());
        };
        match &component.component {
            Index::Field(name) => {
                let shape = self.shape.clone();
                let mask = self.field_mask_mut(name)?;
                match path.get(1) {
                    None => {
                        *mask = NdArray::full(&shape, invalid);
                        Ok(())
                    }
                    // `[field][elements]`, as returned by `get_uncached_paths`
                    Some(elements) if path.len() == 2 || invalid => {
                        if mask.fill_at(&elements.component, invalid).is_err() && invalid {
                            *mask = NdArray::full(&shape, true);
                        }
                        Ok(())
                    }
                    Some(_) => Ok(()),
                }
            }
            index => {
                for (_, mask) in self.invalid_masks.iter_mut() {
                    mask.fill_at(index, invalid)?;
                }
                Ok(())
            }
        }
    }
}

impl ShallowCache for FieldCache {
    fn matches_result(&self, result: &Value) -> bool {
        match (&self.value, result) {
            (Value::Record(cached), Value::Record(result)) => {
                cached.shape() == result.shape() && cached.same_fields(result)
            }
            _ => false,
        }
    }

    fn get_value(&self) -> &Value {
        &self.value
    }

    fn set_valid_value_at_path(&mut self, path: &[PathComponent], value: &Value) -> Result<(), QuibError> {
        if path.is_empty() && !self.matches_result(value) {
            return Err(QuibError::CacheMismatch(format!(
                "record cache of shape {:?} cannot hold {}",
                self.shape,
                value.kind()
            )));
        }
        self.value = deep_assign_data_in_path(&self.value, path, value, true)?;
        self.fill_at_path(path, false)
    }

    fn set_invalid_at_path(&mut self, path: &[PathComponent]) -> Result<(), QuibError> {
        if let Err(err) = self.fill_at_path(path, true) {
            tracing::debug!("Invalidating whole record cache: {err}");
            self.fill_all(true);
        }
        Ok(())
    }

    fn get_uncached_paths(&self, path: &[PathComponent]) -> Result<Paths, QuibError> {
        let requested_field = match path.first().map(|component| &component.component) {
            Some(Index::Field(name)) => Some(name.as_str()),
            _ => None,
        };
        let requested_elements = match path.first() {
            Some(component) if !component.component.is_field() => {
                NdArray::mask_for_index(&self.shape, &component.component)
                    .unwrap_or_else(|_| NdArray::full(&self.shape, true))
            }
            _ => NdArray::full(&self.shape, true),
        };
        let mut paths = Vec::new();
        for (name, mask) in &self.invalid_masks {
            if requested_field.is_some_and(|field| field != name) {
                continue;
            }
            let uncached = mask.and(&requested_elements)?;
            if uncached.any() {
                paths.push(vec![
                    PathComponent::field(name),
                    PathComponent::array(Index::Mask(uncached)),
                ]);
            }
        }
        Ok(paths)
    }

    fn get_cache_status(&self) -> CacheStatus {
        let invalid = self.invalid_masks.iter().map(|(_, mask)| mask.count()).sum();
        let total = self.invalid_masks.iter().map(|(_, mask)| mask.len()).sum();
        CacheStatus::from_counts(invalid, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::array_path;

    fn record() -> FieldArray {
        FieldArray::new(vec![
            ("x".to_string(), NdArray::from_vec(vec![1.0, 2.0, 3.0])),
            ("y".to_string(), NdArray::from_vec(vec![4.0, 5.0, 6.0])),
        ])
        .unwrap()
    }

    #[test]
    fn test_field_invalidation_narrows_to_field() {
        let mut cache = FieldCache::new(record());
        cache.set_valid_value_at_path(&[], &Value::Record(record())).unwrap();
        cache.set_invalid_at_path(&[PathComponent::field("y")]).unwrap();
        let paths = cache.get_uncached_paths(&[]).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0][0], PathComponent::field("y"));
        assert_eq!(cache.get_cache_status(), CacheStatus::Partial);
    }

    #[test]
    fn test_index_invalidation_spans_fields() {
        let mut cache = FieldCache::new(record());
        cache.set_valid_value_at_path(&[], &Value::Record(record())).unwrap();
        cache.set_invalid_at_path(&array_path([Index::Int(1)])).unwrap();
        let paths = cache.get_uncached_paths(&array_path([Index::Int(1)])).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(cache.get_uncached_paths(&array_path([Index::Int(0)])).unwrap().is_empty());
    }

    #[test]
    fn test_filling_uncached_paths_validates() {
        let mut cache = FieldCache::new(record());
        for path in cache.get_uncached_paths(&[]).unwrap() {
            let value = crate::path::deep_get(&Value::Record(record()), &path).unwrap();
            cache.set_valid_value_at_path(&path, &value).unwrap();
        }
        assert_eq!(cache.get_cache_status(), CacheStatus::AllValid);
        assert_eq!(cache.get_value(), &Value::Record(record()));
    }
}
