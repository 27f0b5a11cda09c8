use serde::{Deserialize, Serialize};

use super::ndarray::{shape_size, NdArray};
use crate::{path::Index, QuibError};

/// A structured ("record") array: named numeric fields sharing one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldArray {
    shape: Vec<usize>,
    fields: Vec<(String, NdArray<f64>)>,
}

impl FieldArray {
    pub fn new(fields: Vec<(String, NdArray<f64>)>) -> Result<FieldArray, QuibError> {
        let shape = fields
            .first()
            .map(|(_, array)| array.shape().to_vec())
            .ok_or_else(|| QuibError::InvalidArgument("a field array needs at least one field".to_string()))?;
        if let Some((name, array)) = fields.iter().find(|(_, array)| array.shape() != shape.as_slice()) {
            return Err(QuibError::InvalidArgument(format!(
                "field '{name}' has shape {:?}, expected {shape:?}",
                array.shape()
            )));
        }
        Ok(FieldArray { shape, fields })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        shape_size(&self.shape)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(field, _)| field == name)
    }

    pub fn field(&self, name: &str) -> Result<&NdArray<f64>, QuibError> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, array)| array)
            .ok_or_else(|| QuibError::InvalidIndex(format!("no field named '{name}'")))
    }

    pub fn set_field(&mut self, name: &str, values: &NdArray<f64>) -> Result<(), QuibError> {
        let shape = self.shape.clone();
        let field = self
            .fields
            .iter_mut()
            .find(|(field, _)| field == name)
            .map(|(_, array)| array)
            .ok_or_else(|| QuibError::InvalidIndex(format!("no field named '{name}'")))?;
        *field = values.broadcast_to(&shape)?;
        Ok(())
    }

    /// Apply a non-field index to every field.
    pub fn get_at(&self, index: &Index) -> Result<FieldArray, QuibError> {
        let fields = self
            .fields
            .iter()
            .map(|(name, array)| Ok((name.clone(), array.get_at(index)?)))
            .collect::<Result<Vec<_>, QuibError>>()?;
        let shape = fields
            .first()
            .map(|(_, array)| array.shape().to_vec())
            .unwrap_or_default();
        Ok(FieldArray { shape, fields })
    }

    /// Assign a record (matching field names) into the region selected by a non-field index.
    /// Either every field is written or, on error, none is.
    pub fn set_at(&mut self, index: &Index, values: &FieldArray) -> Result<(), QuibError> {
        let mut fields = self.fields.clone();
        for (name, array) in fields.iter_mut() {
            array.set_at(index, values.field(name)?)?;
        }
        self.fields = fields;
        Ok(())
    }

    /// Assign the same numeric values to every field within the region selected by `index`.
    pub fn set_all_fields_at(&mut self, index: &Index, values: &NdArray<f64>) -> Result<(), QuibError> {
        let mut fields = self.fields.clone();
        for (_, array) in fields.iter_mut() {
            array.set_at(index, values)?;
        }
        self.fields = fields;
        Ok(())
    }

    pub fn same_fields(&self, other: &FieldArray) -> bool {
        self.field_names().eq(other.field_names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> FieldArray {
        FieldArray::new(vec![
            ("x".to_string(), NdArray::from_vec(vec![1.0, 2.0])),
            ("y".to_string(), NdArray::from_vec(vec![3.0, 4.0])),
        ])
        .unwrap()
    }

    #[test]
    fn test_set_at_writes_every_field() {
        let mut record = points();
        let values = FieldArray::new(vec![
            ("x".to_string(), NdArray::from_vec(vec![9.0])),
            ("y".to_string(), NdArray::from_vec(vec![8.0])),
        ])
        .unwrap();
        record.set_at(&Index::Int(1), &values).unwrap();
        assert_eq!(record.field("x").unwrap().data(), &[1.0, 9.0]);
        assert_eq!(record.field("y").unwrap().data(), &[3.0, 8.0]);
    }

    #[test]
    fn test_failed_set_at_leaves_record_unchanged() {
        let mut record = points();
        let missing_y = FieldArray::new(vec![("x".to_string(), NdArray::from_vec(vec![9.0]))]).unwrap();
        assert!(record.set_at(&Index::Int(1), &missing_y).is_err());
        assert_eq!(record, points());
    }
}
