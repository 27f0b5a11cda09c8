use std::collections::BTreeMap;

use super::{Inversal, Inverter};
use crate::{
    assignment::Assignment,
    path::deep_assign_data_in_path,
    translation::{
        mask_at_first_component, mask_to_path,
        transpositional::{StructuredGetItem, TranspositionMaps},
        SourceFuncCall,
    },
    value::{NdArray, Value},
    QuibError,
};

/// Routes each assigned result element back to the source element it was taken from.
pub struct TranspositionalInverter<'a> {
    pub func_call: &'a SourceFuncCall,
    pub assignment: &'a Assignment,
    pub previous_result: &'a Value,
}

impl Inverter for TranspositionalInverter<'_> {
    fn get_inversals(&self) -> Result<Vec<Inversal>, QuibError> {
        if let Some(getitem) = StructuredGetItem::detect(self.func_call)? {
            let path = getitem.backwards(&self.assignment.path)?;
            return Ok(vec![Inversal {
                source: getitem.data.id,
                assignment: self.assignment.at_path(path),
            }]);
        }
        let maps = TranspositionMaps::build(self.func_call)?;
        let result_mask = mask_at_first_component(maps.result_shape(), &self.assignment.path)?;
        let mut inversals = Vec::new();
        for map in &maps.sources {
            // source position -> result position, in source order
            let positions: BTreeMap<usize, usize> = maps
                .pairs(map, &result_mask)
                .map(|(result_flat, source_flat)| (source_flat, result_flat))
                .collect();
            if positions.is_empty() {
                continue;
            }
            let mut changed = NdArray::full(&map.shape, false);
            for source_flat in positions.keys() {
                changed.set_flat(*source_flat, true);
            }
            let path = mask_to_path(changed).unwrap_or_default();
            let value = self.assignment.value.try_map(|target| {
                let requested =
                    deep_assign_data_in_path(self.previous_result, &self.assignment.path, target, true)?.to_array()?;
                let values = positions
                    .values()
                    .map(|result_flat| {
                        requested.get_flat(*result_flat).copied().ok_or_else(|| {
                            QuibError::InvalidIndex(format!("result position {result_flat} is out of range"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if map.shape.is_empty() {
                    Value::Float(values[0])
                } else {
                    Value::from_vec(values)
                })
            })?;
            inversals.push(Inversal {
                source: map.id,
                assignment: Assignment { path, value },
            });
        }
        Ok(inversals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assignment::AssignmentValue,
        func::{Arg, FuncCall, FUNCTION_REGISTRY},
        path::{array_path, Index, PathComponent},
        translation::Source,
    };
    use std::collections::BTreeMap;

    #[test]
    fn test_concatenate_assigns_only_the_owning_block() {
        let first = Source::new(1, Value::array(vec![1, 3], vec![1.0, 2.0, 3.0]).unwrap());
        let second = Source::new(2, Value::array(vec![1, 3], vec![8.0, 12.0, 14.0]).unwrap());
        let call = FuncCall::new(
            FUNCTION_REGISTRY.get("concatenate").unwrap(),
            vec![Arg::List(vec![Arg::Source(first), Arg::Source(second)])],
            BTreeMap::new(),
        );
        let previous = Value::array(vec![2, 3], vec![1.0, 2.0, 3.0, 8.0, 12.0, 14.0]).unwrap();
        let assignment = Assignment::new(
            array_path([Index::Tuple(vec![Index::Int(0), Index::Int(0)])]),
            Value::Float(20.0),
        );
        let inversals = TranspositionalInverter {
            func_call: &call,
            assignment: &assignment,
            previous_result: &previous,
        }
        .get_inversals()
        .unwrap();
        assert_eq!(inversals.len(), 1);
        assert_eq!(inversals[0].source, 1);
        assert_eq!(inversals[0].assignment.value, AssignmentValue::Value(Value::from_vec(vec![20.0])));
    }

    #[test]
    fn test_dict_getitem_prepends_key() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::from_vec(vec![1.0, 2.0]));
        let call = FuncCall::new(
            FUNCTION_REGISTRY.get("getitem").unwrap(),
            vec![Arg::Source(Source::new(1, Value::Dict(map))), Arg::Value(Value::from("a"))],
            BTreeMap::new(),
        );
        let previous = Value::from_vec(vec![1.0, 2.0]);
        let assignment = Assignment::new(array_path([Index::Int(0)]), Value::Float(5.0));
        let inversals = TranspositionalInverter {
            func_call: &call,
            assignment: &assignment,
            previous_result: &previous,
        }
        .get_inversals()
        .unwrap();
        assert_eq!(
            inversals[0].assignment.path,
            vec![PathComponent::key("a"), PathComponent::array(Index::Int(0))]
        );
    }
}
