use super::{InversionOptions, Inversal, Inverter};
use crate::{
    assignment::Assignment,
    func::Argument,
    path::{deep_assign_data_in_path, Index, Path},
    translation::{mask_at_first_component, mask_to_path, resolve_values, Source, SourceFuncCall},
    value::{
        broadcast_all_shapes,
        ndarray::{broadcast_source_index, ravel, unravel},
        NdArray, Value,
    },
    QuibError,
};

/// Inverts through the registered scalar inverse of the first data argument.
pub struct ElementwiseInverter<'a> {
    pub func_call: &'a SourceFuncCall,
    pub assignment: &'a Assignment,
    pub previous_result: &'a Value,
    pub options: InversionOptions,
}

impl ElementwiseInverter<'_> {
    fn no_inverter(&self, reason: &str) -> QuibError {
        QuibError::NoInverter(format!("{}: {reason}", self.func_call.func.name))
    }

    /// The same unknown on two sides of the operator has no unique inverse.
    fn check_common_ancestors(&self, sources: &[&Source]) -> Result<(), QuibError> {
        for (position, source) in sources.iter().enumerate() {
            for other in &sources[position + 1..] {
                if !source.ancestors.is_disjoint(&other.ancestors) {
                    return Err(QuibError::CommonAncestor(self.func_call.func.name.clone()));
                }
            }
        }
        Ok(())
    }
}

impl Inverter for ElementwiseInverter<'_> {
    fn get_inversals(&self) -> Result<Vec<Inversal>, QuibError> {
        let sources = self.func_call.get_data_sources();
        if self.options.assignment_restrictions {
            self.check_common_ancestors(&sources)?;
        }
        let location = self
            .func_call
            .data_source_locations()
            .first()
            .ok_or_else(|| self.no_inverter("no data source"))?;
        let argument = match (&location.argument, location.sub_path.is_empty()) {
            (Argument::Positional(position), true) => *position,
            _ => return Err(self.no_inverter("source is not a plain positional argument")),
        };
        let inverse = self
            .func_call
            .func
            .inverse_for(argument)
            .ok_or_else(|| self.no_inverter(&format!("no inverse for argument {argument}")))?;
        let source = self
            .func_call
            .source_at(location)
            .ok_or_else(|| self.no_inverter("source location is empty"))?;

        let (args, _) = resolve_values(self.func_call)?;
        let operands = args.iter().map(Value::to_array).collect::<Result<Vec<_>, _>>()?;
        let result_shape = broadcast_all_shapes(operands.iter().map(NdArray::shape))?;
        let result_mask = mask_at_first_component(&result_shape, &self.assignment.path)?;
        let current = &operands[argument];
        let source_shape = current.shape().to_vec();

        let mut source_path: Option<Path> = None;
        let value = self.assignment.value.try_map(|target| {
            let requested = deep_assign_data_in_path(self.previous_result, &self.assignment.path, target, true)?
                .to_array()?
                .broadcast_to(&result_shape)?;
            let mut solved = current.clone();
            let mut changed = NdArray::full(&source_shape, false);
            let mut values = vec![0.0; operands.len()];
            for flat in result_mask.true_positions() {
                let index = unravel(flat, &result_shape);
                for (value, operand) in values.iter_mut().zip(&operands) {
                    *value = operand.data()[ravel(&broadcast_source_index(&index, operand.shape()), operand.shape())];
                }
                let source_flat = ravel(&broadcast_source_index(&index, &source_shape), &source_shape);
                solved.set_flat(source_flat, (inverse.func)(requested.data()[flat], &values));
                changed.set_flat(source_flat, true);
            }
            if source_shape.is_empty() {
                source_path = mask_to_path(changed);
                return Ok(Value::Float(solved.data()[0]));
            }
            let selected = solved.get_at(&Index::Mask(changed.clone()))?;
            source_path = mask_to_path(changed);
            Ok(Value::Array(selected))
        })?;
        Ok(source_path
            .map(|path| Inversal {
                source: source.id,
                assignment: Assignment { path, value },
            })
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assignment::AssignmentValue,
        func::{Arg, FuncCall, FUNCTION_REGISTRY},
        path::array_path,
    };
    use std::collections::{BTreeMap, BTreeSet};

    fn invert_add(a: Source, b: Arg<Source>, assignment: &Assignment, previous: &Value) -> Result<Vec<Inversal>, QuibError> {
        let call = FuncCall::new(FUNCTION_REGISTRY.get("add").unwrap(), vec![Arg::Source(a), b], BTreeMap::new());
        ElementwiseInverter {
            func_call: &call,
            assignment,
            previous_result: previous,
            options: InversionOptions::default(),
        }
        .get_inversals()
    }

    #[test]
    fn test_add_inverts_into_first_source() {
        let a = Source::new(1, Value::from_vec(vec![1.0, 2.0, 3.0]));
        let assignment = Assignment::new(array_path([Index::Int(1)]), Value::Float(12.0));
        let previous = Value::from_vec(vec![11.0, 12.0, 13.0]);
        let inversals = invert_add(a, Arg::Value(Value::Float(10.0)), &assignment, &previous).unwrap();
        assert_eq!(inversals.len(), 1);
        assert_eq!(inversals[0].source, 1);
        assert_eq!(inversals[0].assignment.value, AssignmentValue::Value(Value::from_vec(vec![2.0])));
        match &inversals[0].assignment.path[0].component {
            Index::Mask(mask) => assert_eq!(mask.true_positions(), vec![1]),
            other => panic!("expected mask, got {other}"),
        }
    }

    #[test]
    fn test_shared_ancestor_rejected() {
        let mut a = Source::new(2, Value::Float(1.0));
        a.ancestors = BTreeSet::from([1, 2]);
        let b = Source::new(1, Value::Float(1.0));
        let assignment = Assignment::new(Vec::new(), Value::Float(5.0));
        assert_eq!(
            invert_add(a, Arg::Source(b), &assignment, &Value::Float(2.0)),
            Err(QuibError::CommonAncestor("add".to_string()))
        );
    }

    #[test]
    fn test_scalar_source_with_tolerance() {
        let a = Source::new(1, Value::Float(1.0));
        let assignment = Assignment::with_tolerance(Vec::new(), Value::Float(5.0), Value::Float(4.9), Value::Float(5.1));
        let inversals = invert_add(a, Arg::Value(Value::Float(1.0)), &assignment, &Value::Float(2.0)).unwrap();
        assert_eq!(inversals[0].assignment.path, Vec::new());
        match &inversals[0].assignment.value {
            AssignmentValue::WithTolerance { nominal, down, up } => {
                assert_eq!(nominal, &Value::Float(4.0));
                assert!(down.as_f64().unwrap() < up.as_f64().unwrap());
            }
            other => panic!("expected tolerance, got {other:?}"),
        }
    }
}
