//! Built-in kernels and their catalog entries.

use std::{collections::BTreeMap, sync::Arc};

use super::{DataSourceArguments, FuncDefinition, FunctionCategory, Kernel};
use crate::{
    inversion::inverse_functions as inv,
    path::{get_item, Index, PathComponent},
    value::{
        broadcast_all_shapes,
        ndarray::{broadcast_source_index, insert_axis, ravel, remove_axis, shape_size, unravel},
        NdArray, Value,
    },
    QuibError,
};

pub const IQUIB: &str = "iquib";

fn arg<'a>(args: &'a [Value], position: usize, func: &str) -> Result<&'a Value, QuibError> {
    args.get(position).ok_or_else(|| {
        QuibError::InvalidArgument(format!("{func}() missing positional argument {position}"))
    })
}

/// Resolve an optional `axis` keyword against `ndim`, accepting negative axes.
pub fn axis_kwarg(kwargs: &BTreeMap<String, Value>, ndim: usize) -> Result<Option<usize>, QuibError> {
    match kwargs.get("axis") {
        None | Some(Value::None) => Ok(None),
        Some(value) => {
            let axis = value
                .as_i64()
                .ok_or_else(|| QuibError::InvalidArgument(format!("axis must be an integer, got {value}")))?;
            normalize_axis(axis, ndim).map(Some)
        }
    }
}

pub fn normalize_axis(axis: i64, ndim: usize) -> Result<usize, QuibError> {
    let resolved = if axis < 0 { axis + ndim as i64 } else { axis };
    if resolved < 0 || resolved >= ndim.max(1) as i64 {
        return Err(QuibError::InvalidArgument(format!(
            "axis {axis} is out of bounds for array of dimension {ndim}"
        )));
    }
    Ok(resolved as usize)
}

fn int_list(value: &Value) -> Result<Vec<i64>, QuibError> {
    match value {
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(|item| {
                item.as_i64()
                    .ok_or_else(|| QuibError::InvalidArgument(format!("expected an integer, got {item}")))
            })
            .collect(),
        Value::Array(array) => Ok(array.data().iter().map(|x| *x as i64).collect()),
        other => other
            .as_i64()
            .map(|i| vec![i])
            .ok_or_else(|| QuibError::InvalidArgument(format!("expected integers, got {other}"))),
    }
}

/// Apply `f` to the broadcast-corresponding elements of every argument.
pub fn elementwise_apply<F>(args: &[Value], f: F) -> Result<Value, QuibError>
where
    F: Fn(&[f64]) -> f64,
{
    let arrays = args.iter().map(Value::to_array).collect::<Result<Vec<_>, _>>()?;
    let shape = broadcast_all_shapes(arrays.iter().map(NdArray::shape))?;
    let mut operands = vec![0.0; arrays.len()];
    let data = (0..shape_size(&shape))
        .map(|flat| {
            let index = unravel(flat, &shape);
            for (operand, array) in operands.iter_mut().zip(&arrays) {
                let source = broadcast_source_index(&index, array.shape());
                *operand = array.data()[ravel(&source, array.shape())];
            }
            f(&operands)
        })
        .collect();
    Ok(Value::from_ndarray(NdArray::from_shape_vec(shape, data)?))
}

fn elementwise(name: &str, arity: usize, f: fn(&[f64]) -> f64) -> FuncDefinition {
    let positions: Vec<usize> = (0..arity).collect();
    let func_name = name.to_string();
    let kernel: Kernel = Arc::new(move |args: &[Value], _kwargs: &BTreeMap<String, Value>| {
        if args.len() != arity {
            return Err(QuibError::InvalidArgument(format!(
                "{func_name}() takes {arity} arguments, got {}",
                args.len()
            )));
        }
        elementwise_apply(args, f)
    });
    FuncDefinition::new(
        name,
        FunctionCategory::Elementwise,
        DataSourceArguments::positions(&positions),
        kernel,
    )
}

fn transpositional(name: &str, kernel: Kernel) -> FuncDefinition {
    FuncDefinition::new(
        name,
        FunctionCategory::Transpositional,
        DataSourceArguments::positions(&[0]),
        kernel,
    )
}

fn getitem_kernel(args: &[Value], _kwargs: &BTreeMap<String, Value>) -> Result<Value, QuibError> {
    let data = arg(args, 0, "getitem")?;
    let index = Index::from_value(arg(args, 1, "getitem")?)?;
    get_item(data, &PathComponent::new(index, data.kind()))
}

fn concatenate_kernel(args: &[Value], kwargs: &BTreeMap<String, Value>) -> Result<Value, QuibError> {
    let arrays = match arg(args, 0, "concatenate")? {
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(Value::to_array)
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(QuibError::InvalidArgument(format!(
                "concatenate() expects a sequence of arrays, got {}",
                other.kind()
            )))
        }
    };
    let ndim = arrays.first().map(NdArray::ndim).unwrap_or(1);
    let axis = axis_kwarg(kwargs, ndim)?.unwrap_or(0);
    Ok(Value::Array(NdArray::concatenate(&arrays, axis)?))
}

fn transpose_kernel(args: &[Value], kwargs: &BTreeMap<String, Value>) -> Result<Value, QuibError> {
    let array = arg(args, 0, "transpose")?.to_array()?;
    let axes = match kwargs.get("axes") {
        None | Some(Value::None) => None,
        Some(axes) => Some(
            int_list(axes)?
                .into_iter()
                .map(|axis| normalize_axis(axis, array.ndim()))
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };
    Ok(Value::from_ndarray(array.transpose(axes.as_deref())?))
}

fn reshape_kernel(args: &[Value], _kwargs: &BTreeMap<String, Value>) -> Result<Value, QuibError> {
    let array = arg(args, 0, "reshape")?.to_array()?;
    let requested = int_list(arg(args, 1, "reshape")?)?;
    let known: usize = requested.iter().filter(|d| **d >= 0).map(|d| *d as usize).product();
    let unknown = requested.iter().filter(|d| **d < 0).count();
    if unknown > 1 {
        return Err(QuibError::InvalidArgument("can only specify one unknown dimension".to_string()));
    }
    let shape = requested
        .iter()
        .map(|d| match *d {
            d if d >= 0 => Ok(d as usize),
            _ if known > 0 && array.len() % known == 0 => Ok(array.len() / known),
            _ => Err(QuibError::InvalidArgument(format!(
                "cannot reshape array of size {} into shape {requested:?}",
                array.len()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::from_ndarray(array.reshape(&shape)?))
}

fn array_kernel(args: &[Value], _kwargs: &BTreeMap<String, Value>) -> Result<Value, QuibError> {
    Ok(Value::Array(arg(args, 0, "array")?.to_array()?))
}

fn flip_kernel(args: &[Value], kwargs: &BTreeMap<String, Value>) -> Result<Value, QuibError> {
    let array = arg(args, 0, "flip")?.to_array()?;
    let axis = axis_kwarg(kwargs, array.ndim())?;
    Ok(Value::from_ndarray(array.flip(axis)?))
}

fn len_kernel(args: &[Value], _kwargs: &BTreeMap<String, Value>) -> Result<Value, QuibError> {
    Ok(Value::Int(arg(args, 0, "len")?.len()? as i64))
}

fn value_shape(value: &Value) -> Result<Vec<usize>, QuibError> {
    value
        .shape()
        .ok_or_else(|| QuibError::InvalidArgument(format!("{} has no shape", value.kind())))
}

fn shape_kernel(args: &[Value], _kwargs: &BTreeMap<String, Value>) -> Result<Value, QuibError> {
    let shape = value_shape(arg(args, 0, "shape")?)?;
    Ok(Value::Tuple(shape.into_iter().map(|d| Value::Int(d as i64)).collect()))
}

fn size_kernel(args: &[Value], _kwargs: &BTreeMap<String, Value>) -> Result<Value, QuibError> {
    Ok(Value::Int(shape_size(&value_shape(arg(args, 0, "size")?)?) as i64))
}

fn reduction(args: &[Value], kwargs: &BTreeMap<String, Value>, name: &str, f: fn(&[f64]) -> f64) -> Result<Value, QuibError> {
    let array = arg(args, 0, name)?.to_array()?;
    match axis_kwarg(kwargs, array.ndim())? {
        None => Ok(Value::Float(f(array.data()))),
        Some(axis) => Ok(Value::from_ndarray(array.reduce_axis(axis, f)?)),
    }
}

fn sum_of(values: &[f64]) -> f64 {
    values.iter().sum()
}

fn mean_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        sum_of(values) / values.len() as f64
    }
}

fn identity_kernel(args: &[Value], _kwargs: &BTreeMap<String, Value>) -> Result<Value, QuibError> {
    Ok(arg(args, 0, IQUIB)?.clone())
}

/// An elementwise function built from a user scalar function of any arity. Invalidation is
/// element-precise; there is no inverse.
pub fn vectorize<F>(name: &str, f: F) -> FuncDefinition
where
    F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
{
    let f = Arc::new(f);
    FuncDefinition::new(
        name,
        FunctionCategory::Elementwise,
        DataSourceArguments::AllPositional,
        Arc::new(move |args: &[Value], _kwargs: &BTreeMap<String, Value>| {
            elementwise_apply(args, |operands| f(operands))
        }),
    )
}

/// Apply `func1d` to every lane along `axis` (keyword, default 0) of the first argument.
///
/// `func1d` returns either a scalar, which removes the axis, or a 1-d array, whose length
/// replaces the axis in the result.
pub fn apply_along_axis<F>(name: &str, func1d: F) -> FuncDefinition
where
    F: Fn(&[f64]) -> Result<Value, QuibError> + Send + Sync + 'static,
{
    let func_name = name.to_string();
    let kernel: Kernel = Arc::new(move |args: &[Value], kwargs: &BTreeMap<String, Value>| {
        let array = arg(args, 0, &func_name)?.to_array()?;
        let axis = axis_kwarg(kwargs, array.ndim())?.unwrap_or(0);
        let outer_shape = remove_axis(array.shape(), axis);
        let lanes = array
            .lanes(axis)?
            .iter()
            .map(|lane| func1d(lane.as_slice()))
            .collect::<Result<Vec<_>, _>>()?;
        if lanes.iter().all(Value::is_scalar) {
            let data = lanes.iter().filter_map(Value::as_f64).collect();
            return Ok(Value::from_ndarray(NdArray::from_shape_vec(outer_shape, data)?));
        }
        let lane_arrays = lanes.iter().map(Value::to_array).collect::<Result<Vec<_>, _>>()?;
        let lane_len = lane_arrays.first().map(NdArray::len).unwrap_or(0);
        if lane_arrays.iter().any(|lane| lane.ndim() != 1 || lane.len() != lane_len) {
            return Err(QuibError::Evaluation(format!(
                "{func_name}: every lane must produce a scalar or a 1-d array of the same length"
            )));
        }
        let mut shape = outer_shape.clone();
        shape.insert(axis, lane_len);
        let data = (0..shape_size(&shape))
            .map(|flat| {
                let index = unravel(flat, &shape);
                let position = index[axis];
                let mut outer_index = index;
                outer_index.remove(axis);
                lane_arrays[ravel(&outer_index, &outer_shape)].data()[position]
            })
            .collect();
        Ok(Value::from_ndarray(NdArray::from_shape_vec(shape, data)?))
    });
    FuncDefinition::new(
        name,
        FunctionCategory::AxisWise,
        DataSourceArguments::positions(&[0]),
        kernel,
    )
}

/// Result shape of an axis-wise call, given the data source's shape.
pub fn reduced_shape(source_shape: &[usize], axis: Option<usize>) -> Vec<usize> {
    match axis {
        None => Vec::new(),
        Some(axis) => remove_axis(source_shape, axis),
    }
}

/// Lane position `outer_index` re-expanded to the source index at `position` along `axis`.
pub fn lane_index(outer_index: &[usize], axis: usize, position: usize) -> Vec<usize> {
    insert_axis(outer_index, axis, position)
}

pub(crate) fn builtin_definitions() -> Vec<FuncDefinition> {
    vec![
        FuncDefinition::new(
            IQUIB,
            FunctionCategory::Custom,
            DataSourceArguments::Listed(Vec::new()),
            Arc::new(identity_kernel),
        ),
        elementwise("add", 2, |x| x[0] + x[1])
            .with_inverse(0, inv::add_0)
            .with_inverse(1, inv::add_1),
        elementwise("subtract", 2, |x| x[0] - x[1])
            .with_inverse(0, inv::subtract_0)
            .with_inverse(1, inv::subtract_1),
        elementwise("multiply", 2, |x| x[0] * x[1])
            .with_inverse(0, inv::multiply_0)
            .with_inverse(1, inv::multiply_1),
        elementwise("divide", 2, |x| x[0] / x[1])
            .with_inverse(0, inv::divide_0)
            .with_inverse(1, inv::divide_1),
        elementwise("power", 2, |x| x[0].powf(x[1]))
            .with_inverse(0, inv::power_0)
            .with_inverse(1, inv::power_1),
        elementwise("negative", 1, |x| -x[0]).with_inverse(0, inv::negative),
        elementwise("exp", 1, |x| x[0].exp()).with_inverse(0, inv::exp),
        elementwise("log", 1, |x| x[0].ln()).with_inverse(0, inv::log),
        elementwise("sqrt", 1, |x| x[0].sqrt()).with_inverse(0, inv::sqrt),
        elementwise("square", 1, |x| x[0] * x[0]).with_inverse(0, inv::square),
        elementwise("sin", 1, |x| x[0].sin()).with_inverse(0, inv::sin),
        elementwise("abs", 1, |x| x[0].abs()).with_inverse(0, inv::abs),
        transpositional("getitem", Arc::new(getitem_kernel)),
        transpositional("concatenate", Arc::new(concatenate_kernel)),
        transpositional("transpose", Arc::new(transpose_kernel)),
        transpositional("reshape", Arc::new(reshape_kernel)),
        transpositional("array", Arc::new(array_kernel)),
        transpositional("flip", Arc::new(flip_kernel)),
        FuncDefinition::new(
            "len",
            FunctionCategory::ShapeOnly,
            DataSourceArguments::positions(&[0]),
            Arc::new(len_kernel),
        ),
        FuncDefinition::new(
            "shape",
            FunctionCategory::ShapeOnly,
            DataSourceArguments::positions(&[0]),
            Arc::new(shape_kernel),
        ),
        FuncDefinition::new(
            "size",
            FunctionCategory::ShapeOnly,
            DataSourceArguments::positions(&[0]),
            Arc::new(size_kernel),
        ),
        FuncDefinition::new(
            "sum",
            FunctionCategory::AxisWise,
            DataSourceArguments::positions(&[0]),
            Arc::new(|args: &[Value], kwargs: &BTreeMap<String, Value>| reduction(args, kwargs, "sum", sum_of)),
        ),
        FuncDefinition::new(
            "mean",
            FunctionCategory::AxisWise,
            DataSourceArguments::positions(&[0]),
            Arc::new(|args: &[Value], kwargs: &BTreeMap<String, Value>| reduction(args, kwargs, "mean", mean_of)),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::FUNCTION_REGISTRY;

    fn call(name: &str, args: &[Value]) -> Value {
        let definition = FUNCTION_REGISTRY.get(name).unwrap();
        (definition.kernel)(args, &BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_elementwise_broadcasts() {
        let row = Value::array(vec![1, 3], vec![1.0, 2.0, 3.0]).unwrap();
        let column = Value::array(vec![3, 1], vec![1.0, 2.0, 3.0]).unwrap();
        let sum = call("add", &[row, column]);
        assert_eq!(sum.shape(), Some(vec![3, 3]));
        assert_eq!(call("add", &[Value::Float(1.0), Value::Int(2)]), Value::Float(3.0));
    }

    #[test]
    fn test_reshape_with_unknown_dimension() {
        let array = Value::Array(NdArray::arange(&[6]));
        let reshaped = call("reshape", &[array, Value::list([Value::Int(-1), Value::Int(2)])]);
        assert_eq!(reshaped.shape(), Some(vec![3, 2]));
    }

    #[test]
    fn test_sum_along_axis() {
        let array = Value::Array(NdArray::arange(&[2, 3]));
        let mut kwargs = BTreeMap::new();
        kwargs.insert("axis".to_string(), Value::Int(1));
        let definition = FUNCTION_REGISTRY.get("sum").unwrap();
        let summed = (definition.kernel)(&[array], &kwargs).unwrap();
        assert_eq!(summed, Value::from_vec(vec![3.0, 12.0]));
    }

    #[test]
    fn test_apply_along_axis_with_vector_lanes() {
        let definition = apply_along_axis("cumsum", |lane| {
            let mut total = 0.0;
            Ok(Value::from_vec(lane.iter().map(|x| {
                total += x;
                total
            }).collect()))
        });
        let mut kwargs = BTreeMap::new();
        kwargs.insert("axis".to_string(), Value::Int(1));
        let result = (definition.kernel)(&[Value::Array(NdArray::arange(&[2, 2]))], &kwargs).unwrap();
        assert_eq!(result, Value::array(vec![2, 2], vec![0.0, 1.0, 2.0, 5.0]).unwrap());
    }

    #[test]
    fn test_getitem_on_dict_and_record() {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::Int(3));
        assert_eq!(call("getitem", &[Value::Dict(map), Value::from("k")]), Value::Int(3));
    }
}
