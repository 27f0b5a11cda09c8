use once_cell::sync::OnceCell;
use std::{collections::BTreeMap, fmt, sync::Arc};

use super::{Argument, FuncDefinition, SourceLocation};
use crate::{value::Value, QuibError};

/// One argument of a call, possibly nested in argument lists.
#[derive(Clone, PartialEq)]
pub enum Arg<S> {
    Value(Value),
    Source(S),
    List(Vec<Arg<S>>),
}

impl<S: fmt::Debug> fmt::Debug for Arg<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(value) => write!(f, "{value}"),
            Arg::Source(source) => write!(f, "{source:?}"),
            Arg::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl<S> From<Value> for Arg<S> {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl<S> From<f64> for Arg<S> {
    fn from(value: f64) -> Self {
        Arg::Value(Value::Float(value))
    }
}

impl<S> From<i64> for Arg<S> {
    fn from(value: i64) -> Self {
        Arg::Value(Value::Int(value))
    }
}

impl<S> Arg<S> {
    fn map<T, F: FnMut(&S) -> T>(&self, f: &mut F) -> Arg<T> {
        match self {
            Arg::Value(value) => Arg::Value(value.clone()),
            Arg::Source(source) => Arg::Source(f(source)),
            Arg::List(items) => Arg::List(items.iter().map(|item| item.map(f)).collect()),
        }
    }

    fn collect_locations(&self, argument: &Argument, sub_path: &mut Vec<usize>, out: &mut Vec<SourceLocation>) {
        match self {
            Arg::Value(_) => {}
            Arg::Source(_) => out.push(SourceLocation {
                argument: argument.clone(),
                sub_path: sub_path.clone(),
            }),
            Arg::List(items) => {
                for (position, item) in items.iter().enumerate() {
                    sub_path.push(position);
                    item.collect_locations(argument, sub_path, out);
                    sub_path.pop();
                }
            }
        }
    }

    fn at(&self, sub_path: &[usize]) -> Option<&Arg<S>> {
        match sub_path.split_first() {
            None => Some(self),
            Some((position, rest)) => match self {
                Arg::List(items) => items.get(*position)?.at(rest),
                _ => None,
            },
        }
    }
}

/// A leaf of the argument tree, as seen when resolving a call into concrete values.
pub enum ArgLeaf<'a, S> {
    Source {
        source: &'a S,
        location: SourceLocation,
        is_data: bool,
    },
    Value {
        value: &'a Value,
        is_data: bool,
    },
}

#[derive(Debug, Clone, Default)]
struct SourceLocations {
    data: Vec<SourceLocation>,
    parameter: Vec<SourceLocation>,
}

/// A function bound to its arguments.
pub struct FuncCall<S> {
    pub func: Arc<FuncDefinition>,
    pub args: Vec<Arg<S>>,
    pub kwargs: BTreeMap<String, Arg<S>>,
    locations: OnceCell<SourceLocations>,
}

impl<S: Clone> Clone for FuncCall<S> {
    fn clone(&self) -> Self {
        FuncCall {
            func: self.func.clone(),
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
            locations: self.locations.clone(),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for FuncCall<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg:?}")?;
        }
        for (i, (name, arg)) in self.kwargs.iter().enumerate() {
            if i > 0 || !self.args.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{name}={arg:?}")?;
        }
        write!(f, ")")
    }
}

impl<S> FuncCall<S> {
    pub fn new(func: Arc<FuncDefinition>, args: Vec<Arg<S>>, kwargs: BTreeMap<String, Arg<S>>) -> FuncCall<S> {
        FuncCall {
            func,
            args,
            kwargs,
            locations: OnceCell::new(),
        }
    }

    fn top_level(&self) -> impl Iterator<Item = (Argument, &Arg<S>)> {
        self.args
            .iter()
            .enumerate()
            .map(|(position, arg)| (Argument::Positional(position), arg))
            .chain(
                self.kwargs
                    .iter()
                    .map(|(name, arg)| (Argument::Keyword(name.clone()), arg)),
            )
    }

    /// Computed on first use, then kept for the lifetime of the call.
    fn locations(&self) -> &SourceLocations {
        self.locations.get_or_init(|| {
            let mut locations = SourceLocations::default();
            for (argument, arg) in self.top_level() {
                let mut found = Vec::new();
                arg.collect_locations(&argument, &mut Vec::new(), &mut found);
                if self.func.data_source_arguments.contains(&argument) {
                    locations.data.extend(found);
                } else {
                    locations.parameter.extend(found);
                }
            }
            locations
        })
    }

    pub fn data_source_locations(&self) -> &[SourceLocation] {
        &self.locations().data
    }

    pub fn parameter_source_locations(&self) -> &[SourceLocation] {
        &self.locations().parameter
    }

    pub fn arg_at(&self, location: &SourceLocation) -> Option<&Arg<S>> {
        let arg = match &location.argument {
            Argument::Positional(position) => self.args.get(*position)?,
            Argument::Keyword(name) => self.kwargs.get(name)?,
        };
        arg.at(&location.sub_path)
    }

    pub fn source_at(&self, location: &SourceLocation) -> Option<&S> {
        match self.arg_at(location)? {
            Arg::Source(source) => Some(source),
            _ => None,
        }
    }

    pub fn get_data_sources(&self) -> Vec<&S> {
        self.data_source_locations()
            .iter()
            .filter_map(|location| self.source_at(location))
            .collect()
    }

    pub fn get_parameter_sources(&self) -> Vec<&S> {
        self.parameter_source_locations()
            .iter()
            .filter_map(|location| self.source_at(location))
            .collect()
    }

    /// Data sources first, then parameter sources.
    pub fn sources(&self) -> Vec<&S> {
        let mut sources = self.get_data_sources();
        sources.extend(self.get_parameter_sources());
        sources
    }

    /// The same call with every source replaced by `f(source)`.
    pub fn map_sources<T, F: FnMut(&S) -> T>(&self, mut f: F) -> FuncCall<T> {
        FuncCall {
            func: self.func.clone(),
            args: self.args.iter().map(|arg| arg.map(&mut f)).collect(),
            kwargs: self
                .kwargs
                .iter()
                .map(|(name, arg)| (name.clone(), arg.map(&mut f)))
                .collect(),
            locations: OnceCell::new(),
        }
    }

    /// Turn the argument tree into concrete values, letting `f` decide the value of each leaf.
    /// Argument lists become [`Value::List`].
    pub fn resolve_args<F>(&self, mut f: F) -> Result<(Vec<Value>, BTreeMap<String, Value>), QuibError>
    where
        F: FnMut(ArgLeaf<'_, S>) -> Result<Value, QuibError>,
    {
        let mut args = Vec::with_capacity(self.args.len());
        for (position, arg) in self.args.iter().enumerate() {
            let argument = Argument::Positional(position);
            let is_data = self.func.data_source_arguments.contains(&argument);
            args.push(resolve_arg(arg, &argument, is_data, &mut Vec::new(), &mut f)?);
        }
        let mut kwargs = BTreeMap::new();
        for (name, arg) in &self.kwargs {
            let argument = Argument::Keyword(name.clone());
            let is_data = self.func.data_source_arguments.contains(&argument);
            kwargs.insert(name.clone(), resolve_arg(arg, &argument, is_data, &mut Vec::new(), &mut f)?);
        }
        Ok((args, kwargs))
    }

    /// Resolve with `f` and run the kernel.
    pub fn invoke_with<F>(&self, f: F) -> Result<Value, QuibError>
    where
        F: FnMut(ArgLeaf<'_, S>) -> Result<Value, QuibError>,
    {
        let (args, kwargs) = self.resolve_args(f)?;
        (self.func.kernel)(&args, &kwargs)
    }
}

fn resolve_arg<S, F>(
    arg: &Arg<S>,
    argument: &Argument,
    is_data: bool,
    sub_path: &mut Vec<usize>,
    f: &mut F,
) -> Result<Value, QuibError>
where
    F: FnMut(ArgLeaf<'_, S>) -> Result<Value, QuibError>,
{
    match arg {
        Arg::Value(value) => f(ArgLeaf::Value { value, is_data }),
        Arg::Source(source) => f(ArgLeaf::Source {
            source,
            location: SourceLocation {
                argument: argument.clone(),
                sub_path: sub_path.clone(),
            },
            is_data,
        }),
        Arg::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for (position, item) in items.iter().enumerate() {
                sub_path.push(position);
                values.push(resolve_arg(item, argument, is_data, sub_path, f)?);
                sub_path.pop();
            }
            Ok(Value::List(values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::FUNCTION_REGISTRY;

    #[test]
    fn test_source_locations_split_data_and_parameters() {
        let concatenate = FUNCTION_REGISTRY.get("concatenate").unwrap();
        let mut kwargs = BTreeMap::new();
        kwargs.insert("axis".to_string(), Arg::Source("axis-source"));
        let call = FuncCall::new(
            concatenate,
            vec![Arg::List(vec![Arg::Source("a"), Arg::Value(Value::Float(1.0)), Arg::Source("b")])],
            kwargs,
        );
        assert_eq!(call.get_data_sources(), vec![&"a", &"b"]);
        assert_eq!(call.get_parameter_sources(), vec![&"axis-source"]);
        assert_eq!(call.data_source_locations()[1].sub_path, vec![2]);
    }

    #[test]
    fn test_map_sources_and_invoke() {
        let add = FUNCTION_REGISTRY.get("add").unwrap();
        let call = FuncCall::new(add, vec![Arg::Source(2.0), Arg::Value(Value::Float(3.0))], BTreeMap::new());
        let result = call
            .invoke_with(|leaf| match leaf {
                ArgLeaf::Source { source, .. } => Ok(Value::Float(*source)),
                ArgLeaf::Value { value, .. } => Ok(value.clone()),
            })
            .unwrap();
        assert_eq!(result, Value::Float(5.0));
        let mapped = call.map_sources(|source| *source as i64);
        assert_eq!(mapped.get_data_sources(), vec![&2]);
    }
}
