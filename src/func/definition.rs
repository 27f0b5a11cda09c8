use once_cell::sync::Lazy;
use std::{collections::BTreeMap, fmt, sync::Arc};

use super::{functions, Argument, FunctionCategory};
use crate::{
    inversion::{ElementwiseInverse, InverseFn},
    value::Value,
    QuibError,
};

pub type Kernel = Arc<dyn Fn(&[Value], &BTreeMap<String, Value>) -> Result<Value, QuibError> + Send + Sync>;

/// Which top-level arguments carry data sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceArguments {
    Listed(Vec<Argument>),
    /// Every positional argument (variadic elementwise functions, graphics calls).
    AllPositional,
}

impl DataSourceArguments {
    pub fn positions(positions: &[usize]) -> DataSourceArguments {
        DataSourceArguments::Listed(positions.iter().map(|p| Argument::Positional(*p)).collect())
    }

    pub fn contains(&self, argument: &Argument) -> bool {
        match self {
            DataSourceArguments::Listed(arguments) => arguments.contains(argument),
            DataSourceArguments::AllPositional => matches!(argument, Argument::Positional(_)),
        }
    }
}

/// A catalog entry: the callable plus everything the engine knows about its structure.
#[derive(Clone)]
pub struct FuncDefinition {
    pub name: String,
    pub kernel: Kernel,
    pub category: FunctionCategory,
    pub data_source_arguments: DataSourceArguments,
    /// Per data-argument inverse for elementwise functions.
    pub inverses: Vec<ElementwiseInverse>,
    /// Graphics calls are re-evaluated ("redrawn") when their inputs change.
    pub is_graphics: bool,
}

impl fmt::Debug for FuncDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("data_source_arguments", &self.data_source_arguments)
            .field("inverses", &self.inverses.len())
            .field("is_graphics", &self.is_graphics)
            .finish()
    }
}

impl FuncDefinition {
    pub fn new(name: &str, category: FunctionCategory, data_source_arguments: DataSourceArguments, kernel: Kernel) -> Self {
        FuncDefinition {
            name: name.to_string(),
            kernel,
            category,
            data_source_arguments,
            inverses: Vec::new(),
            is_graphics: false,
        }
    }

    /// A user function the engine knows nothing about: any change to an argument invalidates
    /// the whole result and assignments cannot be inverted through it.
    pub fn custom<F>(name: &str, kernel: F) -> FuncDefinition
    where
        F: Fn(&[Value], &BTreeMap<String, Value>) -> Result<Value, QuibError> + Send + Sync + 'static,
    {
        FuncDefinition::new(
            name,
            FunctionCategory::Custom,
            DataSourceArguments::AllPositional,
            Arc::new(kernel),
        )
    }

    /// A graphics call, re-evaluated according to its graphics update mode.
    pub fn graphics<F>(name: &str, kernel: F) -> FuncDefinition
    where
        F: Fn(&[Value], &BTreeMap<String, Value>) -> Result<Value, QuibError> + Send + Sync + 'static,
    {
        FuncDefinition {
            is_graphics: true,
            ..FuncDefinition::custom(name, kernel)
        }
    }

    pub fn with_category(mut self, category: FunctionCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_data_source_arguments(mut self, arguments: DataSourceArguments) -> Self {
        self.data_source_arguments = arguments;
        self
    }

    pub fn with_inverse(mut self, argument: usize, func: InverseFn) -> Self {
        self.inverses.push(ElementwiseInverse { argument, func });
        self
    }

    pub fn inverse_for(&self, argument: usize) -> Option<&ElementwiseInverse> {
        self.inverses.iter().find(|inverse| inverse.argument == argument)
    }

    pub fn into_arc(self) -> Arc<FuncDefinition> {
        Arc::new(self)
    }
}

/// The static function table, keyed by name.
pub struct FunctionRegistry {
    definitions: BTreeMap<String, Arc<FuncDefinition>>,
}

impl FunctionRegistry {
    fn builtin() -> FunctionRegistry {
        let definitions = functions::builtin_definitions()
            .into_iter()
            .map(|definition| (definition.name.clone(), Arc::new(definition)))
            .collect();
        FunctionRegistry { definitions }
    }

    pub fn get(&self, name: &str) -> Option<Arc<FuncDefinition>> {
        self.definitions.get(name).cloned()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<FuncDefinition>, QuibError> {
        self.get(name)
            .ok_or_else(|| QuibError::NotFound(format!("no function named '{name}' in the registry")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }
}

pub static FUNCTION_REGISTRY: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::builtin);
