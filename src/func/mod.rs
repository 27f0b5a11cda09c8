//! Call sites and the function catalog.
//!
//! A [`FuncCall`] binds a [`FuncDefinition`] to positional and keyword arguments. Any argument
//! leaf may be a *source* (a parent quib, or a marked [`Source`](crate::translation::Source) in
//! synthetic calls used for translation). Sources inside the arguments listed by
//! [`FuncDefinition::data_source_arguments`] are data sources; every other source is a
//! parameter source.
//!
//! The built-in catalog lives in [`functions`] and is reachable through [`FunctionRegistry`].

pub mod definition;
pub mod func_call;
pub mod functions;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use definition::{DataSourceArguments, FuncDefinition, FunctionRegistry, Kernel, FUNCTION_REGISTRY};
pub use func_call::{Arg, ArgLeaf, FuncCall};

/// How a function maps its data sources onto its result. Decides which translators and
/// inverters apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionCategory {
    /// Each result element depends on the broadcast-corresponding element of every data source.
    Elementwise,
    /// Result elements are source elements moved around (indexing, concatenation, reshaping).
    Transpositional,
    /// Only the shape of the data sources matters (`len`, `shape`, `size`).
    ShapeOnly,
    /// Each result element depends on a whole lane along an axis (`sum`, `apply_along_axis`).
    AxisWise,
    /// No structural knowledge: whole-result invalidation, no inversion.
    Custom,
}

impl fmt::Display for FunctionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A top-level argument of a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Argument {
    Positional(usize),
    Keyword(String),
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Positional(position) => write!(f, "arg {position}"),
            Argument::Keyword(name) => write!(f, "kwarg '{name}'"),
        }
    }
}

/// Where a source sits in a call: its top-level argument, then the positions within nested
/// argument lists (`concatenate([a, b])` puts `b` at `(Positional(0), [1])`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub argument: Argument,
    pub sub_path: Vec<usize>,
}
