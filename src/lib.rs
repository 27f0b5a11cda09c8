//! # quib-core
//!
//! A reactive dataflow graph of "quibs": values derived from other values by function calls,
//! with path-aware caching, precise invalidation and inverse assignment.
//!
//! ## Overview
//!
//! An input quib (iquib) holds a value. A function quib holds a function call whose arguments
//! may be other quibs. Values are computed lazily and cached; when part of an input changes,
//! only the affected part of each descendant is invalidated. Assigning to a derived quib runs
//! the change backwards through the functions that produced it (inversion) until it reaches a
//! quib that accepts overrides.
//!
//! ### Key Features
//!
//! - **Path translation**: elementwise, transpositional and axis-wise functions map changed
//!   regions between their arguments and their result in both directions
//! - **Shallow caches**: per-element validity for arrays, per-field for records, per-key for
//!   lists and dictionaries
//! - **Overrides**: an ordered log of assignments per quib, with undo and redo
//! - **Override choice**: when several quibs could take an assignment, a registered
//!   [`OverrideChooser`](assignment::OverrideChooser) decides, and the answer is remembered
//! - **Graphics scheduling**: graphics quibs are redrawn on change, at the end of a drag, or on
//!   explicit refresh
//!
//! ## Architecture
//!
//! - **[`value`]**: the dynamic values flowing through the graph (`Value`, `NdArray`)
//! - **[`path`]**: paths addressing parts of values, and reading or writing through them
//! - **[`func`]**: function definitions, their categories and bound calls
//! - **[`translation`]**: forward and backward path translation
//! - **[`inversion`]**: turning an assignment on a result into assignments on its sources
//! - **[`cache`]**: shallow caches with validity tracking
//! - **[`assignment`]**: assignments, override logs, templates and override choice
//! - **[`quib`]**: the graph nodes and their evaluation, invalidation and assignment
//! - **[`project`]**: undo history, events, drag gestures and redraw scheduling
//! - **[`config`]**: graph settings, optionally kept in a TOML file
//!
//! ## Quick Start
//!
//! ```rust
//! use quib_core::{path::{array_path, Index}, project::Project, value::Value, GraphConfig};
//!
//! # fn main() -> Result<(), quib_core::QuibError> {
//! let project = Project::new(GraphConfig::default());
//! let a = project.iquib(Value::from_vec(vec![1.0, 2.0, 3.0]));
//! let b = &a + 10.0;
//! assert_eq!(b.get_value()?, Value::from_vec(vec![11.0, 12.0, 13.0]));
//!
//! // Assigning to `b` overrides `a`, the only quib accepting overrides.
//! b.assign_at(array_path([Index::Int(1)]), Value::Float(20.0))?;
//! assert_eq!(a.get_value()?, Value::from_vec(vec![1.0, 10.0, 3.0]));
//!
//! project.undo();
//! assert_eq!(b.get_value()?, Value::from_vec(vec![11.0, 12.0, 13.0]));
//! # Ok(())
//! # }
//! ```

pub mod assignment;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod func;
pub mod inversion;
pub mod path;
pub mod project;
pub mod quib;
#[cfg(test)]
mod tests;
pub mod translation;
pub mod value;

pub use config::{CacheMode, GraphConfig, GraphicsUpdateType};
pub use error::*;
pub use func::{Arg, FuncDefinition};
pub use quib::{Quib, QuibId};
