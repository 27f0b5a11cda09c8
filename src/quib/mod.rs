//! Quibs: nodes of the dependency graph.
//!
//! A [`Quib`] is a cheap, clonable handle onto a [`QuibHandler`]. An input quib ("iquib") holds
//! a value directly; a function quib holds a [`FuncCall`] whose sources are other quibs. Values
//! are computed lazily, cached per quib, and invalidated precisely: a change to part of a quib
//! is translated forward so only the affected part of each descendant is invalidated.
//!
//! Assigning to any quib routes the change upstream through inversion until it reaches a quib
//! that allows overriding, where it is stored as an override.

pub mod factory;
mod func_runner;
pub mod graphics;
pub mod handler;
mod options;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    fs::{read_to_string, write},
    sync::Arc,
};

pub use handler::QuibHandler;

use crate::{
    assignment::{Assignment, AssignmentTemplate, Overrider},
    cache::CacheStatus,
    config::{CacheMode, GraphicsUpdateType},
    func::{functions::IQUIB, Arg, FuncCall, FUNCTION_REGISTRY},
    path::{Path, PathComponent},
    project::Project,
    translation::SourceId,
    value::{NdArray, Value, ValueKind},
    QuibError,
};

pub type QuibId = SourceId;

pub type QuibFuncCall = FuncCall<Quib>;

#[derive(Clone)]
pub struct Quib(pub(crate) Arc<QuibHandler>);

impl PartialEq for Quib {
    fn eq(&self, other: &Quib) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Quib {}

impl fmt::Debug for Quib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.label())
    }
}

impl fmt::Display for Quib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.label())
    }
}

impl Quib {
    pub fn id(&self) -> QuibId {
        self.0.id
    }

    pub fn project(&self) -> &Arc<Project> {
        &self.0.project
    }

    pub fn name(&self) -> Option<String> {
        self.0.props.read().name.clone()
    }

    pub fn func_name(&self) -> String {
        self.0.func_call.read().func.name.clone()
    }

    /// `name = func(args)`, naming parents by their labels.
    pub fn pretty_repr(&self) -> String {
        format!("{} = {:?}", self.0.label(), self.0.func_call())
    }

    pub fn is_iquib(&self) -> bool {
        self.0.is_iquib()
    }

    pub fn is_graphics(&self) -> bool {
        self.0.is_graphics()
    }

    pub fn get_value(&self) -> Result<Value, QuibError> {
        self.0.get_value_valid_at_path(Some(&[]))
    }

    /// The value, guaranteed correct only inside `path`.
    pub fn get_value_valid_at_path(&self, path: &[PathComponent]) -> Result<Value, QuibError> {
        self.0.get_value_valid_at_path(Some(path))
    }

    pub fn get_shape(&self) -> Result<Option<Vec<usize>>, QuibError> {
        if let Some(metadata) = self.0.metadata.lock().as_ref() {
            return Ok(metadata.shape.clone());
        }
        Ok(self.0.get_value_valid_at_path(None)?.shape())
    }

    pub fn get_kind(&self) -> Result<ValueKind, QuibError> {
        if let Some(metadata) = self.0.metadata.lock().as_ref() {
            return Ok(metadata.kind);
        }
        Ok(self.0.get_value_valid_at_path(None)?.kind())
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.0
            .cache
            .lock()
            .as_ref()
            .map_or(CacheStatus::AllInvalid, |cache| cache.get_cache_status())
    }

    pub fn parents(&self) -> Vec<Quib> {
        self.0.parents()
    }

    pub fn children(&self) -> Vec<Quib> {
        self.0.children()
    }

    /// Everything upstream, nearest first.
    pub fn ancestors(&self) -> Vec<Quib> {
        walk_graph(self, Quib::parents)
    }

    /// Everything downstream, nearest first.
    pub fn descendants(&self) -> Vec<Quib> {
        walk_graph(self, Quib::children)
    }

    pub fn set_name(&self, name: Option<&str>) {
        self.0.props.write().name = name.map(str::to_string);
    }

    pub fn allow_overriding(&self) -> bool {
        self.0.props.read().allow_overriding
    }

    pub fn set_allow_overriding(&self, allow: bool) {
        self.0.props.write().allow_overriding = allow;
    }

    /// Restrict which quibs assignments to this quib may land on. `None` lifts the restriction.
    pub fn set_assigned_quibs(&self, quibs: Option<&[Quib]>) {
        self.0.props.write().assigned_quibs = quibs.map(|quibs| quibs.iter().map(Quib::id).collect());
        self.0.choice_cache.lock().clear();
    }

    pub fn set_assignment_template(&self, template: Option<AssignmentTemplate>) {
        self.0.props.write().template = template;
    }

    pub fn set_cache_mode(&self, cache_mode: CacheMode) {
        self.0.props.write().cache_mode = cache_mode;
        if cache_mode == CacheMode::Off {
            *self.0.cache.lock() = None;
        }
    }

    pub fn graphics_update(&self) -> GraphicsUpdateType {
        self.0.graphics_update()
    }

    pub fn set_graphics_update(&self, update: Option<GraphicsUpdateType>) {
        self.0.props.write().graphics_update = update;
    }

    /// Forget remembered answers of the override chooser.
    pub fn reset_override_choices(&self) {
        self.0.choice_cache.lock().clear();
    }

    pub fn assign(&self, value: impl Into<Value>) -> Result<(), QuibError> {
        self.assign_at(Vec::new(), value)
    }

    pub fn assign_at(&self, path: Path, value: impl Into<Value>) -> Result<(), QuibError> {
        self.assign_assignment(Assignment::new(path, value.into()))
    }

    /// Restore the computed value at `path`, dropping the overrides of this quib there.
    pub fn remove_override(&self, path: Path) -> Result<(), QuibError> {
        self.assign_assignment(Assignment::default_at(path))
    }

    /// Overrides of this quib, in the order they apply.
    pub fn overrides(&self) -> Vec<Assignment> {
        self.0.overrider.lock().assignments()
    }

    /// For array quibs, which elements are overridden.
    pub fn get_override_mask(&self) -> Result<NdArray<bool>, QuibError> {
        let shape = self
            .get_shape()?
            .ok_or_else(|| QuibError::InvalidArgument(format!("{self} is not array-like")))?;
        Ok(self.0.overrider.lock().fill_override_mask(&shape))
    }

    /// Notify dependents that this quib changed at `path`.
    pub fn invalidate_and_redraw_at_path(&self, path: &[PathComponent]) {
        self.0.invalidate_and_redraw_at_path(path);
    }

    /// Point this quib at a new call. Fails when the call would depend on the quib itself.
    pub fn replace_func_call(&self, func_call: QuibFuncCall) -> Result<(), QuibError> {
        let depends_on_self = func_call
            .sources()
            .iter()
            .any(|source| source.0.ancestor_ids().contains(&self.id()));
        if depends_on_self {
            return Err(QuibError::InvalidArgument(format!("{self} cannot depend on itself")));
        }
        let previous = std::mem::replace(&mut *self.0.func_call.write(), Arc::new(func_call));
        for parent in previous.sources() {
            parent.0.remove_child(self.id());
        }
        for parent in self.0.parents() {
            parent.0.add_child(&self.0);
        }
        self.0.reset_cache();
        self.0.choice_cache.lock().clear();
        self.0.invalidate_and_redraw_at_path(&[]);
        Ok(())
    }

    /// Freeze the current value into an input, cutting the links to the parents.
    pub fn disconnect(&self) -> Result<(), QuibError> {
        let value = self.0.get_value_valid_at_path(Some(&[]))?;
        let iquib = FUNCTION_REGISTRY.lookup(IQUIB)?;
        self.replace_func_call(FuncCall::new(iquib, vec![Arg::Value(value)], BTreeMap::new()))
    }

    pub fn save_overrides(&self, path: &std::path::Path) -> Result<(), QuibError> {
        let content = serde_json::to_string_pretty(&*self.0.overrider.lock())?;
        write(path, content)?;
        tracing::debug!("Saved overrides of {self} to {path:?}");
        Ok(())
    }

    /// Replace the overrides with those saved at `path`. Clears the project's undo history.
    pub fn load_overrides(&self, path: &std::path::Path) -> Result<(), QuibError> {
        let overrider: Overrider = serde_json::from_str(&read_to_string(path)?)?;
        tracing::debug!("Loaded {} overrides of {self} from {path:?}", overrider.len());
        self.0.replace_overrider(overrider);
        self.0.project.clear_undo_history();
        Ok(())
    }
}

fn walk_graph(start: &Quib, next: fn(&Quib) -> Vec<Quib>) -> Vec<Quib> {
    let mut seen = BTreeSet::from([start.id()]);
    let mut found = Vec::new();
    let mut frontier = next(start);
    while !frontier.is_empty() {
        let mut following = Vec::new();
        for quib in frontier {
            if seen.insert(quib.id()) {
                following.extend(next(&quib));
                found.push(quib);
            }
        }
        frontier = following;
    }
    found
}
