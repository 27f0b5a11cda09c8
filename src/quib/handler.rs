use parking_lot::{Mutex, RwLock};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{Arc, Weak},
};

use super::{Quib, QuibFuncCall, QuibId};
use crate::{
    assignment::{
        simplifier::simplify_assignment, Assignment, AssignmentTemplate, ChoiceContext, OverrideChoice, Overrider,
    },
    cache::{CacheStatus, ShallowCache},
    config::{CacheMode, GraphicsUpdateType},
    event::QuibEvent,
    func::functions::IQUIB,
    inversion::{self, Inversal, InversionOptions},
    path::{Path, PathComponent, Paths},
    project::{AssignmentAction, Project},
    translation::{forwards_translate, ResultMetadata, Source, SourceFuncCall},
    value::Value,
    QuibError,
};

/// How [`QuibHandler::source_func_call`] reads the parents. Parameter sources are always
/// read fully valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceValues {
    /// Only what is known without evaluating. Data sources have the right shape but may be stale.
    Known,
    /// Data sources of the right shape, evaluated when nothing is cached.
    Shaped,
    /// Every source valid everywhere, with its ancestors recorded.
    Valid,
}

/// Per-quib settings.
#[derive(Debug, Clone)]
pub(crate) struct QuibProps {
    pub name: Option<String>,
    pub allow_overriding: bool,
    /// When set, assignments to this quib may only land on these quibs.
    pub assigned_quibs: Option<BTreeSet<QuibId>>,
    pub template: Option<AssignmentTemplate>,
    pub cache_mode: CacheMode,
    /// Falls back to the project setting when unset.
    pub graphics_update: Option<GraphicsUpdateType>,
}

/// The state behind a [`Quib`]. Each quib exclusively owns its cache and override log; the
/// only links between quibs are the sources of the function call (strong, towards parents)
/// and the registered children (weak).
pub struct QuibHandler {
    pub(crate) id: QuibId,
    pub(crate) project: Arc<Project>,
    pub(crate) func_call: RwLock<Arc<QuibFuncCall>>,
    pub(crate) cache: Mutex<Option<Box<dyn ShallowCache>>>,
    pub(crate) metadata: Mutex<Option<ResultMetadata>>,
    pub(crate) overrider: Mutex<Overrider>,
    pub(crate) children: Mutex<BTreeMap<QuibId, Weak<QuibHandler>>>,
    pub(crate) choice_cache: Mutex<BTreeMap<ChoiceContext, OverrideChoice>>,
    pub(crate) props: RwLock<QuibProps>,
}

impl fmt::Debug for QuibHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuibHandler")
            .field("id", &self.id)
            .field("func", &self.func_call.read().func.name)
            .field("overrides", &self.overrider.lock().len())
            .finish()
    }
}

impl Drop for QuibHandler {
    fn drop(&mut self) {
        for parent in self.func_call.get_mut().sources() {
            parent.0.children.lock().remove(&self.id);
        }
    }
}

impl QuibHandler {
    pub(crate) fn new(id: QuibId, project: Arc<Project>, func_call: QuibFuncCall, props: QuibProps) -> QuibHandler {
        QuibHandler {
            id,
            project,
            func_call: RwLock::new(Arc::new(func_call)),
            cache: Mutex::new(None),
            metadata: Mutex::new(None),
            overrider: Mutex::new(Overrider::new()),
            children: Mutex::new(BTreeMap::new()),
            choice_cache: Mutex::new(BTreeMap::new()),
            props: RwLock::new(props),
        }
    }

    pub(crate) fn func_call(&self) -> Arc<QuibFuncCall> {
        self.func_call.read().clone()
    }

    pub(crate) fn is_iquib(&self) -> bool {
        self.func_call.read().func.name == IQUIB
    }

    pub(crate) fn is_graphics(&self) -> bool {
        self.func_call.read().func.is_graphics
    }

    pub(crate) fn label(&self) -> String {
        match &self.props.read().name {
            Some(name) => name.clone(),
            None => format!("quib_{}", self.id),
        }
    }

    pub(crate) fn graphics_update(&self) -> GraphicsUpdateType {
        self.props
            .read()
            .graphics_update
            .unwrap_or(self.project.config().graphics_update)
    }

    /// Distinct parents, data sources first.
    pub(crate) fn parents(&self) -> Vec<Quib> {
        let mut seen = BTreeSet::new();
        self.func_call()
            .sources()
            .into_iter()
            .filter(|parent| seen.insert(parent.id()))
            .cloned()
            .collect()
    }

    /// Live children. Entries of dropped children are pruned on the way.
    pub(crate) fn children(&self) -> Vec<Quib> {
        let mut children = self.children.lock();
        children.retain(|_, child| child.strong_count() > 0);
        children.values().filter_map(Weak::upgrade).map(Quib).collect()
    }

    pub(crate) fn add_child(&self, child: &Arc<QuibHandler>) {
        self.children.lock().insert(child.id, Arc::downgrade(child));
    }

    pub(crate) fn remove_child(&self, child: QuibId) {
        self.children.lock().remove(&child);
    }

    /// This quib and everything upstream of it.
    pub(crate) fn ancestor_ids(&self) -> BTreeSet<QuibId> {
        let mut ancestors = BTreeSet::from([self.id]);
        let mut pending = self.parents();
        while let Some(parent) = pending.pop() {
            if ancestors.insert(parent.id()) {
                pending.extend(parent.0.parents());
            }
        }
        ancestors
    }

    /// The call with every parent replaced by a snapshot of its value, read as `mode` asks.
    pub(crate) fn source_func_call(&self, mode: SourceValues) -> Result<SourceFuncCall, QuibError> {
        let func_call = self.func_call();
        let parameter_ids: BTreeSet<QuibId> = func_call.get_parameter_sources().iter().map(|quib| quib.id()).collect();
        let mut values = BTreeMap::new();
        for parent in func_call.sources() {
            let id = parent.id();
            if values.contains_key(&id) {
                continue;
            }
            let value = match mode {
                _ if parameter_ids.contains(&id) => parent.0.get_value_valid_at_path(Some(&[]))?,
                SourceValues::Valid => parent.0.get_value_valid_at_path(Some(&[]))?,
                SourceValues::Shaped => parent.0.get_value_valid_at_path(None)?,
                SourceValues::Known => parent.0.known_value().ok_or_else(|| {
                    QuibError::NoTranslator(format!("nothing is known yet about the value of {parent}"))
                })?,
            };
            values.insert(id, value);
        }
        let with_ancestors = mode == SourceValues::Valid;
        Ok(func_call.map_sources(|parent| {
            let id = parent.id();
            Source {
                id,
                value: values.get(&id).cloned().unwrap_or_default(),
                ancestors: if with_ancestors {
                    parent.0.ancestor_ids()
                } else {
                    BTreeSet::from([id])
                },
            }
        }))
    }

    /// A value of the right structure, obtained without evaluating anything: the input value, a
    /// cache that is at least partly valid, or a placeholder built from the last result's
    /// metadata. The data may be stale.
    pub(crate) fn known_value(self: &Arc<Self>) -> Option<Value> {
        if self.is_iquib() {
            return self.get_value_valid_at_path(None).ok();
        }
        if let Some(cache) = self.cache.lock().as_ref() {
            if cache.get_cache_status() != CacheStatus::AllInvalid {
                return Some(cache.get_value().clone());
            }
        }
        self.metadata.lock().as_ref().and_then(ResultMetadata::placeholder)
    }

    /// Paths of this quib affected by `parent` changing at `path`.
    fn forward_paths_from(&self, parent: QuibId, path: &[PathComponent]) -> Paths {
        let is_data_source = self
            .func_call()
            .get_data_sources()
            .iter()
            .any(|source| source.id() == parent);
        if path.is_empty() || !is_data_source {
            return vec![Vec::new()];
        }
        let Some(metadata) = self.metadata.lock().clone() else {
            return vec![Vec::new()];
        };
        match self.source_func_call(SourceValues::Known) {
            Ok(source_call) => forwards_translate(&source_call, parent, path, Some(&metadata)),
            Err(err) => {
                tracing::debug!("Invalidating all of {}: {err}", self.label());
                vec![Vec::new()]
            }
        }
    }

    /// Invalidate everything downstream of a change of this quib's value at `path`, then
    /// schedule the affected graphics quibs for redraw.
    pub(crate) fn invalidate_and_redraw_at_path(self: &Arc<Self>, path: &[PathComponent]) {
        let mut graphics = BTreeMap::new();
        if self.is_graphics() {
            graphics.insert(self.id, Quib(self.clone()));
        }
        self.invalidate_children_at_path(path, &mut graphics);
        self.project.schedule_redraws(graphics.into_values().collect());
    }

    fn invalidate_children_at_path(&self, path: &[PathComponent], graphics: &mut BTreeMap<QuibId, Quib>) {
        for child in self.children() {
            for child_path in child.0.forward_paths_from(self.id, path) {
                child.0.invalidate_at_path(&child_path, graphics);
            }
        }
    }

    fn invalidate_at_path(self: &Arc<Self>, path: &[PathComponent], graphics: &mut BTreeMap<QuibId, Quib>) {
        if path.is_empty() {
            *self.metadata.lock() = None;
        }
        {
            let mut cache = self.cache.lock();
            if let Some(Err(err)) = cache.as_mut().map(|cache| cache.set_invalid_at_path(path)) {
                tracing::debug!("Dropping the cache of {}: {err}", self.label());
                *cache = None;
            }
        }
        self.project.emit(QuibEvent::Invalidated {
            quib: self.id,
            path: path.to_vec(),
        });
        if self.is_graphics() {
            graphics.insert(self.id, Quib(self.clone()));
        }
        let shape = self.metadata.lock().as_ref().and_then(|metadata| metadata.shape.clone());
        let shadowed = !path.is_empty() && self.overrider.lock().covers(shape.as_deref(), path);
        if shadowed {
            tracing::debug!("Change at {} of {} is hidden by its overrides", crate::path::path_repr(path), self.label());
            return;
        }
        self.invalidate_children_at_path(path, graphics);
    }

    /// Re-evaluate a graphics quib.
    pub(crate) fn redraw(self: &Arc<Self>) {
        match self.get_value_valid_at_path(Some(&[])) {
            Ok(_) => self.project.emit(QuibEvent::Redrawn(self.id)),
            Err(err) => tracing::warn!("Redrawing {} failed: {err}", self.label()),
        }
    }

    /// Inversals of `assignment` made on this quib's value.
    pub(crate) fn invert(self: &Arc<Self>, assignment: &Assignment) -> Result<Vec<Inversal>, QuibError> {
        if self.is_iquib() {
            return Err(QuibError::NoInverter(IQUIB.to_string()));
        }
        let source_call = self.source_func_call(SourceValues::Valid)?;
        let previous = self.get_value_valid_at_path(Some(&assignment.path))?;
        let options = InversionOptions {
            assignment_restrictions: self.project.config().assignment_restrictions,
        };
        inversion::invert(&source_call, assignment, &previous, options)
    }

    /// The choice for an ambiguous assignment, asking the project's chooser at most once per
    /// situation.
    pub(crate) fn choose_override(&self, candidates: &[Quib], can_diverge: bool) -> Result<OverrideChoice, QuibError> {
        let context = ChoiceContext::new(candidates, can_diverge);
        if let Some(choice) = self.choice_cache.lock().get(&context) {
            tracing::debug!("Reusing override choice {choice:?} for {}", self.label());
            return Ok(*choice);
        }
        let chooser = self.project.override_chooser().ok_or(QuibError::NoChooser)?;
        let choice = chooser.choose(candidates, can_diverge)?;
        tracing::info!("Override choice for {}: {choice:?}", self.label());
        self.choice_cache.lock().insert(context, choice);
        Ok(choice)
    }

    /// Template and simplification applied to an incoming assignment. `None` when storing it
    /// would change nothing.
    pub(crate) fn prepare_assignment(self: &Arc<Self>, assignment: Assignment) -> Result<Option<Assignment>, QuibError> {
        if assignment.is_default() && self.overrider.lock().is_empty() {
            return Ok(None);
        }
        let template = self.props.read().template;
        let assignment = match template {
            Some(template) if !assignment.is_default() => Assignment {
                value: assignment.value.try_map(|value| template.convert(value))?,
                path: assignment.path,
            },
            _ => assignment,
        };
        let current = self.get_value_valid_at_path(Some(&assignment.path)).ok();
        Ok(simplify_assignment(assignment, current.as_ref()))
    }

    /// Store a prepared assignment and propagate the change.
    pub(crate) fn commit_assignment(self: &Arc<Self>, assignment: Assignment) -> AssignmentAction {
        tracing::debug!("Overriding {}: {assignment}", self.label());
        let (index, replaced) = self.overrider.lock().add_assignment(assignment.clone());
        let mut paths = vec![assignment.path.clone()];
        if let Some((_, previous)) = &replaced {
            if previous.path != assignment.path {
                paths.push(previous.path.clone());
            }
        }
        self.on_overrides_changed(paths);
        AssignmentAction {
            quib: Arc::downgrade(self),
            index,
            assignment,
            replaced,
        }
    }

    pub(crate) fn revert_action(self: &Arc<Self>, action: &AssignmentAction) {
        let mut paths = vec![action.assignment.path.clone()];
        {
            let mut overrider = self.overrider.lock();
            overrider.pop_assignment_at_index(action.index);
            if let Some((index, replaced)) = &action.replaced {
                overrider.insert_assignment_at_index(*index, replaced.clone());
                paths.push(replaced.path.clone());
            }
        }
        self.on_overrides_changed(paths);
    }

    pub(crate) fn reapply_action(self: &Arc<Self>, action: &AssignmentAction) {
        let mut paths = vec![action.assignment.path.clone()];
        {
            let mut overrider = self.overrider.lock();
            if let Some((index, replaced)) = &action.replaced {
                overrider.pop_assignment_at_index(*index);
                paths.push(replaced.path.clone());
            }
            overrider.insert_assignment_at_index(action.index, action.assignment.clone());
        }
        self.on_overrides_changed(paths);
    }

    /// Replace the whole override log, invalidating wherever the old or new log applied.
    pub(crate) fn replace_overrider(self: &Arc<Self>, overrider: Overrider) {
        let mut paths = {
            let mut current = self.overrider.lock();
            let old_paths = current.clear_assignments();
            *current = overrider;
            old_paths
        };
        paths.extend(self.overrider.lock().assignments().into_iter().map(|assignment| assignment.path));
        self.on_overrides_changed(paths);
    }

    fn on_overrides_changed(self: &Arc<Self>, paths: Vec<Path>) {
        for path in &paths {
            self.invalidate_and_redraw_at_path(path);
        }
        self.project.emit(QuibEvent::OverridesChanged { quib: self.id, paths });
    }

    /// Forget the cached result and its metadata.
    pub(crate) fn reset_cache(&self) {
        *self.cache.lock() = None;
        *self.metadata.lock() = None;
    }
}
