use parking_lot::{Mutex, RwLock};
use std::{
    collections::BTreeMap,
    mem,
    sync::{
        mpsc::{channel, Receiver, Sender},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use crate::{
    assignment::{Assignment, OverrideChooser},
    config::{GraphConfig, GraphicsUpdateType},
    event::QuibEvent,
    quib::{graphics::redraw_order, Quib, QuibHandler, QuibId},
};

/// One stored override, with what it displaced, so it can be reverted and re-applied.
#[derive(Debug, Clone)]
pub(crate) struct AssignmentAction {
    pub quib: Weak<QuibHandler>,
    pub index: usize,
    pub assignment: Assignment,
    pub replaced: Option<(usize, Assignment)>,
}

impl AssignmentAction {
    fn undo(&self) {
        match self.quib.upgrade() {
            Some(handler) => handler.revert_action(self),
            None => tracing::debug!("Skipping undo of an override on a dropped quib"),
        }
    }

    fn redo(&self) {
        match self.quib.upgrade() {
            Some(handler) => handler.reapply_action(self),
            None => tracing::debug!("Skipping redo of an override on a dropped quib"),
        }
    }
}

type UndoGroup = Vec<AssignmentAction>;

/// Fold a drag step into the gesture. A step overwriting an earlier step of the same gesture
/// takes its place and keeps what that step displaced, so the gesture holds one action per
/// overridden path.
fn merge_drag_step(drag_group: &mut UndoGroup, mut action: AssignmentAction) {
    let earlier = action.replaced.as_ref().and_then(|(replaced_index, _)| {
        drag_group
            .iter()
            .position(|step| step.index == *replaced_index && Weak::ptr_eq(&step.quib, &action.quib))
    });
    if let Some(position) = earlier {
        action.replaced = drag_group.remove(position).replaced;
    }
    drag_group.push(action);
}

#[derive(Debug, Default)]
struct ProjectState {
    undo_stack: Vec<UndoGroup>,
    redo_stack: Vec<UndoGroup>,
    /// Actions of the drag gesture in progress, pushed as one group when it ends.
    drag_group: Option<UndoGroup>,
    aggregate_depth: usize,
    pending_redraws: BTreeMap<QuibId, Weak<QuibHandler>>,
    last_drag_redraw: Option<Instant>,
}

/// Owns what is shared by all quibs of a graph: configuration, undo history, the override
/// chooser, event delivery and graphics scheduling.
pub struct Project {
    config: RwLock<GraphConfig>,
    state: Mutex<ProjectState>,
    chooser: RwLock<Option<Arc<dyn OverrideChooser>>>,
    events: Mutex<Option<Sender<QuibEvent>>>,
    quibs: Mutex<BTreeMap<QuibId, Weak<QuibHandler>>>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Project")
            .field("config", &*self.config.read())
            .field("undo", &state.undo_stack.len())
            .field("redo", &state.redo_stack.len())
            .field("quibs", &self.quibs.lock().len())
            .finish()
    }
}

impl Project {
    pub fn new(config: GraphConfig) -> Arc<Project> {
        Arc::new(Project {
            config: RwLock::new(config),
            state: Mutex::new(ProjectState::default()),
            chooser: RwLock::new(None),
            events: Mutex::new(None),
            quibs: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn config(&self) -> GraphConfig {
        self.config.read().clone()
    }

    /// Applies to quibs created afterwards and to every later evaluation.
    pub fn set_config(&self, config: GraphConfig) {
        *self.config.write() = config;
    }

    pub fn set_override_chooser(&self, chooser: Option<Arc<dyn OverrideChooser>>) {
        *self.chooser.write() = chooser;
    }

    pub(crate) fn override_chooser(&self) -> Option<Arc<dyn OverrideChooser>> {
        self.chooser.read().clone()
    }

    /// Start receiving [`QuibEvent`]s. Replaces any earlier subscriber.
    pub fn subscribe(&self) -> Receiver<QuibEvent> {
        let (tx, rx) = channel();
        *self.events.lock() = Some(tx);
        rx
    }

    pub(crate) fn emit(&self, event: QuibEvent) {
        let mut events = self.events.lock();
        if let Some(tx) = events.as_ref() {
            tracing::trace!("Event: {event}");
            if tx.send(event).is_err() {
                tracing::debug!("Event receiver dropped, no longer sending events");
                *events = None;
            }
        }
    }

    pub(crate) fn register(&self, handler: &Arc<QuibHandler>) {
        let mut quibs = self.quibs.lock();
        quibs.retain(|_, quib| quib.strong_count() > 0);
        quibs.insert(handler.id, Arc::downgrade(handler));
    }

    /// Live quibs of this project, in creation order.
    pub fn quibs(&self) -> Vec<Quib> {
        self.quibs.lock().values().filter_map(Weak::upgrade).map(Quib).collect()
    }

    pub fn can_undo(&self) -> bool {
        !self.state.lock().undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.lock().redo_stack.is_empty()
    }

    /// Revert the last assignment. Returns false when there is nothing to undo.
    pub fn undo(&self) -> bool {
        let Some(group) = self.state.lock().undo_stack.pop() else {
            return false;
        };
        tracing::debug!("Undoing {} overrides", group.len());
        self.aggregate(|| group.iter().rev().for_each(AssignmentAction::undo));
        self.state.lock().redo_stack.push(group);
        self.emit_stack_sizes();
        true
    }

    /// Re-apply the last undone assignment. Returns false when there is nothing to redo.
    pub fn redo(&self) -> bool {
        let Some(group) = self.state.lock().redo_stack.pop() else {
            return false;
        };
        tracing::debug!("Redoing {} overrides", group.len());
        self.aggregate(|| group.iter().for_each(AssignmentAction::redo));
        self.state.lock().undo_stack.push(group);
        self.emit_stack_sizes();
        true
    }

    pub(crate) fn push_undo_group(&self, group: UndoGroup) {
        if group.is_empty() {
            return;
        }
        {
            let mut state = self.state.lock();
            if let Some(drag_group) = state.drag_group.as_mut() {
                group.into_iter().for_each(|action| merge_drag_step(drag_group, action));
                return;
            }
            state.undo_stack.push(group);
            state.redo_stack.clear();
        }
        self.emit_stack_sizes();
    }

    pub(crate) fn clear_undo_history(&self) {
        {
            let mut state = self.state.lock();
            state.undo_stack.clear();
            state.redo_stack.clear();
        }
        self.emit_stack_sizes();
    }

    fn emit_stack_sizes(&self) {
        let (undo, redo) = {
            let state = self.state.lock();
            (state.undo_stack.len(), state.redo_stack.len())
        };
        self.emit(QuibEvent::UndoStackChanged { undo, redo });
    }

    /// Begin a drag gesture. Assignments until [`end_drag`](Project::end_drag) form one undo
    /// step and `drop` graphics wait for the end of the gesture.
    pub fn start_drag(&self) {
        let mut state = self.state.lock();
        if state.drag_group.is_none() {
            state.drag_group = Some(Vec::new());
            state.last_drag_redraw = None;
        }
    }

    pub fn end_drag(&self) {
        let group = self.state.lock().drag_group.take();
        if let Some(group) = group {
            self.push_undo_group(group);
        }
        self.flush_redraws(false);
    }

    pub fn is_dragging(&self) -> bool {
        self.state.lock().drag_group.is_some()
    }

    /// Run `f` with redraws deferred until it returns, so each graphics quib is redrawn once.
    pub fn aggregate<T>(&self, f: impl FnOnce() -> T) -> T {
        self.state.lock().aggregate_depth += 1;
        let output = f();
        let done = {
            let mut state = self.state.lock();
            state.aggregate_depth -= 1;
            state.aggregate_depth == 0
        };
        if done {
            self.flush_redraws(false);
        }
        output
    }

    /// Redraw every pending graphics quib, including those that only update on refresh.
    pub fn refresh_graphics(&self) {
        self.flush_redraws(true);
    }

    /// Whether a redraw with `update` must wait. Central quibs wait for an explicit refresh,
    /// drop quibs for the end of the drag, drag quibs for the throttle interval.
    fn holds_redraw(&self, state: &ProjectState, update: GraphicsUpdateType, refreshing: bool) -> bool {
        let dragging = state.drag_group.is_some();
        let throttle = Duration::from_millis(self.config.read().drag_redraw_interval_ms);
        match update {
            GraphicsUpdateType::Never => true,
            _ if refreshing => false,
            GraphicsUpdateType::Central => true,
            GraphicsUpdateType::Drop => dragging,
            GraphicsUpdateType::Drag => {
                dragging && !throttle.is_zero() && state.last_drag_redraw.is_some_and(|last| last.elapsed() < throttle)
            }
        }
    }

    pub(crate) fn schedule_redraws(&self, quibs: Vec<Quib>) {
        if quibs.is_empty() {
            return;
        }
        let mut now = Vec::new();
        {
            let mut state = self.state.lock();
            for quib in redraw_order(quibs) {
                let update = quib.graphics_update();
                if update == GraphicsUpdateType::Never {
                    continue;
                }
                if state.aggregate_depth > 0 || self.holds_redraw(&state, update, false) {
                    state.pending_redraws.insert(quib.id(), Arc::downgrade(&quib.0));
                } else {
                    now.push(quib);
                }
            }
            if state.drag_group.is_some() && !now.is_empty() {
                state.last_drag_redraw = Some(Instant::now());
            }
        }
        for quib in now {
            quib.0.redraw();
        }
    }

    fn flush_redraws(&self, refreshing: bool) {
        let ready: Vec<Quib> = {
            let mut state = self.state.lock();
            let pending = mem::take(&mut state.pending_redraws);
            let mut ready = Vec::new();
            for (id, handler) in pending {
                let Some(handler) = handler.upgrade() else {
                    continue;
                };
                let quib = Quib(handler);
                let update = quib.graphics_update();
                if update == GraphicsUpdateType::Never {
                    continue;
                }
                if self.holds_redraw(&state, update, refreshing) {
                    state.pending_redraws.insert(id, Arc::downgrade(&quib.0));
                } else {
                    ready.push(quib);
                }
            }
            if state.drag_group.is_some() && !ready.is_empty() {
                state.last_drag_redraw = Some(Instant::now());
            }
            ready
        };
        for quib in redraw_order(ready) {
            quib.0.redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        func::FuncDefinition,
        path::{array_path, Index},
        tests::{drain_events, init_logging},
        value::Value,
        Arg,
    };

    fn redrawn(events: &[QuibEvent], quib: &Quib) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, QuibEvent::Redrawn(id) if *id == quib.id()))
            .count()
    }

    fn plot_of(project: &Arc<Project>, source: &Quib) -> Quib {
        let plot = FuncDefinition::graphics("plot", |args, _| Ok(args[0].clone())).into_arc();
        project.call(plot, vec![Arg::Source(source.clone())], BTreeMap::new())
    }

    #[test]
    fn test_undo_redo_restores_overrides() {
        init_logging();
        let project = Project::new(GraphConfig::default());
        let a = project.iquib(Value::from_vec(vec![1.0, 2.0]));
        a.assign_at(array_path([Index::Int(0)]), Value::Float(5.0)).unwrap();
        assert!(project.can_undo());
        assert!(project.undo());
        assert_eq!(a.get_value().unwrap(), Value::from_vec(vec![1.0, 2.0]));
        assert!(project.redo());
        assert_eq!(a.get_value().unwrap(), Value::from_vec(vec![5.0, 2.0]));
        assert!(!project.redo());
    }

    #[test]
    fn test_drag_is_one_undo_step() {
        init_logging();
        let project = Project::new(GraphConfig::default());
        let a = project.iquib(Value::Float(0.0));
        project.start_drag();
        for step in 1..=3 {
            a.assign(Value::Float(step as f64)).unwrap();
        }
        assert!(!project.can_undo());
        project.end_drag();
        assert_eq!(a.get_value().unwrap(), Value::Float(3.0));
        assert!(project.undo());
        assert_eq!(a.get_value().unwrap(), Value::Float(0.0));
        assert!(!project.can_undo());
    }

    #[test]
    fn test_drag_keeps_only_final_state() {
        init_logging();
        let project = Project::new(GraphConfig::default());
        let a = project.iquib(Value::from_vec(vec![0.0, 0.0]));
        a.assign_at(array_path([Index::Int(0)]), Value::Float(5.0)).unwrap();
        project.start_drag();
        for step in 1..=4 {
            a.assign_at(array_path([Index::Int(0)]), Value::Float(step as f64)).unwrap();
        }
        a.assign_at(array_path([Index::Int(1)]), Value::Float(9.0)).unwrap();
        project.end_drag();
        assert_eq!(project.state.lock().undo_stack.last().map(Vec::len), Some(2));
        assert_eq!(a.get_value().unwrap(), Value::from_vec(vec![4.0, 9.0]));

        assert!(project.undo());
        assert_eq!(a.get_value().unwrap(), Value::from_vec(vec![5.0, 0.0]));
        assert_eq!(a.overrides().len(), 1);
        assert!(project.redo());
        assert_eq!(a.get_value().unwrap(), Value::from_vec(vec![4.0, 9.0]));
        assert!(project.undo());
        assert!(project.undo());
        assert_eq!(a.get_value().unwrap(), Value::from_vec(vec![0.0, 0.0]));
        assert!(a.overrides().is_empty());
    }

    #[test]
    fn test_central_graphics_wait_for_refresh() {
        init_logging();
        let project = Project::new(GraphConfig::default());
        let events = project.subscribe();
        let a = project.iquib(Value::Float(1.0));
        let plot = plot_of(&project, &a);
        plot.set_graphics_update(Some(GraphicsUpdateType::Central));
        a.assign(Value::Float(2.0)).unwrap();
        assert_eq!(redrawn(&drain_events(&events), &plot), 0);
        project.refresh_graphics();
        assert_eq!(redrawn(&drain_events(&events), &plot), 1);
    }

    #[test]
    fn test_drop_graphics_wait_for_end_of_drag() {
        init_logging();
        let project = Project::new(GraphConfig::default());
        let events = project.subscribe();
        let a = project.iquib(Value::Float(1.0));
        let plot = plot_of(&project, &a);
        plot.set_graphics_update(Some(GraphicsUpdateType::Drop));
        project.start_drag();
        a.assign(Value::Float(2.0)).unwrap();
        a.assign(Value::Float(3.0)).unwrap();
        assert_eq!(redrawn(&drain_events(&events), &plot), 0);
        project.end_drag();
        assert_eq!(redrawn(&drain_events(&events), &plot), 1);
    }

    #[test]
    fn test_aggregate_redraws_once() {
        init_logging();
        let project = Project::new(GraphConfig::default());
        let events = project.subscribe();
        let a = project.iquib(Value::from_vec(vec![1.0, 2.0]));
        let plot = plot_of(&project, &a);
        project.aggregate(|| {
            a.assign_at(array_path([Index::Int(0)]), Value::Float(3.0)).unwrap();
            a.assign_at(array_path([Index::Int(1)]), Value::Float(4.0)).unwrap();
        });
        assert_eq!(redrawn(&drain_events(&events), &plot), 1);
    }
}
