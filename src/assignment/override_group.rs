use super::Assignment;
use crate::{path::Path, project::Project, quib::Quib, QuibError};

/// A change to one quib's override log.
#[derive(Debug, Clone)]
pub struct QuibChange {
    pub quib: Quib,
    pub assignment: Assignment,
}

/// The overrides and override removals resulting from one user assignment, applied together
/// and undone together.
#[derive(Debug, Clone, Default)]
pub struct OverrideGroup {
    pub overrides: Vec<QuibChange>,
    /// Overrides of intermediate quibs that would hide the new value from the assigned quib.
    pub removals: Vec<QuibChange>,
}

impl OverrideGroup {
    pub fn new() -> OverrideGroup {
        OverrideGroup::default()
    }

    pub fn add_override(&mut self, quib: Quib, assignment: Assignment) {
        self.overrides.push(QuibChange { quib, assignment });
    }

    pub fn add_removal(&mut self, quib: Quib, path: Path) {
        self.removals.push(QuibChange {
            quib,
            assignment: Assignment::default_at(path),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty() && self.removals.is_empty()
    }

    /// Apply removals, then overrides, as a single undo step. Every change is prepared before
    /// the first is stored, so a failing template leaves all quibs untouched.
    pub fn apply(self, project: &Project) -> Result<(), QuibError> {
        let mut prepared = Vec::with_capacity(self.removals.len() + self.overrides.len());
        for change in self.removals.into_iter().chain(self.overrides) {
            if let Some(assignment) = change.quib.0.prepare_assignment(change.assignment)? {
                prepared.push((change.quib, assignment));
            }
        }
        let actions = project.aggregate(|| {
            prepared
                .into_iter()
                .map(|(quib, assignment)| quib.0.commit_assignment(assignment))
                .collect::<Vec<_>>()
        });
        project.push_undo_group(actions);
        Ok(())
    }
}
