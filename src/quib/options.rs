use std::collections::BTreeSet;

use super::{Quib, QuibId};
use crate::{
    assignment::{Assignment, OverrideChoice, OverrideGroup},
    path::{path_repr, Path},
    QuibError,
};

/// A quib able to take the assignment, with the overrides to remove from the quibs between it
/// and the assigned quib.
#[derive(Debug, Clone)]
pub(crate) struct OverrideOption {
    pub quib: Quib,
    pub assignment: Assignment,
    pub removals: Vec<(Quib, Path)>,
}

/// Where an assignment can go. Options lie on the single-parent chain above the assigned quib;
/// where an inversion splits into several sources, each source gets a branch.
#[derive(Debug, Default)]
pub(crate) struct OverrideOptionsTree {
    pub options: Vec<OverrideOption>,
    pub branches: Vec<OverrideOptionsTree>,
}

impl OverrideOptionsTree {
    pub fn build(root: &Quib, assignment: Assignment) -> Result<OverrideOptionsTree, QuibError> {
        let allowed = root.0.props.read().assigned_quibs.clone();
        let mut tree = OverrideOptionsTree::default();
        tree.walk(root, assignment, Vec::new(), allowed.as_ref())?;
        Ok(tree)
    }

    fn walk(
        &mut self,
        quib: &Quib,
        assignment: Assignment,
        mut removals: Vec<(Quib, Path)>,
        allowed: Option<&BTreeSet<QuibId>>,
    ) -> Result<(), QuibError> {
        let can_override =
            quib.0.props.read().allow_overriding && allowed.map_or(true, |allowed| allowed.contains(&quib.id()));
        if can_override {
            self.options.push(OverrideOption {
                quib: quib.clone(),
                assignment: assignment.clone(),
                removals: removals.clone(),
            });
        }
        let inversals = match quib.0.invert(&assignment) {
            Ok(inversals) => inversals,
            Err(err @ QuibError::CommonAncestor(_)) => return Err(err),
            Err(err) => {
                tracing::debug!("Inversion stops at {quib}: {err}");
                return Ok(());
            }
        };
        removals.push((quib.clone(), assignment.path));
        let parents = quib.parents();
        let parent_of = |id: QuibId| {
            parents
                .iter()
                .find(|parent| parent.id() == id)
                .cloned()
                .ok_or_else(|| QuibError::NotFound(format!("parent {id} of {quib}")))
        };
        match inversals.as_slice() {
            [] => Ok(()),
            [inversal] => self.walk(&parent_of(inversal.source)?, inversal.assignment.clone(), removals, allowed),
            _ => {
                for inversal in &inversals {
                    let mut branch = OverrideOptionsTree::default();
                    branch.walk(&parent_of(inversal.source)?, inversal.assignment.clone(), removals.clone(), allowed)?;
                    self.branches.push(branch);
                }
                Ok(())
            }
        }
    }

    fn can_assign(&self) -> bool {
        !self.options.is_empty() || self.can_diverge()
    }

    fn can_diverge(&self) -> bool {
        !self.branches.is_empty() && self.branches.iter().all(OverrideOptionsTree::can_assign)
    }

    /// Resolve the tree into overrides, asking the root's chooser when more than one outcome
    /// is possible.
    pub fn choose(&self, root: &Quib, assignment: &Assignment, group: &mut OverrideGroup) -> Result<(), QuibError> {
        let can_diverge = self.can_diverge();
        let choice = match (self.options.len(), can_diverge) {
            (0, false) => {
                return Err(QuibError::CannotAssign {
                    quib: root.to_string(),
                    path: path_repr(&assignment.path),
                })
            }
            (1, false) => OverrideChoice::Override(0),
            (0, true) => OverrideChoice::Diverge,
            _ => {
                let candidates: Vec<Quib> = self.options.iter().map(|option| option.quib.clone()).collect();
                root.0.choose_override(&candidates, can_diverge)?
            }
        };
        match choice {
            OverrideChoice::Override(position) => {
                let option = self
                    .options
                    .get(position)
                    .ok_or_else(|| QuibError::InvalidArgument(format!("no override option {position}")))?;
                for (quib, path) in &option.removals {
                    group.add_removal(quib.clone(), path.clone());
                }
                group.add_override(option.quib.clone(), option.assignment.clone());
                Ok(())
            }
            OverrideChoice::Diverge if can_diverge => {
                for branch in &self.branches {
                    branch.choose(root, assignment, group)?;
                }
                Ok(())
            }
            OverrideChoice::Diverge => Err(QuibError::InvalidArgument(
                "cannot diverge: not every branch can be assigned".to_string(),
            )),
        }
    }
}

impl Quib {
    /// Assign a prepared assignment, routing it upstream through inversion.
    pub fn assign_assignment(&self, assignment: Assignment) -> Result<(), QuibError> {
        let assignment = self.resolve_delta(assignment)?;
        let mut group = OverrideGroup::new();
        if assignment.is_default() {
            group.add_override(self.clone(), assignment);
        } else {
            let tree = OverrideOptionsTree::build(self, assignment.clone())?;
            tree.choose(self, &assignment, &mut group)?;
        }
        tracing::debug!(
            "Assigning to {self}: {} overrides, {} removals",
            group.overrides.len(),
            group.removals.len()
        );
        group.apply(&self.0.project)
    }

    /// The options an assignment at `path` would have, without applying anything.
    pub fn get_override_candidates(&self, assignment: Assignment) -> Result<Vec<Quib>, QuibError> {
        let assignment = self.resolve_delta(assignment)?;
        let tree = OverrideOptionsTree::build(self, assignment)?;
        Ok(tree.options.into_iter().map(|option| option.quib).collect())
    }

    fn resolve_delta(&self, assignment: Assignment) -> Result<Assignment, QuibError> {
        match &assignment.value {
            crate::assignment::AssignmentValue::Delta(delta) => {
                let current = crate::path::deep_get(&self.get_value_valid_at_path(&assignment.path)?, &assignment.path)?;
                let value = crate::assignment::overrider::resolve_delta(&current, delta)?;
                Ok(Assignment::new(assignment.path, value))
            }
            _ => Ok(assignment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        path::{array_path, Index},
        project::Project,
        tests::init_logging,
        value::Value,
        GraphConfig,
    };

    #[test]
    fn test_chain_collects_removals() {
        init_logging();
        let project = Project::new(GraphConfig::default());
        let a = project.iquib(Value::from_vec(vec![1.0, 2.0]));
        let b = &a + 1.0;
        b.set_allow_overriding(true);
        let c = &b * 2.0;
        let tree = OverrideOptionsTree::build(&c, Assignment::new(array_path([Index::Int(0)]), Value::Float(10.0))).unwrap();
        let ids: Vec<QuibId> = tree.options.iter().map(|option| option.quib.id()).collect();
        assert_eq!(ids, vec![b.id(), a.id()]);
        assert_eq!(tree.options[0].removals.len(), 1);
        assert_eq!(tree.options[1].removals.len(), 2);
        assert!(tree.branches.is_empty());
    }

    #[test]
    fn test_no_option_cannot_assign() {
        init_logging();
        let project = Project::new(GraphConfig::default());
        let a = project.iquib(Value::from_vec(vec![1.0, 2.0]));
        a.set_allow_overriding(false);
        let b = &a + 1.0;
        let result = b.assign_at(array_path([Index::Int(0)]), Value::Float(3.0));
        assert!(matches!(result, Err(QuibError::CannotAssign { .. })));
    }
}
