use serde::{Deserialize, Serialize};

use crate::{
    quib::{Quib, QuibId},
    QuibError,
};

/// The answer of an [`OverrideChooser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideChoice {
    /// Override the candidate at this position.
    Override(usize),
    /// Apply the change independently on each branch of the inversion.
    Diverge,
}

/// Decides where an ambiguous assignment lands. Returning
/// [`QuibError::OperationCancelled`] abandons the assignment with nothing changed.
pub trait OverrideChooser: Send + Sync {
    fn choose(&self, candidates: &[Quib], can_diverge: bool) -> Result<OverrideChoice, QuibError>;
}

impl<F> OverrideChooser for F
where
    F: Fn(&[Quib], bool) -> Result<OverrideChoice, QuibError> + Send + Sync,
{
    fn choose(&self, candidates: &[Quib], can_diverge: bool) -> Result<OverrideChoice, QuibError> {
        self(candidates, can_diverge)
    }
}

/// Key under which an assigned quib remembers a choice, so an identical situation is not asked
/// about twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChoiceContext {
    pub candidates: Vec<QuibId>,
    pub can_diverge: bool,
}

impl ChoiceContext {
    pub fn new(candidates: &[Quib], can_diverge: bool) -> ChoiceContext {
        ChoiceContext {
            candidates: candidates.iter().map(Quib::id).collect(),
            can_diverge,
        }
    }
}
