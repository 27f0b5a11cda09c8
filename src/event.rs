use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    path::{path_repr, Path},
    quib::QuibId,
};

/// Notifications sent to the consumer registered with
/// [`Project::subscribe`](crate::project::Project::subscribe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuibEvent {
    /// A graphics quib was re-evaluated.
    Redrawn(QuibId),
    /// The override log of a quib changed at these paths.
    OverridesChanged { quib: QuibId, paths: Vec<Path> },
    /// A quib's cache was invalidated at a path after an upstream change.
    Invalidated { quib: QuibId, path: Path },
    /// The undo or redo stack changed size.
    UndoStackChanged { undo: usize, redo: usize },
}

impl Display for QuibEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QuibEvent::Redrawn(quib) => write!(f, "Redrawn(quib {quib})"),
            QuibEvent::OverridesChanged { quib, paths } => {
                let paths = paths.iter().map(|path| path_repr(path)).collect::<Vec<_>>();
                write!(f, "OverridesChanged(quib {quib}, [{}])", paths.join(", "))
            }
            QuibEvent::Invalidated { quib, path } => write!(f, "Invalidated(quib {quib}, {})", path_repr(path)),
            QuibEvent::UndoStackChanged { undo, redo } => write!(f, "UndoStackChanged({undo}, {redo})"),
        }
    }
}
