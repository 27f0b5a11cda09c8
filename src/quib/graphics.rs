use petgraph::{algo::toposort, graphmap::DiGraphMap};
use std::collections::{BTreeMap, BTreeSet};

use super::{Quib, QuibId};

/// `quibs` ordered so that a graphics quib is redrawn after every graphics quib it depends on.
pub(crate) fn redraw_order(quibs: Vec<Quib>) -> Vec<Quib> {
    let by_id: BTreeMap<QuibId, Quib> = quibs.into_iter().map(|quib| (quib.id(), quib)).collect();
    let mut graph = DiGraphMap::<QuibId, ()>::new();
    for (id, quib) in &by_id {
        graph.add_node(*id);
        for ancestor in quib.0.ancestor_ids() {
            if ancestor != *id && by_id.contains_key(&ancestor) {
                graph.add_edge(ancestor, *id, ());
            }
        }
    }
    match toposort(&graph, None) {
        Ok(order) => order.into_iter().filter_map(|id| by_id.get(&id).cloned()).collect(),
        Err(cycle) => {
            tracing::warn!("Dependency cycle through quib {}; redrawing in id order", cycle.node_id());
            by_id.into_values().collect()
        }
    }
}

/// Edges from each quib to its children, over everything reachable from `roots` in either
/// direction.
pub fn dependency_graph(roots: &[Quib]) -> DiGraphMap<QuibId, ()> {
    let mut graph = DiGraphMap::new();
    let mut seen = BTreeSet::new();
    let mut pending: Vec<Quib> = roots.to_vec();
    while let Some(quib) = pending.pop() {
        if !seen.insert(quib.id()) {
            continue;
        }
        graph.add_node(quib.id());
        for parent in quib.parents() {
            graph.add_edge(parent.id(), quib.id(), ());
            pending.push(parent);
        }
        for child in quib.children() {
            graph.add_edge(quib.id(), child.id(), ());
            pending.push(child);
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{func::FuncDefinition, project::Project, tests::init_logging, value::Value, Arg, GraphConfig};

    #[test]
    fn test_upstream_graphics_first() {
        init_logging();
        let project = Project::new(GraphConfig::default());
        let a = project.iquib(Value::Float(1.0));
        let plot = FuncDefinition::graphics("plot", |args, _| Ok(args[0].clone())).into_arc();
        let first = project.call(plot.clone(), vec![Arg::Source(a.clone())], BTreeMap::new());
        let second = project.call(plot, vec![Arg::Source(first.clone())], BTreeMap::new());
        let order = redraw_order(vec![second.clone(), first.clone()]);
        assert_eq!(order, vec![first, second]);
    }

    #[test]
    fn test_dependency_graph_spans_both_directions() {
        init_logging();
        let project = Project::new(GraphConfig::default());
        let a = project.iquib(Value::Float(1.0));
        let b = &a + 1.0;
        let c = &b * 2.0;
        let graph = dependency_graph(&[b.clone()]);
        assert_eq!(graph.node_count(), 3);
        assert!(graph.contains_edge(a.id(), b.id()));
        assert!(graph.contains_edge(b.id(), c.id()));
    }
}
