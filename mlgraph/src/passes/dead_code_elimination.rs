use std::collections::{HashSet, VecDeque};

use log::debug;

use crate::graph::{Graph, NodeId};
use crate::ops::OpKind;
use crate::passes::GraphPass;

/// Drops every node and edge that cannot reach an `Output` node.
///
/// Reachability is a backward breadth-first walk over input edges from
/// all outputs. A graph without any `Output` node collapses to an empty
/// graph, which is the intended result, not an error.
#[derive(Debug)]
pub struct DeadCodeElimination;

impl GraphPass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "Dead Code Elimination"
    }

    fn description(&self) -> &'static str {
        "Remove unreachable nodes that do not contribute to any output"
    }

    fn run(&self, graph: &Graph) -> Graph {
        let mut queue: VecDeque<NodeId> = graph
            .nodes()
            .filter(|n| n.op == OpKind::Output)
            .map(|n| n.id)
            .collect();
        let mut reachable: HashSet<NodeId> = queue.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            for edge in graph.input_edges(id) {
                if reachable.insert(edge.source.node) {
                    queue.push_back(edge.source.node);
                }
            }
        }

        let mut result = graph.clone();
        result.nodes_mut().retain(|id, _| reachable.contains(id));
        result
            .edges_mut()
            .retain(|e| reachable.contains(&e.source.node) && reachable.contains(&e.target.node));

        let removed = graph.node_count() - result.node_count();
        if removed > 0 {
            debug!("removed {} dead nodes from {}", removed, graph.id());
        }
        result
    }
}
