use std::collections::HashSet;

use crate::graph::{EdgeId, Graph, NodeId};

/// Structural difference between two snapshots.
///
/// Matching is by id equality only: a node counts as modified when the
/// same id carries a different operator kind or name. No positional or
/// semantic matching is attempted.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct GraphDiff {
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub modified_nodes: Vec<NodeId>,
    pub added_edges: Vec<EdgeId>,
    pub removed_edges: Vec<EdgeId>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.modified_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

pub fn compute_graph_diff(before: &Graph, after: &Graph) -> GraphDiff {
    let mut diff = GraphDiff::default();

    for node in after.nodes() {
        match before.node(node.id) {
            None => diff.added_nodes.push(node.id),
            Some(old) => {
                if old.op != node.op || old.name != node.name {
                    diff.modified_nodes.push(node.id);
                }
            }
        }
    }
    for node in before.nodes() {
        if after.node(node.id).is_none() {
            diff.removed_nodes.push(node.id);
        }
    }

    let before_edges: HashSet<EdgeId> = before.edges().iter().map(|e| e.id).collect();
    let after_edges: HashSet<EdgeId> = after.edges().iter().map(|e| e.id).collect();
    diff.added_edges = after
        .edges()
        .iter()
        .map(|e| e.id)
        .filter(|id| !before_edges.contains(id))
        .collect();
    diff.removed_edges = before
        .edges()
        .iter()
        .map(|e| e.id)
        .filter(|id| !after_edges.contains(id))
        .collect();

    diff
}
