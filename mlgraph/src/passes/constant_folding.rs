use itertools::Itertools;
use log::debug;

use crate::attr::AttrValue;
use crate::graph::{Graph, Node, NodeId};
use crate::ops::OpKind;
use crate::passes::GraphPass;

/// Replaces every non-I/O node whose inputs are all constants with a
/// single constant node carrying the replaced node's inferred type.
///
/// The scan restarts after each replacement so newly all-constant nodes
/// fold too; constants stranded without consumers are pruned along the
/// way. Worst case O(n^2) over repeated scans, fine at the expected graph
/// sizes of tens to low hundreds of nodes.
#[derive(Debug)]
pub struct ConstantFolding;

impl GraphPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "Constant Folding"
    }

    fn description(&self) -> &'static str {
        "Evaluate subgraphs with all-constant inputs at compile time"
    }

    fn run(&self, graph: &Graph) -> Graph {
        let mut result = graph.clone();
        while let Some(id) = fold_candidate(&result) {
            fold_node(&mut result, id);
        }
        result
    }
}

fn fold_candidate(graph: &Graph) -> Option<NodeId> {
    graph.nodes().find(|node| can_fold(graph, node)).map(|n| n.id)
}

fn can_fold(graph: &Graph, node: &Node) -> bool {
    if matches!(node.op, OpKind::Input | OpKind::Output | OpKind::Constant) {
        return false;
    }

    let mut edges = graph.input_edges(node.id).peekable();
    if edges.peek().is_none() {
        return false;
    }
    edges.all(|e| {
        graph
            .node(e.source.node)
            .map_or(false, |src| src.op == OpKind::Constant)
    })
}

fn fold_node(result: &mut Graph, id: NodeId) {
    let (op, name, out_ty) = {
        let node = &result[id];
        (node.op, node.name.clone(), node.output_type().cloned())
    };

    let constant = Node::constant(format!("folded_{}", name), out_ty)
        .with_attr("folded_from", AttrValue::Op(op))
        .with_attr("original_name", AttrValue::Str(name.clone()));
    let new_id = constant.id;
    debug!("folding {} {:?} into constant {}", op, name, new_id);

    // edges into the folded node are dropped, edges out of it now
    // originate from the new constant (keeping their ids)
    result.edges_mut().retain(|e| e.target.node != id);
    for edge in result.edges_mut() {
        if edge.source.node == id {
            edge.source.node = new_id;
        }
    }
    result.remove_node(id);
    result.add_node(constant);

    prune_orphan_constants(result, new_id);
}

/// Remove every constant (other than `keep`) that no longer has a consumer.
fn prune_orphan_constants(result: &mut Graph, keep: NodeId) {
    let orphans = result
        .nodes()
        .filter(|n| n.op == OpKind::Constant && n.id != keep)
        .filter(|n| result.output_edges(n.id).next().is_none())
        .map(|n| n.id)
        .collect_vec();

    for id in orphans {
        debug!("pruning unused constant {}", id);
        result.remove_node(id);
    }
}
