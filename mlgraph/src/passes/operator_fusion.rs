use itertools::Itertools;
use log::debug;

use crate::attr::AttrValue;
use crate::graph::{Graph, Node, NodeId};
use crate::ops::OpKind;
use crate::passes::GraphPass;

/// A linear chain of operator kinds replaced by a single fused kind.
#[derive(Debug)]
struct FusionPattern {
    name: &'static str,
    ops: &'static [OpKind],
    fused: OpKind,
}

// Tried strictly in this order, and the first match (scanning nodes in
// insertion order) wins. The order is the tie-break that keeps fusion
// results reproducible, do not reorder.
const FUSION_PATTERNS: &[FusionPattern] = &[
    FusionPattern {
        name: "Conv2D + BatchNorm + ReLU",
        ops: &[OpKind::Conv2D, OpKind::BatchNorm, OpKind::ReLU],
        fused: OpKind::FusedConvBNReLU,
    },
    FusionPattern {
        name: "Conv2D + BatchNorm",
        ops: &[OpKind::Conv2D, OpKind::BatchNorm],
        fused: OpKind::FusedConvBNReLU,
    },
    FusionPattern {
        name: "MatMul + Add",
        ops: &[OpKind::MatMul, OpKind::Add],
        fused: OpKind::FusedMatMulAdd,
    },
];

/// Collapses matching operator chains into single fused nodes, repeating
/// until no pattern matches anywhere.
///
/// A chain only matches if it is unbranched: every non-final link must be
/// the sole outgoing edge of its node and the sole edge into the next
/// node from it. The fused node takes the first node's inputs and the
/// last node's outputs and records the replaced sub-chain in its
/// attributes.
#[derive(Debug)]
pub struct OperatorFusion;

impl GraphPass for OperatorFusion {
    fn name(&self) -> &'static str {
        "Operator Fusion"
    }

    fn description(&self) -> &'static str {
        "Fuse sequences of operators into single optimized kernels (Conv+BN+ReLU, MatMul+Add)"
    }

    fn run(&self, graph: &Graph) -> Graph {
        let mut result = graph.clone();

        'restart: loop {
            for pattern in FUSION_PATTERNS {
                for id in result.node_ids().collect_vec() {
                    if result[id].op != pattern.ops[0] {
                        continue;
                    }
                    if let Some(chain) = find_chain(&result, id, pattern.ops) {
                        fuse_chain(&mut result, &chain, pattern);
                        // rescan from the first pattern after every rewrite
                        continue 'restart;
                    }
                }
            }
            break;
        }

        result
    }
}

/// Try to match `ops` as an unbranched chain starting at `start`.
fn find_chain(graph: &Graph, start: NodeId, ops: &[OpKind]) -> Option<Vec<NodeId>> {
    let mut chain = Vec::with_capacity(ops.len());
    let mut current = start;

    for (step, &expected) in ops.iter().enumerate() {
        let node = graph.node(current)?;
        if node.op != expected {
            return None;
        }
        chain.push(current);

        if step + 1 < ops.len() {
            let out_edges = graph.output_edges(current).collect_vec();
            if out_edges.len() != 1 {
                return None;
            }
            let next = out_edges[0].target.node;
            graph.node(next)?;

            // the next node may have other operands (eg. a bias constant),
            // but exactly one edge from the current chain node
            let from_current = graph.input_edges(next).filter(|e| e.source.node == current).count();
            if from_current != 1 {
                return None;
            }

            current = next;
        }
    }

    Some(chain)
}

fn fuse_chain(result: &mut Graph, chain: &[NodeId], pattern: &FusionPattern) {
    let first = chain[0];
    let last = *chain.last().unwrap();

    let ops = chain.iter().map(|&id| result[id].op).collect_vec();
    let names = chain.iter().map(|&id| result[id].name.clone()).collect_vec();
    let first_inputs = result[first].inputs.clone();
    let last_outputs = result[last].outputs.clone();
    let first_attrs = result[first].attrs.clone();

    let mut fused = Node::new(pattern.fused, format!("fused_{}", names.iter().join("_")), first_inputs.len());
    fused.inputs = first_inputs;
    fused.outputs = last_outputs;
    fused.attrs.insert("fused_from".to_owned(), AttrValue::Ops(ops));
    fused.attrs.insert("fused_names".to_owned(), AttrValue::Strs(names.clone()));
    fused.attrs.insert("pattern".to_owned(), AttrValue::Str(pattern.name.to_owned()));
    // the first chain node's own parameters win on key collision
    for (key, value) in &first_attrs {
        fused.attrs.insert(key.clone(), value.clone());
    }
    let fused_id = fused.id;

    // Rewire: edges into the first node and out of the last node are
    // redirected to the fused node (keeping their ids), edges internal to
    // the chain vanish, and any other edge touching the chain indicated
    // an unsupported branch and is dropped.
    let in_chain = |id: NodeId| chain.contains(&id);
    let mut kept = Vec::with_capacity(result.edges().len());
    for edge in result.edges().iter().cloned() {
        let src_in = in_chain(edge.source.node);
        let tgt_in = in_chain(edge.target.node);

        if src_in && tgt_in {
            continue;
        } else if tgt_in && edge.target.node == first {
            let mut edge = edge;
            edge.target.node = fused_id;
            kept.push(edge);
        } else if src_in && edge.source.node == last {
            let mut edge = edge;
            edge.source.node = fused_id;
            kept.push(edge);
        } else if !src_in && !tgt_in {
            kept.push(edge);
        }
    }
    *result.edges_mut() = kept;

    for &id in chain {
        result.remove_node(id);
    }
    result.add_node(fused);

    debug!("fused [{}] into {} ({:?})", names.iter().join(", "), fused_id, pattern.name);
}
