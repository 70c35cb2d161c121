use std::collections::HashMap;

use itertools::Itertools;
use log::debug;

use crate::attr::AttrValue;
use crate::graph::{Graph, MemorySummary, Node, NodeId};
use crate::ops::OpKind;
use crate::passes::GraphPass;

/// One planned output buffer.
#[derive(Debug, Clone)]
pub struct MemoryAllocation {
    pub node: NodeId,
    pub offset: u64,
    pub size: u64,
    /// First and last topological rank at which the buffer must stay valid:
    /// birth is the producing node's rank, death the maximum consumer rank.
    pub live_range: (usize, usize),
    pub in_place: bool,
}

/// The full result of memory planning for one snapshot.
#[derive(Debug, Clone)]
pub struct MemoryPlan {
    pub allocations: Vec<MemoryAllocation>,
    pub peak_bytes: u64,
    pub total_tensor_bytes: u64,
    pub in_place_count: usize,
}

// Operators whose output may reuse their sole input's buffer.
const IN_PLACE_OPS: &[OpKind] = &[
    OpKind::ReLU,
    OpKind::GELU,
    OpKind::Sigmoid,
    OpKind::BatchNorm,
    OpKind::LayerNorm,
];

/// Liveness analysis plus greedy first-fit packing.
///
/// This is a peak-footprint estimator, not a real allocator: a buffer's
/// range is never returned to the free list when its tensor dies, so the
/// free list only ever holds split remainders and the arena only grows.
/// Only nodes with a known output type participate; run shape inference
/// first for a meaningful estimate.
pub fn compute_memory_plan(graph: &Graph) -> MemoryPlan {
    let order = graph.topo_sort();
    let rank: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut allocations = Vec::new();
    for &id in &order {
        let node = &graph[id];
        if node.op == OpKind::Output {
            continue;
        }
        let Some(out_ty) = node.output_type() else {
            continue;
        };

        let birth = rank[&id];
        let death = graph
            .output_edges(id)
            .map(|e| rank.get(&e.target.node).copied().unwrap_or(birth))
            .fold(birth, usize::max);

        let in_place = is_in_place(graph, node);
        allocations.push(MemoryAllocation {
            node: id,
            offset: 0,
            size: if in_place { 0 } else { out_ty.byte_size() as u64 },
            live_range: (birth, death),
            in_place,
        });
    }

    // first-fit over the free ranges, extending the arena tail when
    // nothing fits; leftover bytes of a used range split back into the list
    let mut free_list: Vec<(u64, u64)> = Vec::new();
    let mut tail: u64 = 0;

    let by_birth = allocations
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.in_place)
        .sorted_by_key(|(_, a)| a.live_range.0)
        .map(|(i, _)| i)
        .collect_vec();

    for i in by_birth {
        let size = allocations[i].size;
        match free_list.iter().position(|&(_, free)| free >= size) {
            Some(slot) => {
                let (offset, free) = free_list[slot];
                allocations[i].offset = offset;
                if free > size {
                    free_list[slot] = (offset + size, free - size);
                } else {
                    free_list.remove(slot);
                }
            }
            None => {
                allocations[i].offset = tail;
                tail += size;
            }
        }
    }

    let total_tensor_bytes = allocations.iter().map(|a| a.size).sum();
    let in_place_count = allocations.iter().filter(|a| a.in_place).count();

    MemoryPlan {
        allocations,
        peak_bytes: tail,
        total_tensor_bytes,
        in_place_count,
    }
}

/// In-place requires a single-input operator from the unary/normalization
/// set whose producer has no other consumer.
fn is_in_place(graph: &Graph, node: &Node) -> bool {
    if !IN_PLACE_OPS.contains(&node.op) {
        return false;
    }

    let input_edges = graph.input_edges(node.id).collect_vec();
    if input_edges.len() != 1 {
        return false;
    }

    let producer = input_edges[0].source.node;
    graph.node(producer).is_some() && graph.output_edges(producer).count() == 1
}

/// Runs [compute_memory_plan] and writes the result back onto the graph:
/// per-node placement into the annotation side-table, the whole-graph
/// summary into the metadata.
#[derive(Debug)]
pub struct MemoryPlanning;

impl GraphPass for MemoryPlanning {
    fn name(&self) -> &'static str {
        "Memory Planning"
    }

    fn description(&self) -> &'static str {
        "Estimate peak buffer memory with liveness analysis and in-place operation detection"
    }

    fn run(&self, graph: &Graph) -> Graph {
        let plan = compute_memory_plan(graph);
        let mut result = graph.clone();

        for alloc in &plan.allocations {
            if let Some(node) = result.node_mut(alloc.node) {
                node.annotations.insert("offset".to_owned(), AttrValue::Int(alloc.offset as i64));
                node.annotations.insert("size".to_owned(), AttrValue::Int(alloc.size as i64));
                node.annotations.insert(
                    "live_range".to_owned(),
                    AttrValue::Ints(vec![alloc.live_range.0 as i64, alloc.live_range.1 as i64]),
                );
                node.annotations.insert("in_place".to_owned(), AttrValue::Bool(alloc.in_place));
            }
        }

        result.metadata.memory_plan = Some(MemorySummary {
            peak_bytes: plan.peak_bytes,
            total_tensor_bytes: plan.total_tensor_bytes,
            in_place_count: plan.in_place_count,
        });

        debug!(
            "planned {} buffers for {}: peak {} bytes, {} in-place",
            plan.allocations.len(),
            graph.id(),
            plan.peak_bytes,
            plan.in_place_count
        );
        result
    }
}
