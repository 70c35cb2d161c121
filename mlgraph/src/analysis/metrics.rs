use std::collections::HashMap;

use indexmap::IndexMap;

use crate::graph::{Graph, NodeId};
use crate::ops::OpKind;

/// Summary statistics over a single graph snapshot.
#[derive(Debug, Clone)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    /// Node count per operator kind, in first-seen order.
    pub op_counts: IndexMap<OpKind, usize>,
    pub total_flops: u64,
    pub total_params: u64,
    /// Sum of all output tensor sizes, ignoring any buffer reuse.
    pub total_memory_bytes: u64,
    /// Length of the longest dependency chain.
    pub depth: usize,
}

/// Compute metrics for a snapshot. Read-only; estimators use the
/// per-operator formulas colocated on [OpKind], with operand types read
/// through each node's input edges.
pub fn compute_metrics(graph: &Graph) -> GraphMetrics {
    let mut op_counts: IndexMap<OpKind, usize> = IndexMap::new();
    let mut total_flops = 0;
    let mut total_params = 0;
    let mut total_memory_bytes = 0;

    for node in graph.nodes() {
        *op_counts.entry(node.op).or_insert(0) += 1;

        let first_input = graph
            .input_edges(node.id)
            .find(|e| e.target.port == 0)
            .and_then(|e| e.ty.as_ref());
        let output = node.output_type();

        total_flops += node.op.estimate_flops(output, first_input, &node.attrs);
        total_params += node.op.estimate_params(first_input, output, &node.attrs);
        if let Some(ty) = output {
            total_memory_bytes += ty.byte_size() as u64;
        }
    }

    // longest chain: one forward sweep accumulating max(producer) + 1
    let mut node_depth: HashMap<NodeId, usize> = HashMap::new();
    let mut depth = 0;
    for id in graph.topo_sort() {
        let d = graph
            .input_edges(id)
            .map(|e| node_depth.get(&e.source.node).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        node_depth.insert(id, d);
        depth = depth.max(d);
    }

    GraphMetrics {
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        op_counts,
        total_flops,
        total_params,
        total_memory_bytes,
        depth,
    }
}

/// Human-readable byte count, 1024 steps, two decimals at the largest unit.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}

/// Human-readable FLOP count, 1000 steps, two decimals at the largest unit.
pub fn format_flops(flops: u64) -> String {
    if flops < 1_000 {
        format!("{}", flops)
    } else if flops < 1_000_000 {
        format!("{:.1}K", flops as f64 / 1e3)
    } else if flops < 1_000_000_000 {
        format!("{:.1}M", flops as f64 / 1e6)
    } else if flops < 1_000_000_000_000 {
        format!("{:.1}G", flops as f64 / 1e9)
    } else {
        format!("{:.2}T", flops as f64 / 1e12)
    }
}
