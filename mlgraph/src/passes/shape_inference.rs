use std::collections::HashMap;

use itertools::Itertools;
use log::trace;

use crate::dtype::TensorType;
use crate::graph::{Graph, NodeId};
use crate::passes::GraphPass;

/// Walks the graph in topological order and assigns every node's output
/// ports their inferred tensor type, then refreshes the denormalized copy
/// carried by each edge.
///
/// Source nodes (inputs, constants) seed the propagation with their
/// declared output type. A node whose first input type is still unknown
/// is skipped, its outputs simply stay unset.
#[derive(Debug)]
pub struct ShapeInference;

impl GraphPass for ShapeInference {
    fn name(&self) -> &'static str {
        "Shape Inference"
    }

    fn description(&self) -> &'static str {
        "Propagate tensor shapes through the computation graph"
    }

    fn run(&self, graph: &Graph) -> Graph {
        let mut result = graph.clone();
        let mut computed: HashMap<NodeId, TensorType> = HashMap::new();

        for id in graph.topo_sort() {
            let node = &graph[id];

            let out_ty = if node.inputs.is_empty() {
                node.output_type().cloned()
            } else {
                // each input port has at most one producing edge
                let input_tys = (0..node.inputs.len())
                    .map(|port| {
                        graph
                            .input_edges(id)
                            .find(|e| e.target.port == port)
                            .and_then(|e| computed.get(&e.source.node))
                            .cloned()
                    })
                    .collect_vec();
                node.op.infer_shape(&input_tys, &node.attrs)
            };

            if let Some(ty) = out_ty {
                trace!("{}: {} -> {}", node.op, id, ty);
                result.set_output_types(id, &ty);
                computed.insert(id, ty);
            }
        }

        for edge in result.edges_mut() {
            if let Some(ty) = computed.get(&edge.source.node) {
                edge.ty = Some(ty.clone());
            }
        }

        result
    }
}
