use mlgraph::analysis::{compute_graph_diff, compute_metrics, format_bytes, format_flops};
use mlgraph::dtype::{DType, TensorType};
use mlgraph::graph::{Edge, Graph, Node};
use mlgraph::ops::OpKind;
use mlgraph::passes::{GraphPass, ShapeInference};

fn float32(shape: &[usize]) -> TensorType {
    TensorType::new(DType::F32, shape.to_vec())
}

#[test]
fn counts_match_graph_exactly() {
    let mut graph = Graph::new("counts", "");
    let x = graph.add_node(Node::input("x", float32(&[1, 4])));
    let relu = graph.add_node(Node::new(OpKind::ReLU, "relu", 1));
    let sigmoid = graph.add_node(Node::new(OpKind::Sigmoid, "sigmoid", 1));
    let out = graph.add_node(Node::output("out"));
    graph.add_edge(Edge::between(x, 0, relu, 0));
    graph.add_edge(Edge::between(relu, 0, sigmoid, 0));
    graph.add_edge(Edge::between(sigmoid, 0, out, 0));

    let metrics = compute_metrics(&graph);
    assert_eq!(metrics.node_count, graph.node_count());
    assert_eq!(metrics.edge_count, graph.edge_count());
    assert_eq!(metrics.op_counts.get(&OpKind::ReLU), Some(&1));
    assert_eq!(metrics.op_counts.get(&OpKind::Output), Some(&1));
    assert_eq!(metrics.op_counts.get(&OpKind::Conv2D), None);
    assert_eq!(metrics.op_counts.values().sum::<usize>(), graph.node_count());
}

#[test]
fn conv_cost_formulas() {
    let mut graph = Graph::new("conv", "");
    let x = graph.add_node(Node::input("x", float32(&[1, 3, 8, 8])));
    let conv = graph.add_node(
        Node::new(OpKind::Conv2D, "conv", 1)
            .with_attr("filters", 4i64)
            .with_attr("kernel", 3i64)
            .with_attr("padding", 1i64),
    );
    let out = graph.add_node(Node::output("out"));
    graph.add_edge(Edge::between(x, 0, conv, 0));
    graph.add_edge(Edge::between(conv, 0, out, 0));

    let metrics = compute_metrics(&ShapeInference.run(&graph));

    // output elements 1*4*8*8 = 256, input channels 3, kernel 3
    assert_eq!(metrics.total_flops, 256 * 3 * 3 * 3 * 2);
    // weights 4*3*3*3 plus bias 4
    assert_eq!(metrics.total_params, 4 * 3 * 3 * 3 + 4);
    // x (768 bytes) + conv output (1024 bytes)
    assert_eq!(metrics.total_memory_bytes, 768 + 1024);
    assert_eq!(metrics.depth, 2);
}

#[test]
fn matmul_cost_formulas() {
    let mut graph = Graph::new("mm", "");
    let x = graph.add_node(Node::input("x", float32(&[1, 128])));
    let w = graph.add_node(Node::constant("w", Some(float32(&[128, 64]))));
    let mm = graph.add_node(Node::new(OpKind::MatMul, "mm", 2));
    let out = graph.add_node(Node::output("out"));
    graph.add_edge(Edge::between(x, 0, mm, 0));
    graph.add_edge(Edge::between(w, 0, mm, 1));
    graph.add_edge(Edge::between(mm, 0, out, 0));

    let metrics = compute_metrics(&ShapeInference.run(&graph));

    // 64 output elements, contraction dim 128
    assert_eq!(metrics.total_flops, 64 * 128 * 2);
    assert_eq!(metrics.total_params, 128 * 64 + 64);
}

#[test]
fn depth_is_the_longest_chain() {
    // x -> a -> b -> out next to a direct x -> out2 shortcut
    let mut graph = Graph::new("depth", "");
    let x = graph.add_node(Node::input("x", float32(&[4])));
    let a = graph.add_node(Node::new(OpKind::ReLU, "a", 1));
    let b = graph.add_node(Node::new(OpKind::Sigmoid, "b", 1));
    let out = graph.add_node(Node::output("out"));
    let out2 = graph.add_node(Node::output("out2"));
    graph.add_edge(Edge::between(x, 0, a, 0));
    graph.add_edge(Edge::between(a, 0, b, 0));
    graph.add_edge(Edge::between(b, 0, out, 0));
    graph.add_edge(Edge::between(x, 0, out2, 0));

    assert_eq!(compute_metrics(&graph).depth, 3);
}

#[test]
fn diff_partitions_by_id() {
    let mut before = Graph::new("before", "");
    let x = before.add_node(Node::input("x", float32(&[4])));
    let relu = before.add_node(Node::new(OpKind::ReLU, "relu", 1));
    let out = before.add_node(Node::output("out"));
    before.add_edge(Edge::between(x, 0, relu, 0));
    let dropped_edge = before.add_edge(Edge::between(relu, 0, out, 0));

    let mut after = before.clone();
    after.set_node_name(relu, "renamed");
    let added = after.add_node(Node::constant("c", None));
    after.remove_node(out);

    let diff = compute_graph_diff(&before, &after);
    assert_eq!(diff.added_nodes, vec![added]);
    assert_eq!(diff.removed_nodes, vec![out]);
    assert_eq!(diff.modified_nodes, vec![relu]);
    assert!(diff.added_edges.is_empty());
    assert_eq!(diff.removed_edges, vec![dropped_edge]);

    assert!(compute_graph_diff(&before, &before).is_empty());
}

#[test]
fn byte_formatting_thresholds() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(512), "512 B");
    assert_eq!(format_bytes(2048), "2.0 KB");
    assert_eq!(format_bytes(802_816), "784.0 KB");
    assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
}

#[test]
fn flop_formatting_thresholds() {
    assert_eq!(format_flops(999), "999");
    assert_eq!(format_flops(1_500), "1.5K");
    assert_eq!(format_flops(2_000_000), "2.0M");
    assert_eq!(format_flops(13_824), "13.8K");
    assert_eq!(format_flops(3_000_000_000), "3.0G");
    assert_eq!(format_flops(1_500_000_000_000), "1.50T");
}
