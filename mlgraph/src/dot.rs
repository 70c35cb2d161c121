use std::io::Write;

use crate::graph::Graph;

/// Render a graph snapshot as a graphviz `digraph`.
///
/// Every node becomes a box filled with its operator category's color,
/// labeled with name, kind, inferred output type and the interesting
/// operator parameters. Edges are labeled with their carried tensor type.
/// Presentation only, layout is left entirely to graphviz.
pub fn graph_to_dot(mut f: impl Write, graph: &Graph) -> std::io::Result<()> {
    writeln!(f, "digraph {{")?;
    writeln!(f, "  rankdir=TB;")?;
    writeln!(f, "  node [fontname=\"monospace\"];")?;
    writeln!(f)?;

    for node in graph.nodes() {
        let color = node.op.signature().category.color();

        let mut label = format!("{}\\n{}", node.name, node.op);
        if let Some(ty) = node.output_type() {
            label.push_str(&format!("\\n{}", ty));
        }
        for (key, value) in &node.attrs {
            if matches!(key.as_str(), "filters" | "kernel" | "stride" | "padding" | "axis") {
                label.push_str(&format!("\\n{}={}", key, value));
            }
        }

        writeln!(
            f,
            "  {} [label=\"{}\", shape=box, style=filled, fillcolor={:?}, width=2]",
            node.id, label, color,
        )?;
    }

    writeln!(f)?;

    for edge in graph.edges() {
        match &edge.ty {
            Some(ty) => writeln!(
                f,
                "  {} -> {} [label=\"{}\"]",
                edge.source.node, edge.target.node, ty
            )?,
            None => writeln!(f, "  {} -> {}", edge.source.node, edge.target.node)?,
        }
    }

    writeln!(f, "}}")?;
    Ok(())
}
