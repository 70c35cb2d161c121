mod diff;
mod metrics;

pub use diff::{compute_graph_diff, GraphDiff};
pub use metrics::{compute_metrics, format_bytes, format_flops, GraphMetrics};
