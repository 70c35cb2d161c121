#![warn(missing_debug_implementations)]
#![allow(clippy::new_without_default)]

//! A neural network computation graph intermediate representation with an
//! optimization pass pipeline.
//!
//! The core type of this crate is [Graph](graph::Graph): a typed dataflow
//! graph of operator nodes connected by tensor-carrying edges. Passes are
//! pure `Graph -> Graph` functions; running a pipeline retains every
//! intermediate snapshot for inspection, and the analysis module computes
//! metrics and structural diffs over any snapshot.
//!
//! ```
//! use mlgraph::analysis::compute_metrics;
//! use mlgraph::dsl::parse_dsl;
//! use mlgraph::passes::{run_pipeline, standard_pipeline};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = parse_dsl(
//!     "model Example {
//!        input x: Tensor<float32>[1, 3, 8, 8]
//!        conv = Conv2D(x, filters=4, kernel=3, padding=1)
//!        act = ReLU(conv)
//!        output act
//!      }",
//! )?;
//!
//! for result in run_pipeline(&graph, &standard_pipeline())? {
//!     let metrics = compute_metrics(&result.graph);
//!     println!("{}: {} nodes, {} flops", result.pass_name, metrics.node_count, metrics.total_flops);
//! }
//! # Ok(())
//! # }
//! ```

/// Snapshot analysis: metrics and structural diffing.
pub mod analysis;
/// Typed attribute values and per-node attribute maps.
pub mod attr;
/// The [DType](dtype::DType) and [TensorType](dtype::TensorType) value types.
pub mod dtype;
/// The core graph datastructure.
pub mod graph;
/// The operator registry and per-operator formulas.
pub mod ops;
/// The optimization passes and the pass pipeline.
pub mod passes;

/// Graphviz export of graph snapshots.
pub mod dot;
/// The declarative model description parser.
pub mod dsl;
