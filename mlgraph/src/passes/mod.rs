use log::debug;

use crate::graph::{Graph, GraphError};

mod constant_folding;
mod dead_code_elimination;
mod memory_planning;
mod operator_fusion;
mod shape_inference;

pub use constant_folding::ConstantFolding;
pub use dead_code_elimination::DeadCodeElimination;
pub use memory_planning::{compute_memory_plan, MemoryAllocation, MemoryPlan, MemoryPlanning};
pub use operator_fusion::OperatorFusion;
pub use shape_inference::ShapeInference;

/// A single transformation or analysis step over the graph IR.
///
/// Passes are pure: `run` never modifies its input and returns a new
/// graph value, so every intermediate snapshot of a pipeline stays valid.
/// Over well-formed graphs (see [Graph::validate]) passes are total and
/// never fail.
pub trait GraphPass {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn run(&self, graph: &Graph) -> Graph;
}

/// One snapshot produced by a pipeline, with the pass that produced it.
#[derive(Debug, Clone)]
pub struct PassResult {
    pub graph: Graph,
    pub pass_name: &'static str,
    pub description: &'static str,
}

/// Apply a single pass and append it to the snapshot's pass history.
///
/// The graph is validated first so structural errors surface here, with a
/// descriptive error, rather than inside the pass.
pub fn run_pass(graph: &Graph, pass: &dyn GraphPass) -> Result<PassResult, GraphError> {
    graph.validate()?;

    debug!("running {:?} on {}", pass.name(), graph.id());
    let mut result = pass.run(graph);
    result.record_pass(pass.name(), pass.description());

    Ok(PassResult {
        graph: result,
        pass_name: pass.name(),
        description: pass.description(),
    })
}

/// Apply passes in order, threading each result into the next pass and
/// retaining every intermediate snapshot.
pub fn run_pipeline(graph: &Graph, passes: &[&dyn GraphPass]) -> Result<Vec<PassResult>, GraphError> {
    graph.validate()?;

    let mut results = Vec::with_capacity(passes.len());
    let mut current = graph.clone();

    for &pass in passes {
        let result = run_pass(&current, pass)?;
        current = result.graph.clone();
        results.push(result);
    }

    Ok(results)
}

/// The standard pass order: shapes first (fusion and planning need them),
/// folding before elimination (folds strand orphan constants), fusion
/// before planning (planning must see the final node set).
pub fn standard_pipeline() -> [&'static dyn GraphPass; 5] {
    [
        &ShapeInference,
        &ConstantFolding,
        &DeadCodeElimination,
        &OperatorFusion,
        &MemoryPlanning,
    ]
}
