use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use mlgraph::analysis::{compute_graph_diff, compute_metrics, format_bytes, format_flops};
use mlgraph::dot::graph_to_dot;
use mlgraph::dsl::parse_dsl_with_implicit_output;
use mlgraph::passes::{
    run_pipeline, standard_pipeline, ConstantFolding, DeadCodeElimination, GraphPass,
    MemoryPlanning, OperatorFusion, ShapeInference,
};

/// Optimize a declarative model description and report per-pass statistics.
#[derive(Debug, Parser)]
#[command(name = "mlg")]
struct Args {
    /// Path to the model description file.
    model: PathBuf,

    /// Write the final snapshot as graphviz dot to this path.
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Comma-separated subset of passes to run, in order
    /// (shapes, fold, dce, fuse, memory). Defaults to the full pipeline.
    #[arg(long, value_delimiter = ',')]
    passes: Option<Vec<String>>,

    /// Print every intermediate snapshot in full.
    #[arg(long)]
    snapshots: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let source = fs::read_to_string(&args.model)?;
    let graph = parse_dsl_with_implicit_output(&source)?;

    println!("model {:?}", graph.metadata.name);
    print_summary(&compute_metrics(&graph));

    let passes: Vec<&dyn GraphPass> = match &args.passes {
        Some(names) => select_passes(names)?,
        None => standard_pipeline().to_vec(),
    };
    let results = run_pipeline(&graph, &passes)?;

    let mut previous = graph;
    for result in &results {
        println!();
        println!("== {}", result.pass_name);

        let diff = compute_graph_diff(&previous, &result.graph);
        if diff.is_empty() {
            println!("   no structural changes");
        } else {
            println!(
                "   nodes +{} -{} ~{}, edges +{} -{}",
                diff.added_nodes.len(),
                diff.removed_nodes.len(),
                diff.modified_nodes.len(),
                diff.added_edges.len(),
                diff.removed_edges.len(),
            );
        }

        print_summary(&compute_metrics(&result.graph));
        if let Some(plan) = &result.graph.metadata.memory_plan {
            println!(
                "   peak buffer memory {}, in-place ops {}",
                format_bytes(plan.peak_bytes),
                plan.in_place_count,
            );
        }

        if args.snapshots {
            println!("{}", result.graph);
        }
        previous = result.graph.clone();
    }

    if let (Some(path), Some(last)) = (&args.dot, results.last()) {
        let file = fs::File::create(path)?;
        graph_to_dot(file, &last.graph)?;
        println!();
        println!("wrote {}", path.display());
    }

    Ok(())
}

fn select_passes(names: &[String]) -> Result<Vec<&'static dyn GraphPass>, String> {
    names
        .iter()
        .map(|name| match name.as_str() {
            "shapes" => Ok(&ShapeInference as &'static dyn GraphPass),
            "fold" => Ok(&ConstantFolding as &'static dyn GraphPass),
            "dce" => Ok(&DeadCodeElimination as &'static dyn GraphPass),
            "fuse" => Ok(&OperatorFusion as &'static dyn GraphPass),
            "memory" => Ok(&MemoryPlanning as &'static dyn GraphPass),
            other => Err(format!("unknown pass {:?}", other)),
        })
        .collect()
}

fn print_summary(metrics: &mlgraph::analysis::GraphMetrics) {
    println!(
        "   {} nodes, {} edges, depth {}, {} flops, {} params, {} activations",
        metrics.node_count,
        metrics.edge_count,
        metrics.depth,
        format_flops(metrics.total_flops),
        metrics.total_params,
        format_bytes(metrics.total_memory_bytes),
    );
}
