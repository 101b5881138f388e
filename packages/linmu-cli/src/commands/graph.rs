use crate::cli::GraphArgs;
use crate::exit_codes;
use crate::output;
use crate::settings;
use linmu_rs::linearize::LaidOutEdge;
use linmu_rs::{EdgeLayout, TrackGraph};
use serde::Serialize;

#[derive(Serialize)]
struct GraphReport<'a> {
    track_graph: &'a TrackGraph,
    total_edge_length: f64,
    linear_length: f64,
    layout: Vec<LaidOutEdge>,
}

pub fn execute(args: GraphArgs) -> i32 {
    let config = match settings::load_config(&args.source) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::CONFIG_ERROR;
        }
    };
    let (graph, layout) = match config
        .track
        .build()
        .and_then(|graph| EdgeLayout::new(&graph, &config.linearization).map(|l| (graph, l)))
    {
        Ok(built) => built,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::CONFIG_ERROR;
        }
    };

    let report = GraphReport {
        track_graph: &graph,
        total_edge_length: graph.total_length(),
        linear_length: layout.total_length(),
        layout: layout.edges(&graph),
    };

    if args.json {
        if !output::emit(&report, false, None) {
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!(
            "Track graph: {} nodes, {} edges, {:.1} cm of track\n",
            graph.node_count(),
            graph.edge_count(),
            report.total_edge_length
        );
        println!(
            "  {:<6} {:<12} {:>10} {:>10}",
            "Edge", "Nodes", "Start", "End"
        );
        println!("  {}", "-".repeat(42));
        for edge in &report.layout {
            println!(
                "  {:<6} {:<12} {:>10.2} {:>10.2}",
                edge.edge,
                format!("{} -> {}", edge.from_node, edge.to_node),
                edge.start,
                edge.end
            );
        }
        println!();
        println!("Linear axis length: {:.2} cm", report.linear_length);
    }

    exit_codes::SUCCESS
}
