use std::path::PathBuf;

use clap::Parser;
use log::error;

use heatfem::{input, mesher, post_processor, solver};

const DEFAULT_RESULTS: &str = "results.txt";

/// Solves steady-state heat diffusion on a Gmsh triangle mesh
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Gmsh 4.x .msh file
    mesh: PathBuf,

    /// Boundary file: node count, then one `<node id> <value>` per line
    boundary: PathBuf,

    /// JSON input file selecting the source term
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Path of the gnuplot results script [default: results.txt]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write `x,y,u` for every node to this CSV file
    #[arg(long)]
    nodes_csv: Option<PathBuf>,
}

fn run(cli: &Cli) -> heatfem::Result<()> {
    let model_metadata = input::run(cli.input.as_deref())?;
    let (mesh, classification) = mesher::run(&cli.mesh, &cli.boundary)?;

    let solution = solver::run(&mesh, &classification, &model_metadata)?;

    let results_output = cli
        .output
        .clone()
        .or_else(|| model_metadata.output.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS));
    post_processor::write_results(&mesh, &solution, &cli.mesh, &results_output)?;

    if let Some(nodes_output) = &cli.nodes_csv {
        post_processor::csv_output(&mesh, &solution, nodes_output)?;
    }

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        error!("{err}");
        std::process::exit(1);
    }
}
