use std::path::PathBuf;

use airgraph::{Config, GraphDb, importer};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Import a JSON graph document (`nodes` / `links`) into the airgraph database.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Graph document to import.
    #[arg(default_value = "MC1_graph.json")]
    path: PathBuf,

    /// Nodes or links written per write session.
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Wipe the database before importing.
    #[arg(long)]
    clear: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let graph = GraphDb::open(&config.db_path, config.query_timeout)?;

    if args.clear {
        graph.write_blocking(|session| Ok(session.clear()?))?;
        tracing::info!(db_path = %config.db_path.display(), "database cleared");
    }

    let document = importer::read_document(&args.path)?;
    let report = importer::load_document(&graph, &document, args.batch_size)?;

    println!(
        "Graph imported successfully. Nodes: {} Relationships: {}",
        report.nodes, report.links
    );
    Ok(())
}
