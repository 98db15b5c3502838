//! pepsearch CLI - ingest Python Enhancement Proposals and search them.
//!
//! # Usage
//!
//! ```bash
//! # Build the index from peps.python.org (in-memory backend, snapshot on disk)
//! pep ingest
//! pep ingest --input blocks.jsonl
//!
//! # Search
//! pep search "building time in JIT compilation"
//! pep search "pattern matching" -n 5 --filter status:in:Final,Accepted
//! pep search "walrus" --json
//!
//! # Use a Qdrant server instead
//! PEPSEARCH_BACKEND=qdrant QDRANT_URL=http://localhost:6333 pep search "type hints"
//! ```

mod config;
mod ingest;
mod output;
mod search;
mod source;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pepsearch_core::search::Highlighter;
use tracing_subscriber::EnvFilter;

/// Hybrid dense + sparse + late-interaction search over PEPs.
#[derive(Parser)]
#[command(name = "pep", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    backend: config::BackendArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build a fresh index generation and swap it in
    Ingest(ingest::IngestArgs),
    /// Search the current generation
    Search(search::SearchArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Ingest(args) => {
            let report = ingest::execute_ingest(args, &cli.backend).await?;
            println!("{}", output::format_report(&report));
        }
        Command::Search(args) => {
            let hits = search::execute_search(args, &cli.backend).await?;
            let output = if args.json {
                output::format_json(&args.query, &hits)
            } else {
                let highlighter = if args.no_color {
                    Highlighter::new(&args.query, "", "")
                } else {
                    Highlighter::ansi(&args.query)
                };
                output::format_human(&args.query, &hits, &highlighter, args.snippet_size)
            };
            println!("{}", output);
        }
    }

    Ok(())
}
