//! pepsearch evaluation tool
//!
//! Runs a labeled query set through the hybrid search engine under every
//! configuration of a matrix and reports recall@10, MRR@10 and latency
//! percentiles per configuration.
//!
//! # Prerequisites
//!
//! ```bash
//! # Build an index first (memory backend snapshot or a Qdrant collection)
//! cargo run -p pepsearch-cli --release -- ingest
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Run evaluation against the snapshot written by `pep ingest`
//! cargo run -p pepsearch-eval --release -- --snapshot ~/.local/share/pepsearch/index.json
//!
//! # Output JSON for analysis
//! cargo run -p pepsearch-eval --release -- --snapshot index.json --json
//!
//! # Show per-query breakdown, run configurations concurrently
//! cargo run -p pepsearch-eval --release -- --snapshot index.json --per-query --parallel-configs
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pepsearch_core::config::DEFAULT_COLLECTION;
use pepsearch_core::embedding::{
    EmbeddingProvider, HashingEmbedder, RemoteEmbedder, RemoteEmbedderConfig,
};
use pepsearch_core::evaluation::{EvalConfig, EvaluationHarness, EvaluationReport};
use pepsearch_core::index::{InMemoryIndex, QdrantConfig, QdrantIndex, VectorIndex};
use pepsearch_core::search::HybridSearchEngine;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI
// =============================================================================

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Embedder {
    Hashing,
    Remote,
}

#[derive(Parser, Debug)]
#[command(name = "pepsearch-eval")]
#[command(about = "Evaluate pepsearch retrieval quality and latency")]
struct Args {
    /// Evaluation file (configs, tests, optional filter)
    #[arg(long, default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/data/eval.json"))]
    config: PathBuf,

    #[arg(long, value_enum, env = "PEPSEARCH_BACKEND", default_value = "memory")]
    backend: Backend,

    /// Index snapshot written by `pep ingest` (memory backend)
    #[arg(long, env = "PEPSEARCH_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    qdrant_api_key: Option<String>,

    #[arg(long, env = "PEPSEARCH_COLLECTION", default_value = DEFAULT_COLLECTION)]
    collection: String,

    #[arg(long, value_enum, env = "PEPSEARCH_EMBEDDER", default_value = "hashing")]
    embedder: Embedder,

    #[arg(long, env = "PEPSEARCH_INFERENCE_URL")]
    inference_url: Option<String>,

    #[arg(long, env = "PEPSEARCH_INFERENCE_API_KEY", hide_env_values = true)]
    inference_api_key: Option<String>,

    /// Timeout in seconds for every external call
    #[arg(long, env = "PEPSEARCH_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Show per-query breakdown
    #[arg(long)]
    per_query: bool,

    /// Run configurations concurrently (latencies then include contention)
    #[arg(long)]
    parallel_configs: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

// =============================================================================
// Setup
// =============================================================================

fn build_index(args: &Args) -> Result<Arc<dyn VectorIndex>> {
    match args.backend {
        Backend::Memory => {
            let path = args
                .snapshot
                .as_ref()
                .ok_or_else(|| anyhow!("--snapshot is required for the memory backend"))?;
            let index = InMemoryIndex::load_snapshot(path)
                .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
            Ok(Arc::new(index))
        }
        Backend::Qdrant => {
            let mut config = QdrantConfig::new(args.qdrant_url.clone());
            config.api_key = args.qdrant_api_key.clone();
            config.timeout = Duration::from_secs(args.timeout_secs);
            Ok(Arc::new(QdrantIndex::new(config).context("Invalid Qdrant configuration")?))
        }
    }
}

fn build_embedder(args: &Args) -> Result<Arc<dyn EmbeddingProvider>> {
    match args.embedder {
        Embedder::Hashing => Ok(Arc::new(HashingEmbedder::default())),
        Embedder::Remote => Ok(Arc::new(
            RemoteEmbedder::new(remote_config(args)?).context("Invalid inference configuration")?,
        )),
    }
}

fn remote_config(args: &Args) -> Result<RemoteEmbedderConfig> {
    let endpoint = args
        .inference_url
        .clone()
        .ok_or_else(|| anyhow!("--inference-url is required for the remote embedder"))?;
    let mut config = RemoteEmbedderConfig::new(endpoint);
    config.api_key = args.inference_api_key.clone();
    config.timeout = Duration::from_secs(args.timeout_secs);
    Ok(config)
}

// =============================================================================
// Output
// =============================================================================

fn print_report(eval: &EvalConfig, report: &EvaluationReport, per_query: bool) {
    println!("\n{}", "=".repeat(80));
    println!("PEPSEARCH RETRIEVAL EVALUATION");
    println!("{}", "=".repeat(80));
    println!(
        "\n{} configs x {} queries{}",
        eval.configs.len(),
        eval.tests.len(),
        if eval.filter.is_empty() { "" } else { " (filtered)" }
    );

    println!("\n{}", "-".repeat(70));
    println!(
        "{:<16} {:>10} {:>10} {:>12} {:>12}",
        "Config", "recall@10", "mrr@10", "p50 (ms)", "p95 (ms)"
    );
    for config in &report.configs {
        let m = &config.metrics;
        println!(
            "{:<16} {:>10.4} {:>10.4} {:>12.2} {:>12.2}",
            config.name, m.recall_at_10, m.mrr_at_10, m.latency_p50_ms, m.latency_p95_ms
        );
    }

    if per_query {
        for config in &report.configs {
            println!("\n{}", "-".repeat(70));
            println!("PER-QUERY: {}", config.name);
            for case in &config.cases {
                let hit = if case.recall_at_10 > 0.0 { "+" } else { "-" };
                println!(
                    "{} rr={:.3} {:>8.2}ms  {}",
                    hit, case.reciprocal_rank, case.latency_ms, case.query
                );
                if let Some(first) = case.returned.first() {
                    println!("      top: {}", first);
                }
            }
        }
    }

    println!("{}\n", "=".repeat(80));
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose { "info" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let eval = EvalConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    info!(
        "Loaded {} configs and {} tests from {}",
        eval.configs.len(),
        eval.tests.len(),
        args.config.display()
    );

    let index = build_index(&args)?;
    let embedder = build_embedder(&args)?;
    let engine = HybridSearchEngine::new(index, embedder, args.collection.clone())
        .with_call_timeout(Duration::from_secs(args.timeout_secs));
    let harness = EvaluationHarness::new(engine).with_parallel_configs(args.parallel_configs);

    let pb = ProgressBar::new((eval.configs.len() * eval.tests.len()) as u64);
    pb.set_style(ProgressStyle::default_bar().template("{msg} [{bar:40}] {pos}/{len}")?);
    let report = harness
        .run(&eval, |config, _| {
            pb.set_message(config.to_string());
            pb.inc(1);
        })
        .await
        .context("Evaluation aborted")?;
    pb.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&eval, &report, args.per_query);
    }

    Ok(())
}
