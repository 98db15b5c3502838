//! Ingest command implementation.

use crate::config::BackendArgs;
use crate::source::{fetch_pep_index, http_client, jsonl_blocks, pep_blocks, PEPS_API};
use anyhow::{Context, Result};
use clap::Args;
use futures::stream;
use pepsearch_core::chunk::EligibilityPolicy;
use pepsearch_core::config::INGEST_BATCH_SIZE;
use pepsearch_core::processing::{IngestProgress, IngestReport, IngestionPipeline};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    /// Read blocks from a JSON-lines file instead of the PEP website
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// PEP index endpoint
    #[arg(long, default_value = PEPS_API)]
    pub api_url: String,

    /// Stop after this many documents from the PEP index
    #[arg(long)]
    pub max_documents: Option<usize>,

    /// Points per upsert request
    #[arg(long, default_value_t = INGEST_BATCH_SIZE)]
    pub batch_size: usize,
}

fn log_progress(progress: &IngestProgress) {
    info!(
        "Indexed {} chunks in {} batches ({:.0} chunks/s)",
        progress.chunks_indexed,
        progress.batches_flushed,
        progress.chunks_per_second()
    );
}

/// Builds a new generation from the selected source and swaps it in.
pub async fn execute_ingest(args: &IngestArgs, backend: &BackendArgs) -> Result<IngestReport> {
    let index = backend.open_index()?;
    let embedder = backend.build_embedder()?;
    let policy = EligibilityPolicy::default();
    let pipeline = IngestionPipeline::new(index.as_dyn(), embedder, backend.collection.clone())
        .with_batch_size(args.batch_size)
        .with_policy(policy.clone());

    let report = match &args.input {
        Some(path) => {
            info!("Ingesting blocks from {}", path.display());
            let blocks = jsonl_blocks(path)?;
            pipeline
                .ingest(stream::iter(blocks), log_progress)
                .await
                .with_context(|| format!("Ingestion failed for {}", path.display()))?
        }
        None => {
            let client = http_client(backend.call_timeout())?;
            let mut entries = fetch_pep_index(&client, &args.api_url).await?;
            if let Some(max) = args.max_documents {
                entries.truncate(max);
            }
            pipeline
                .ingest(pep_blocks(client, entries, &policy), log_progress)
                .await
                .with_context(|| format!("Ingestion failed for {}", args.api_url))?
        }
    };

    index.persist()?;
    Ok(report)
}
