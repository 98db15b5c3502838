//! Search command implementation.

use crate::config::{has_snapshot, BackendArgs, OpenIndex};
use anyhow::{anyhow, Context, Result};
use clap::Args;
use pepsearch_core::config::{
    DEFAULT_DENSE_LIMIT, DEFAULT_RRF_LIMIT, DEFAULT_SNIPPET_SIZE, DEFAULT_SPARSE_LIMIT,
    DEFAULT_TOP_K,
};
use pepsearch_core::filter::{build_filter, FilterCondition};
use pepsearch_core::search::{HybridSearchEngine, QueryConfig, SearchHit};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long = "top-k", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Dense retrieval candidates
    #[arg(long, default_value_t = DEFAULT_DENSE_LIMIT)]
    pub dense_limit: usize,

    /// Sparse retrieval candidates
    #[arg(long, default_value_t = DEFAULT_SPARSE_LIMIT)]
    pub sparse_limit: usize,

    /// Fused candidates passed to the rerank stage
    #[arg(long, alias = "rff-limit", default_value_t = DEFAULT_RRF_LIMIT)]
    pub rrf_limit: usize,

    /// Payload filter as `field:op:value`, repeatable (all must hold)
    #[arg(long = "filter", value_parser = parse_filter)]
    pub filters: Vec<FilterCondition>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Characters of chunk text shown per result
    #[arg(long, default_value_t = DEFAULT_SNIPPET_SIZE)]
    pub snippet_size: usize,

    /// Disable colored highlighting
    #[arg(long)]
    pub no_color: bool,
}

impl SearchArgs {
    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            dense_limit: self.dense_limit,
            sparse_limit: self.sparse_limit,
            rrf_limit: self.rrf_limit,
            colbert_top_k: self.top_k,
        }
    }
}

/// Parses `field:op:value`.
///
/// The value is read as JSON when possible (`5`, `["Final","Accepted"]`) and
/// as a plain string otherwise. For `in`, a non-JSON value is split on commas.
/// Values may contain `:`.
pub fn parse_filter(raw: &str) -> Result<FilterCondition, String> {
    let mut parts = raw.splitn(3, ':');
    let (field, op, value) = match (parts.next(), parts.next(), parts.next()) {
        (Some(field), Some(op), Some(value)) if !field.is_empty() && !op.is_empty() => {
            (field, op, value)
        }
        _ => return Err(format!("expected field:op:value, got '{}'", raw)),
    };

    let value = match serde_json::from_str::<Value>(value) {
        Ok(parsed) => parsed,
        Err(_) if op == "in" => Value::from(
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>(),
        ),
        Err(_) => Value::from(value),
    };
    Ok(FilterCondition::new(field, op, value))
}

/// Runs one query against the configured backend.
pub async fn execute_search(args: &SearchArgs, backend: &BackendArgs) -> Result<Vec<SearchHit>> {
    let filter = build_filter(&args.filters).context("Invalid filter")?;

    let index = backend.open_index()?;
    if let OpenIndex::Memory { path, .. } = &index {
        if !has_snapshot(path) {
            return Err(anyhow!(
                "No index found at {}. Run `pep ingest` first.",
                path.display()
            ));
        }
    }
    let embedder = backend.build_embedder()?;

    let engine = HybridSearchEngine::new(index.as_dyn(), embedder, backend.collection.clone())
        .with_call_timeout(backend.call_timeout());

    info!("Searching {} for \"{}\"", backend.collection, args.query);
    engine
        .search(&args.query, filter.as_ref(), &args.query_config())
        .await
        .with_context(|| format!("Search failed for query \"{}\"", args.query))
}
