use crate::chunk::{Chunk, ChunkId};
use crate::config::{DEFAULT_DENSE_LIMIT, DEFAULT_RRF_LIMIT, DEFAULT_SPARSE_LIMIT, DEFAULT_TOP_K};
use crate::error::{EmbeddingError, IndexError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Per-query limits. Immutable value passed by the caller.
///
/// `rff_limit` is accepted as an alias of `rrf_limit` when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Stage 1 candidates from dense retrieval
    pub dense_limit: usize,
    /// Stage 1 candidates from sparse retrieval
    pub sparse_limit: usize,
    /// Fused candidates handed to the rerank stage
    #[serde(alias = "rff_limit")]
    pub rrf_limit: usize,
    /// Final result count
    #[serde(default = "default_top_k")]
    pub colbert_top_k: usize,
}

impl Default for QueryConfig {
    /// 100 / 100 / 100 / 10
    fn default() -> Self {
        Self {
            dense_limit: DEFAULT_DENSE_LIMIT,
            sparse_limit: DEFAULT_SPARSE_LIMIT,
            rrf_limit: DEFAULT_RRF_LIMIT,
            colbert_top_k: DEFAULT_TOP_K,
        }
    }
}

impl QueryConfig {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.colbert_top_k = top_k;
        self
    }

    /// All limits positive and `colbert_top_k <= rrf_limit`.
    pub fn validate(&self) -> Result<(), SearchError> {
        let limits = [
            ("dense_limit", self.dense_limit),
            ("sparse_limit", self.sparse_limit),
            ("rrf_limit", self.rrf_limit),
            ("colbert_top_k", self.colbert_top_k),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(SearchError::InvalidConfig(format!("{} must be positive", name)));
        }
        if self.colbert_top_k > self.rrf_limit {
            return Err(SearchError::InvalidConfig(format!(
                "colbert_top_k ({}) exceeds rrf_limit ({})",
                self.colbert_top_k, self.rrf_limit
            )));
        }
        Ok(())
    }
}

/// One final search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: ChunkId,
    /// MaxSim rerank score
    pub score: f32,
    /// RRF score from Stage 1
    pub fused_score: f64,
    pub chunk: Chunk,
}

/// Errors returned by the search engine.
///
/// A failed query is never reported as an empty result.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The query could not be encoded (empty text, provider failure, timeout)
    #[error("Query encoding failed: {0}")]
    QueryEncoding(String),

    /// The index could not answer (unreachable, failed call, timeout)
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The query configuration violates its invariants
    #[error("Invalid query configuration: {0}")]
    InvalidConfig(String),
}

impl From<EmbeddingError> for SearchError {
    fn from(err: EmbeddingError) -> Self {
        SearchError::QueryEncoding(err.to_string())
    }
}

impl From<IndexError> for SearchError {
    fn from(err: IndexError) -> Self {
        SearchError::RetrievalUnavailable(err.to_string())
    }
}
