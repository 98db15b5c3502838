//! Hybrid search engine combining dense, sparse and late-interaction retrieval.
//!
//! This module provides the [`HybridSearchEngine`] which orchestrates:
//! - Query encoding into three representations (concurrently)
//! - Stage 1: dense + sparse retrieval fused with Reciprocal Rank Fusion
//! - Stage 2: MaxSim rerank of the fused candidates
//!
//! # Failure Semantics
//!
//! Every external call is bounded by the engine's call timeout. Encoding
//! failures and encoding timeouts surface as [`SearchError::QueryEncoding`];
//! index failures and retrieval timeouts as [`SearchError::RetrievalUnavailable`].
//! The engine never retries and never turns a failure into an empty result.


use super::types::{QueryConfig, SearchError, SearchHit};
use crate::config::{DEFAULT_CALL_TIMEOUT_SECS, RRF_K};
use crate::embedding::EmbeddingProvider;
use crate::filter::FilterPredicate;
use crate::index::{HybridRequest, RankedPoint, VectorIndex};
use instant::Instant;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Hybrid search engine over one collection (or alias).
///
/// Cheap to clone; clones share the index and embedder. Holds no mutable
/// state, so concurrent queries only share the read-only collection.
///
/// # Example
///
/// ```ignore
/// use pepsearch_core::embedding::HashingEmbedder;
/// use pepsearch_core::index::InMemoryIndex;
/// use pepsearch_core::search::{HybridSearchEngine, QueryConfig};
///
/// let engine = HybridSearchEngine::new(
///     Arc::new(InMemoryIndex::new()),
///     Arc::new(HashingEmbedder::default()),
///     "pep_search",
/// );
/// let hits = engine.search("pattern matching", None, &QueryConfig::default()).await?;
/// ```
#[derive(Clone)]
pub struct HybridSearchEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
    rrf_k: usize,
    call_timeout: Duration,
}

impl HybridSearchEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            index,
            embedder,
            collection: collection.into(),
            rrf_k: RRF_K,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    /// Overrides the RRF smoothing constant.
    pub fn with_rrf_k(mut self, rrf_k: usize) -> Self {
        self.rrf_k = rrf_k;
        self
    }

    /// Bounds each external call (query encoding, two-stage retrieval).
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn rrf_k(&self) -> usize {
        self.rrf_k
    }

    /// Runs the two-stage query.
    ///
    /// Result order is a function of collection state, query text, filter and
    /// config only.
    ///
    /// # Errors
    ///
    /// - [`SearchError::InvalidConfig`] if `config` violates its invariants
    /// - [`SearchError::QueryEncoding`] for empty queries, provider errors or timeouts
    /// - [`SearchError::RetrievalUnavailable`] for index errors or timeouts
    #[instrument(skip_all, fields(collection = %self.collection, top_k = config.colbert_top_k))]
    pub async fn search(
        &self,
        query: &str,
        filter: Option<&FilterPredicate>,
        config: &QueryConfig,
    ) -> Result<Vec<SearchHit>, SearchError> {
        config.validate()?;
        if query.trim().is_empty() {
            return Err(SearchError::QueryEncoding("query is empty".to_string()));
        }

        let start = Instant::now();
        let embedder = &self.embedder;
        let encode = async {
            futures::try_join!(
                embedder.embed_dense_query(query),
                embedder.embed_sparse_query(query),
                embedder.embed_tokens_query(query)
            )
        };
        let (dense, sparse, tokens) = tokio::time::timeout(self.call_timeout, encode)
            .await
            .map_err(|_| {
                SearchError::QueryEncoding(format!("timed out after {:?}", self.call_timeout))
            })??;
        let encode_elapsed = start.elapsed();

        let request = HybridRequest {
            dense,
            sparse,
            tokens,
            filter: filter.cloned(),
            config: *config,
            rrf_k: self.rrf_k,
        };

        let retrieve_start = Instant::now();
        let ranked = tokio::time::timeout(
            self.call_timeout,
            self.index.fuse_and_rerank(&self.collection, &request),
        )
        .await
        .map_err(|_| {
            SearchError::RetrievalUnavailable(format!("timed out after {:?}", self.call_timeout))
        })??;

        debug!(
            results = ranked.len(),
            "Search completed: encode {:?}, retrieve {:?}",
            encode_elapsed,
            retrieve_start.elapsed()
        );

        Ok(ranked.into_iter().map(SearchHit::from).collect())
    }
}

impl From<RankedPoint> for SearchHit {
    fn from(point: RankedPoint) -> Self {
        Self {
            id: point.id,
            score: point.score,
            fused_score: point.fused_score,
            chunk: point.chunk,
        }
    }
}
