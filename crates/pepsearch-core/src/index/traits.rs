//! Multi-representation index capability.

use crate::chunk::{Chunk, ChunkId};
use crate::embedding::{SparseVector, TokenMatrix, VectorTriple};
use crate::error::IndexError;
use crate::filter::FilterPredicate;
use crate::search::fusion::reciprocal_rank_fusion;
use crate::search::rerank::rerank;
use crate::search::QueryConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Named vector slots of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Representation {
    Dense,
    Sparse,
    Tokens,
}

impl Representation {
    /// Vector name used in the collection schema.
    pub fn name(&self) -> &'static str {
        match self {
            Representation::Dense => "dense",
            Representation::Sparse => "sparse",
            Representation::Tokens => "colbert",
        }
    }
}

/// A query vector for exactly one representation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    Dense(Vec<f32>),
    Sparse(SparseVector),
    Tokens(TokenMatrix),
}

impl QueryVector {
    pub fn representation(&self) -> Representation {
        match self {
            QueryVector::Dense(_) => Representation::Dense,
            QueryVector::Sparse(_) => Representation::Sparse,
            QueryVector::Tokens(_) => Representation::Tokens,
        }
    }
}

/// Collection layout: cosine dense vectors, dot-product sparse vectors and
/// cosine MaxSim token matrices (no ANN graph on the token vectors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub dense_dim: usize,
    pub token_dim: usize,
}

/// Payload index kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSchemaType {
    Keyword,
    Integer,
    Float,
    Text,
}

/// One chunk with its three vectors, ready for upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPoint {
    pub id: ChunkId,
    pub vectors: VectorTriple,
    pub chunk: Chunk,
}

/// A retrieval hit without payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub id: ChunkId,
    pub score: f32,
}

/// Payload plus the token matrix, as needed by the rerank stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    pub id: ChunkId,
    pub chunk: Chunk,
    pub tokens: TokenMatrix,
}

/// Single-representation retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveRequest {
    pub query: QueryVector,
    pub filter: Option<FilterPredicate>,
    pub limit: usize,
}

/// Stage 1 + Stage 2 query description.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridRequest {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub tokens: TokenMatrix,
    pub filter: Option<FilterPredicate>,
    pub config: QueryConfig,
    /// RRF smoothing constant
    pub rrf_k: usize,
}

/// Final ranked result with payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPoint {
    pub id: ChunkId,
    /// MaxSim rerank score
    pub score: f32,
    /// RRF score from Stage 1
    pub fused_score: f64,
    pub chunk: Chunk,
}

/// Swappable index backend.
///
/// Collection arguments of the query operations may be aliases. Retrieval
/// must respect `limit` and `filter` and order hits by score descending with
/// ties broken by ascending id, so identical inputs give identical output.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine issues the two Stage 1
/// retrievals concurrently. A dropped (cancelled) call must not leave the
/// adapter unusable for the next one.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool, IndexError>;

    /// Creates an empty collection. Fails if it already exists.
    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<(), IndexError>;

    /// Drops a collection. Dropping a missing collection is not an error.
    async fn drop_collection(&self, name: &str) -> Result<(), IndexError>;

    async fn list_collections(&self) -> Result<Vec<String>, IndexError>;

    /// Creates a payload index. No-op if already present.
    async fn ensure_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema: PayloadSchemaType,
    ) -> Result<(), IndexError>;

    /// Inserts or replaces points by id.
    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<(), IndexError>;

    async fn retrieve(
        &self,
        collection: &str,
        request: &RetrieveRequest,
    ) -> Result<Vec<ScoredCandidate>, IndexError>;

    /// Fetches payloads and token matrices. Unknown ids are left out of the
    /// result; callers decide whether that is an error.
    async fn fetch_points(&self, collection: &str, ids: &[ChunkId]) -> Result<Vec<StoredPoint>, IndexError>;

    async fn alias_target(&self, alias: &str) -> Result<Option<String>, IndexError>;

    /// Atomically points `alias` at `collection`. Returns the previous target.
    async fn swap_alias(&self, alias: &str, collection: &str) -> Result<Option<String>, IndexError>;

    /// Resolves an alias to its collection; plain collection names pass through.
    async fn resolve_collection(&self, name: &str) -> Result<String, IndexError> {
        Ok(self
            .alias_target(name)
            .await?
            .unwrap_or_else(|| name.to_string()))
    }

    /// Two-stage hybrid query.
    ///
    /// 1. Dense and sparse retrieval run concurrently under the same filter.
    /// 2. Both lists are fused with RRF and truncated to `rrf_limit`.
    /// 3. The fused set is rescored with MaxSim against the query token
    ///    matrix and truncated to `colbert_top_k`.
    ///
    /// The alias is resolved once up front so all calls hit one generation.
    async fn fuse_and_rerank(
        &self,
        collection: &str,
        request: &HybridRequest,
    ) -> Result<Vec<RankedPoint>, IndexError> {
        let generation = self.resolve_collection(collection).await?;
        let config = &request.config;

        let dense_request = RetrieveRequest {
            query: QueryVector::Dense(request.dense.clone()),
            filter: request.filter.clone(),
            limit: config.dense_limit,
        };
        let sparse_request = RetrieveRequest {
            query: QueryVector::Sparse(request.sparse.clone()),
            filter: request.filter.clone(),
            limit: config.sparse_limit,
        };

        let (dense_hits, sparse_hits) = futures::try_join!(
            self.retrieve(&generation, &dense_request),
            self.retrieve(&generation, &sparse_request)
        )?;

        let dense_ids: Vec<ChunkId> = dense_hits.iter().map(|hit| hit.id).collect();
        let sparse_ids: Vec<ChunkId> = sparse_hits.iter().map(|hit| hit.id).collect();
        let mut fused = reciprocal_rank_fusion(&dense_ids, &sparse_ids, request.rrf_k);
        fused.truncate(config.rrf_limit);
        debug!(
            dense = dense_ids.len(),
            sparse = sparse_ids.len(),
            fused = fused.len(),
            "Stage 1 complete"
        );

        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ChunkId> = fused.iter().map(|candidate| candidate.id).collect();
        let mut points: HashMap<ChunkId, StoredPoint> = self
            .fetch_points(&generation, &ids)
            .await?
            .into_iter()
            .map(|point| (point.id, point))
            .collect();

        let mut candidates = Vec::with_capacity(fused.len());
        for candidate in &fused {
            let point = points
                .remove(&candidate.id)
                .ok_or(IndexError::MissingPoint(candidate.id.as_u64()))?;
            candidates.push((candidate.score, point));
        }

        let reranked = rerank(
            &request.tokens,
            candidates
                .iter()
                .map(|(_, point)| (point.id, point.tokens.as_slice())),
            config.colbert_top_k,
        );

        let mut by_id: HashMap<ChunkId, (f64, StoredPoint)> = candidates
            .into_iter()
            .map(|(fused_score, point)| (point.id, (fused_score, point)))
            .collect();

        let mut results = Vec::with_capacity(reranked.len());
        for (id, score) in reranked {
            if let Some((fused_score, point)) = by_id.remove(&id) {
                results.push(RankedPoint {
                    id,
                    score,
                    fused_score,
                    chunk: point.chunk,
                });
            }
        }
        Ok(results)
    }
}
