//! Shared fixtures and fake backends for unit tests.

use crate::chunk::{breadcrumbs_for, Chunk, ChunkId, SourceBlock};
use crate::embedding::{EmbeddingProvider, HashingEmbedder, SparseVector, TokenMatrix, VectorTriple};
use crate::error::{EmbeddingError, IndexError};
use crate::index::{
    CollectionSchema, InMemoryIndex, IndexedPoint, PayloadSchemaType, QueryVector, RetrieveRequest,
    ScoredCandidate, StoredPoint, VectorIndex,
};
use crate::processing::IngestionPipeline;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Collection alias used by [`populated_index`].
pub const TEST_COLLECTION: &str = "peps";

pub fn chunk_with(id: u64, status: &str, section_url: &str) -> Chunk {
    let page_url = section_url
        .split_once('#')
        .map_or(section_url, |(page, _)| page)
        .to_string();
    Chunk {
        id: ChunkId::from_u64(id),
        page_title: format!("PEP {}", id),
        status: status.to_string(),
        page_url,
        section_title: "Abstract".to_string(),
        section_url: section_url.to_string(),
        breadcrumbs: breadcrumbs_for(section_url),
        chunk_text: format!("chunk text {}", id),
        prev_section_text: None,
        next_section_text: None,
        tags: vec![],
    }
}

/// A point whose token matrix is the single dense vector.
pub fn indexed_point(chunk: Chunk, dense: Vec<f32>, sparse_pairs: &[(u32, f32)]) -> IndexedPoint {
    IndexedPoint {
        id: chunk.id,
        vectors: VectorTriple {
            tokens: vec![dense.clone()],
            dense,
            sparse: SparseVector::from_pairs(sparse_pairs.to_vec()),
        },
        chunk,
    }
}

fn block(pep: u32, title: &str, status: &str, section: &str, text: &str) -> SourceBlock {
    SourceBlock {
        title: title.to_string(),
        status: status.to_string(),
        page_url: Some(format!("https://peps.python.org/pep-{:04}/", pep)),
        section_anchor: format!("#{}", section.to_lowercase().replace(' ', "-")),
        section_id: section.to_string(),
        block_text: text.to_string(),
        python_version: Some("3.8".to_string()),
    }
}

/// Eligible blocks with distinct, non-empty text. Each becomes one chunk.
pub fn sample_blocks() -> Vec<SourceBlock> {
    vec![
        block(
            572,
            "PEP 572 Assignment Expressions",
            "Final",
            "Abstract",
            "This is a proposal for creating a way to assign to variables within an \
             expression using the notation NAME := expr. The new walrus operator \
             enables assignment expressions.",
        ),
        block(
            572,
            "PEP 572 Assignment Expressions",
            "Final",
            "Rationale",
            "Naming the result of an expression is an important part of programming.",
        ),
        block(
            572,
            "PEP 572 Assignment Expressions",
            "Final",
            "Rationale",
            "Current Python forbids binding names inside comprehensions and conditions.",
        ),
        block(
            634,
            "PEP 634 Structural Pattern Matching Specification",
            "Final",
            "Abstract",
            "This PEP provides the technical specification for the match statement. \
             Structural pattern matching compares a subject against case patterns.",
        ),
        block(
            634,
            "PEP 634 Structural Pattern Matching Specification",
            "Final",
            "Class Patterns",
            "A class pattern checks isinstance and then matches keyword attributes.",
        ),
        block(
            484,
            "PEP 484 Type Hints",
            "Accepted",
            "Abstract",
            "This PEP introduces a standard syntax for type annotations of function \
             parameters and return values, checked by static type checkers.",
        ),
        block(
            695,
            "PEP 695 Type Parameter Syntax",
            "Accepted",
            "Abstract",
            "This PEP specifies an improved syntax for declaring type parameters \
             within a generic class, function, or type alias.",
        ),
    ]
}

/// In-memory index with [`sample_blocks`] ingested behind [`TEST_COLLECTION`],
/// embedded with the default [`HashingEmbedder`].
pub async fn populated_index() -> Arc<InMemoryIndex> {
    let index = Arc::new(InMemoryIndex::new());
    IngestionPipeline::new(
        index.clone(),
        Arc::new(HashingEmbedder::default()),
        TEST_COLLECTION,
    )
    .ingest_iter(sample_blocks().into_iter().map(Ok))
    .await
    .unwrap();
    index
}

/// Fails every call.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn dense_dim(&self) -> usize {
        32
    }

    fn token_dim(&self) -> usize {
        8
    }

    async fn embed_dense(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::RequestFailed("provider down".to_string()))
    }

    async fn embed_sparse(&self, _text: &str) -> Result<SparseVector, EmbeddingError> {
        Err(EmbeddingError::RequestFailed("provider down".to_string()))
    }

    async fn embed_tokens(&self, _text: &str) -> Result<TokenMatrix, EmbeddingError> {
        Err(EmbeddingError::RequestFailed("provider down".to_string()))
    }
}

/// Default [`HashingEmbedder`] that sleeps before every call.
pub struct SlowEmbedder {
    pub inner: HashingEmbedder,
    pub delay: Duration,
}

impl SlowEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: HashingEmbedder::default(),
            delay,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn dense_dim(&self) -> usize {
        self.inner.dense_dim()
    }

    fn token_dim(&self) -> usize {
        self.inner.token_dim()
    }

    async fn embed_dense(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_dense(text).await
    }

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_sparse(text).await
    }

    async fn embed_tokens(&self, text: &str) -> Result<TokenMatrix, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_tokens(text).await
    }
}

/// [`HashingEmbedder`] that records how many calls overlap.
///
/// Every call sleeps for `delay` so concurrent callers actually overlap.
pub struct CountingEmbedder {
    pub inner: HashingEmbedder,
    pub delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: HashingEmbedder::new(32, 8),
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn tracked<T>(&self, call: impl std::future::Future<Output = T>) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let out = call.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn dense_dim(&self) -> usize {
        self.inner.dense_dim()
    }

    fn token_dim(&self) -> usize {
        self.inner.token_dim()
    }

    async fn embed_dense(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.tracked(self.inner.embed_dense(text)).await
    }

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector, EmbeddingError> {
        self.tracked(self.inner.embed_sparse(text)).await
    }

    async fn embed_tokens(&self, text: &str) -> Result<TokenMatrix, EmbeddingError> {
        self.tracked(self.inner.embed_tokens(text)).await
    }
}

fn unavailable() -> IndexError {
    IndexError::Unavailable("connection refused".to_string())
}

/// Unreachable index.
pub struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn collection_exists(&self, _name: &str) -> Result<bool, IndexError> {
        Err(unavailable())
    }

    async fn create_collection(&self, _name: &str, _schema: &CollectionSchema) -> Result<(), IndexError> {
        Err(unavailable())
    }

    async fn drop_collection(&self, _name: &str) -> Result<(), IndexError> {
        Err(unavailable())
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        Err(unavailable())
    }

    async fn ensure_payload_index(
        &self,
        _collection: &str,
        _field: &str,
        _schema: PayloadSchemaType,
    ) -> Result<(), IndexError> {
        Err(unavailable())
    }

    async fn upsert(&self, _collection: &str, _points: Vec<IndexedPoint>) -> Result<(), IndexError> {
        Err(unavailable())
    }

    async fn retrieve(
        &self,
        _collection: &str,
        _request: &RetrieveRequest,
    ) -> Result<Vec<ScoredCandidate>, IndexError> {
        Err(unavailable())
    }

    async fn fetch_points(&self, _collection: &str, _ids: &[ChunkId]) -> Result<Vec<StoredPoint>, IndexError> {
        Err(unavailable())
    }

    async fn alias_target(&self, _alias: &str) -> Result<Option<String>, IndexError> {
        Err(unavailable())
    }

    async fn swap_alias(&self, _alias: &str, _collection: &str) -> Result<Option<String>, IndexError> {
        Err(unavailable())
    }
}

/// Wraps an [`InMemoryIndex`], sleeping before every retrieval.
pub struct SlowIndex {
    pub inner: Arc<InMemoryIndex>,
    pub delay: Duration,
}

#[async_trait]
impl VectorIndex for SlowIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool, IndexError> {
        self.inner.collection_exists(name).await
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<(), IndexError> {
        self.inner.create_collection(name, schema).await
    }

    async fn drop_collection(&self, name: &str) -> Result<(), IndexError> {
        self.inner.drop_collection(name).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        self.inner.list_collections().await
    }

    async fn ensure_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema: PayloadSchemaType,
    ) -> Result<(), IndexError> {
        self.inner.ensure_payload_index(collection, field, schema).await
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<(), IndexError> {
        self.inner.upsert(collection, points).await
    }

    async fn retrieve(
        &self,
        collection: &str,
        request: &RetrieveRequest,
    ) -> Result<Vec<ScoredCandidate>, IndexError> {
        tokio::time::sleep(self.delay).await;
        self.inner.retrieve(collection, request).await
    }

    async fn fetch_points(&self, collection: &str, ids: &[ChunkId]) -> Result<Vec<StoredPoint>, IndexError> {
        self.inner.fetch_points(collection, ids).await
    }

    async fn alias_target(&self, alias: &str) -> Result<Option<String>, IndexError> {
        self.inner.alias_target(alias).await
    }

    async fn swap_alias(&self, alias: &str, collection: &str) -> Result<Option<String>, IndexError> {
        self.inner.swap_alias(alias, collection).await
    }
}

/// Wraps an [`InMemoryIndex`] with hooks for interleaving tests.
///
/// With `gate_fetches`, every `fetch_points` call signals `fetch_started`
/// and then waits for `release_fetch`. With `fail_drops`, `drop_collection`
/// always fails.
pub struct GatedIndex {
    pub inner: Arc<InMemoryIndex>,
    pub fetch_started: Notify,
    pub release_fetch: Notify,
    gate_fetches: bool,
    fail_drops: bool,
}

impl GatedIndex {
    pub fn gating_fetches(inner: Arc<InMemoryIndex>) -> Self {
        Self {
            inner,
            fetch_started: Notify::new(),
            release_fetch: Notify::new(),
            gate_fetches: true,
            fail_drops: false,
        }
    }

    pub fn failing_drops(inner: Arc<InMemoryIndex>) -> Self {
        Self {
            inner,
            fetch_started: Notify::new(),
            release_fetch: Notify::new(),
            gate_fetches: false,
            fail_drops: true,
        }
    }
}

#[async_trait]
impl VectorIndex for GatedIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool, IndexError> {
        self.inner.collection_exists(name).await
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<(), IndexError> {
        self.inner.create_collection(name, schema).await
    }

    async fn drop_collection(&self, name: &str) -> Result<(), IndexError> {
        if self.fail_drops {
            return Err(unavailable());
        }
        self.inner.drop_collection(name).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        self.inner.list_collections().await
    }

    async fn ensure_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema: PayloadSchemaType,
    ) -> Result<(), IndexError> {
        self.inner.ensure_payload_index(collection, field, schema).await
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<(), IndexError> {
        self.inner.upsert(collection, points).await
    }

    async fn retrieve(
        &self,
        collection: &str,
        request: &RetrieveRequest,
    ) -> Result<Vec<ScoredCandidate>, IndexError> {
        self.inner.retrieve(collection, request).await
    }

    async fn fetch_points(&self, collection: &str, ids: &[ChunkId]) -> Result<Vec<StoredPoint>, IndexError> {
        if self.gate_fetches {
            self.fetch_started.notify_one();
            self.release_fetch.notified().await;
        }
        self.inner.fetch_points(collection, ids).await
    }

    async fn alias_target(&self, alias: &str) -> Result<Option<String>, IndexError> {
        self.inner.alias_target(alias).await
    }

    async fn swap_alias(&self, alias: &str, collection: &str) -> Result<Option<String>, IndexError> {
        self.inner.swap_alias(alias, collection).await
    }
}

/// Returns fixed dense and sparse rankings regardless of the query vectors.
///
/// Only the read path is supported.
pub struct ScriptedIndex {
    pub dense: Vec<u64>,
    pub sparse: Vec<u64>,
    pub points: Vec<StoredPoint>,
}

impl ScriptedIndex {
    /// Stores one point per id in `stored`, each with a one-row token matrix.
    pub fn new(dense: Vec<u64>, sparse: Vec<u64>, stored: &[(u64, Vec<f32>)]) -> Self {
        let points = stored
            .iter()
            .map(|(id, token)| StoredPoint {
                id: ChunkId::from_u64(*id),
                chunk: chunk_with(*id, "Final", &format!("https://peps.python.org/pep-{:04}/#s", id)),
                tokens: vec![token.clone()],
            })
            .collect();
        Self {
            dense,
            sparse,
            points,
        }
    }
}

fn read_only() -> IndexError {
    IndexError::InvalidRequest("scripted index is read-only".to_string())
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn collection_exists(&self, _name: &str) -> Result<bool, IndexError> {
        Ok(true)
    }

    async fn create_collection(&self, _name: &str, _schema: &CollectionSchema) -> Result<(), IndexError> {
        Err(read_only())
    }

    async fn drop_collection(&self, _name: &str) -> Result<(), IndexError> {
        Err(read_only())
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        Ok(vec![TEST_COLLECTION.to_string()])
    }

    async fn ensure_payload_index(
        &self,
        _collection: &str,
        _field: &str,
        _schema: PayloadSchemaType,
    ) -> Result<(), IndexError> {
        Err(read_only())
    }

    async fn upsert(&self, _collection: &str, _points: Vec<IndexedPoint>) -> Result<(), IndexError> {
        Err(read_only())
    }

    async fn retrieve(
        &self,
        _collection: &str,
        request: &RetrieveRequest,
    ) -> Result<Vec<ScoredCandidate>, IndexError> {
        let ranking = match request.query {
            QueryVector::Dense(_) => &self.dense,
            QueryVector::Sparse(_) => &self.sparse,
            QueryVector::Tokens(_) => {
                return Err(IndexError::InvalidRequest("token retrieval".to_string()))
            }
        };
        Ok(ranking
            .iter()
            .take(request.limit)
            .enumerate()
            .map(|(rank, id)| ScoredCandidate {
                id: ChunkId::from_u64(*id),
                score: 1.0 / (rank + 1) as f32,
            })
            .collect())
    }

    async fn fetch_points(&self, _collection: &str, ids: &[ChunkId]) -> Result<Vec<StoredPoint>, IndexError> {
        Ok(self
            .points
            .iter()
            .filter(|point| ids.contains(&point.id))
            .cloned()
            .collect())
    }

    async fn alias_target(&self, _alias: &str) -> Result<Option<String>, IndexError> {
        Ok(None)
    }

    async fn swap_alias(&self, _alias: &str, _collection: &str) -> Result<Option<String>, IndexError> {
        Err(read_only())
    }
}
