//! Embedding capability trait.

use super::types::{SparseVector, TokenMatrix, VectorTriple};
use crate::error::EmbeddingError;
use async_trait::async_trait;

/// Turns text into the three representations the index stores.
///
/// Implementations must be deterministic for identical input text and model
/// configuration. Query variants default to the document encoders; providers
/// whose models encode queries differently (late-interaction query
/// augmentation, instruction prefixes) override them.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the engine encodes the three query
/// representations concurrently and is shared across tasks.
///
/// # Examples
///
/// ```ignore
/// let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::default());
///
/// let triple = embedder.embed_document("Structural pattern matching").await?;
/// assert_eq!(triple.dense.len(), embedder.dense_dim());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every dense vector.
    fn dense_dim(&self) -> usize;

    /// Length of every token vector.
    fn token_dim(&self) -> usize;

    async fn embed_dense(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector, EmbeddingError>;

    async fn embed_tokens(&self, text: &str) -> Result<TokenMatrix, EmbeddingError>;

    async fn embed_dense_query(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_dense(query).await
    }

    async fn embed_sparse_query(&self, query: &str) -> Result<SparseVector, EmbeddingError> {
        self.embed_sparse(query).await
    }

    async fn embed_tokens_query(&self, query: &str) -> Result<TokenMatrix, EmbeddingError> {
        self.embed_tokens(query).await
    }

    /// Encodes a chunk's text with all three document encoders.
    async fn embed_document(&self, text: &str) -> Result<VectorTriple, EmbeddingError> {
        let (dense, sparse, tokens) = futures::try_join!(
            self.embed_dense(text),
            self.embed_sparse(text),
            self.embed_tokens(text)
        )?;
        Ok(VectorTriple {
            dense,
            sparse,
            tokens,
        })
    }
}
