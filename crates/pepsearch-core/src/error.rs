//! Error types for pepsearch-core.
//!
//! This module defines the errors raised at the capability boundaries
//! (embedding, index) and by the ingestion and filter layers. Engine, pipeline
//! and harness errors live next to the code that raises them and wrap these.

use thiserror::Error;

/// Errors raised while turning source blocks into chunks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// An eligible document is missing an element the chunk model requires.
    /// Fatal to that document only.
    #[error("Structural error in document '{document}': missing {element}")]
    Structural {
        /// Title or URL identifying the document
        document: String,
        /// Name of the missing element (e.g. `page_url`, `#pep-page-section`)
        element: String,
    },
    /// The source itself failed (network, malformed listing).
    #[error("Source failed: {0}")]
    Source(String),
}

impl IngestError {
    /// Convenience constructor for [`IngestError::Structural`].
    pub fn structural(document: impl Into<String>, element: impl Into<String>) -> Self {
        Self::Structural {
            document: document.into(),
            element: element.into(),
        }
    }
}

/// Errors raised by the filter predicate builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The operator string is not one the builder understands.
    #[error("Unsupported filter operation: {0}")]
    UnsupportedOperation(String),
    /// The value does not have the shape the operator needs.
    #[error("Invalid value for '{op}' on field '{field}': {reason}")]
    InvalidValue {
        field: String,
        op: String,
        reason: String,
    },
}

/// Errors that can occur during embedding operations.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// Text is empty (or only whitespace / punctuation)
    #[error("Cannot embed empty input")]
    EmptyInput,
    /// The inference service could not be reached or returned an error status
    #[error("Inference request failed: {0}")]
    RequestFailed(String),
    /// The inference service answered with an unexpected payload
    #[error("Invalid inference response: {0}")]
    InvalidResponse(String),
    /// Produced vector does not match the configured dimension
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Invalid provider configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by a [`VectorIndex`](crate::index::VectorIndex) adapter.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    /// Backend unreachable or returned a server error
    #[error("Index unavailable: {0}")]
    Unavailable(String),
    /// Collection (or alias) does not exist
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// A vector does not match the collection schema
    #[error("Dimension mismatch for {representation}: expected {expected}, got {actual}")]
    DimensionMismatch {
        representation: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A point returned by retrieval could not be fetched
    #[error("Point {0} missing from collection")]
    MissingPoint(u64),
    /// The backend rejected the request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Encoding or decoding a payload failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        IndexError::Unavailable(err.to_string())
    }
}
