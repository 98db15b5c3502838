//! Default configuration constants.
//!
//! These values define the production configuration for pepsearch. Binaries
//! and benchmarks import them so every entry point agrees on dimensions,
//! limits and collection names.
//!
//! # Usage
//!
//! ```
//! use pepsearch_core::config::{DENSE_DIM, RRF_K};
//!
//! let query = vec![0.0f32; DENSE_DIM];
//! assert_eq!(query.len(), 768);
//! assert_eq!(RRF_K, 60);
//! ```

// =============================================================================
// Embedding Models
// =============================================================================

/// Dense embedding model served by the inference endpoint.
pub const DENSE_MODEL: &str = "BAAI/bge-base-en-v1.5";

/// Sparse (SPLADE) embedding model.
pub const SPARSE_MODEL: &str = "prithivida/Splade_PP_en_v1";

/// Late-interaction embedding model.
pub const TOKEN_MODEL: &str = "colbert-ir/colbertv2.0";

/// Dense vector dimension (bge-base hidden size).
pub const DENSE_DIM: usize = 768;

/// Per-token vector dimension of the late-interaction model.
pub const TOKEN_DIM: usize = 128;

// =============================================================================
// Retrieval
// =============================================================================

/// RRF smoothing constant.
///
/// Value recommended by Cormack, Clarke and Buettcher (SIGIR 2009). Larger
/// values flatten the contribution of top ranks.
pub const RRF_K: usize = 60;

/// Candidates retrieved by dense similarity in Stage 1.
pub const DEFAULT_DENSE_LIMIT: usize = 100;

/// Candidates retrieved by sparse similarity in Stage 1.
pub const DEFAULT_SPARSE_LIMIT: usize = 100;

/// Size of the fused candidate set handed to the rerank stage.
pub const DEFAULT_RRF_LIMIT: usize = 100;

/// Final number of results after the MaxSim rerank.
pub const DEFAULT_TOP_K: usize = 10;

/// Default bound on every external call (embedding, retrieval), in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Collections and Ingestion
// =============================================================================

/// Alias queries are served from. Each ingestion run builds a new generation
/// and points this alias at it.
pub const DEFAULT_COLLECTION: &str = "pep_search";

/// Points per upsert request.
pub const INGEST_BATCH_SIZE: usize = 256;

/// Chunks embedded concurrently within a batch. Each chunk makes three
/// provider calls, so at most three times this many requests are in flight.
pub const EMBED_CONCURRENCY: usize = 4;

/// Payload fields that get a keyword index on every new generation.
pub const KEYWORD_INDEX_FIELDS: &[&str] = &["status", "page_url"];

/// Lifecycle states that exclude a PEP from the index.
pub const REJECTED_STATUSES: &[&str] = &["Rejected", "Withdrawn"];

/// Substring a PEP's `python_version` must contain to be indexed.
pub const TARGET_VERSION_MARKER: &str = "3.";

/// Minimum character count (exclusive) for a title token to become a tag.
pub const MIN_TAG_LEN: usize = 3;

// =============================================================================
// Presentation and Evaluation
// =============================================================================

/// Characters of chunk text shown (and highlighted) per result.
pub const DEFAULT_SNIPPET_SIZE: usize = 400;

/// Cutoff used for the recall metric.
pub const RECALL_CUTOFF: usize = 10;
