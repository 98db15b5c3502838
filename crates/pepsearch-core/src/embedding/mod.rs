//! Embedding capability and providers.
//!
//! Every chunk and every query is encoded three ways:
//!
//! - dense: one fixed-length semantic vector
//! - sparse: index to weight map of lexical term importance
//! - tokens: one vector per token for late-interaction (MaxSim) scoring
//!
//! ## Core Trait
//!
//! - [`EmbeddingProvider`] - async encoding of documents and queries
//!
//! ## Implementations
//!
//! - [`HashingEmbedder`] - deterministic feature-hashing provider, no model files
//! - [`RemoteEmbedder`] - HTTP client for a hosted inference endpoint

mod hashing;
mod remote;
mod traits;
mod types;

pub use hashing::HashingEmbedder;
pub use remote::{RemoteEmbedder, RemoteEmbedderConfig};
pub use traits::EmbeddingProvider;
pub use types::{validate_dimension, SparseVector, TokenMatrix, VectorTriple};
