//! Multi-representation index capability and adapters.
//!
//! ## Core Trait
//!
//! - [`VectorIndex`] - collection lifecycle, payload indexes, upsert, retrieval,
//!   alias swaps and the provided two-stage [`fuse_and_rerank`](VectorIndex::fuse_and_rerank)
//!
//! ## Implementations
//!
//! - [`InMemoryIndex`] - brute-force scoring with JSON snapshots
//! - [`QdrantIndex`] - REST adapter for a Qdrant server

mod memory;
mod qdrant;
mod traits;

pub use memory::InMemoryIndex;
pub use qdrant::{QdrantConfig, QdrantIndex};
pub use traits::{
    CollectionSchema, HybridRequest, IndexedPoint, PayloadSchemaType, QueryVector, RankedPoint,
    Representation, RetrieveRequest, ScoredCandidate, StoredPoint, VectorIndex,
};
