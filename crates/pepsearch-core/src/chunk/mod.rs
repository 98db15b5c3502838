//! Chunk model and ingestion fold.
//!
//! A [`Chunk`] is one structural block of a PEP section, carrying its
//! neighbours' text so retrieval has local context without a query-time
//! window step. [`ChunkAssembler`] folds an ordered stream of
//! [`SourceBlock`]s into chunks, assigning ids and prev/next links.

mod ingest;
mod types;

pub use ingest::{
    breadcrumbs_for, extract_tags, normalize_text, ChunkAssembler, ChunkStream, EligibilityPolicy,
};
pub use types::{Chunk, ChunkId, SourceBlock};
