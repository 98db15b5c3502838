//! Ingestion pipeline.
//!
//! Builds a complete new collection generation from a block source, then
//! atomically points the serving alias at it:
//!
//! 1. **Generation**: creates `{alias}_g{n}` with keyword payload indexes
//! 2. **Chunking**: folds source blocks into linked chunks
//! 3. **Embedding**: encodes each chunk three ways, a bounded number of
//!    chunks at a time
//! 4. **Upsert**: writes batches of points into the new generation
//! 5. **Swap**: moves the alias, then drops generations older than the one
//!    it replaced
//!
//! Queries keep hitting the old generation until step 5, so they never see
//! a partially populated collection. The replaced generation survives until
//! the next run, so a query that resolved the alias just before the swap
//! still finishes against it. A fatal error drops the partial generation and
//! leaves the alias untouched.
//!
//! # Example
//!
//! ```ignore
//! use pepsearch_core::processing::IngestionPipeline;
//!
//! let pipeline = IngestionPipeline::new(index, embedder, "pep_search");
//! let report = pipeline
//!     .ingest(blocks, |progress| println!("{} chunks", progress.chunks_indexed))
//!     .await?;
//! ```

mod pipeline;
mod progress;

pub use pipeline::{IngestReport, IngestionPipeline, PipelineError};
pub use progress::{IngestProgress, ProgressTimer};
