//! Hybrid retrieval: parallel dense + sparse retrieval, Reciprocal Rank Fusion
//! and a late-interaction (MaxSim) rerank.
//!
//! ## Components
//!
//! - [`HybridSearchEngine`] - query encoding, timeouts and error mapping
//! - [`fusion`] - RRF over ranked id lists
//! - [`rerank`] - MaxSim scoring over token matrices
//! - [`format`] - display records and query-term highlighting

pub mod engine;
pub mod format;
pub mod fusion;
pub mod rerank;
pub mod types;

pub use engine::HybridSearchEngine;
pub use format::{DisplayRecord, Highlighter};
pub use types::{QueryConfig, SearchError, SearchHit};
