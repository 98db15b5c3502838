//! # pepsearch Core
//!
//! Hybrid retrieval over Python Enhancement Proposals.
//!
//! Each chunk of a PEP is stored with three representations (dense, sparse and a
//! token matrix for late interaction). Queries run a two-stage protocol: parallel
//! dense + sparse retrieval fused with Reciprocal Rank Fusion, then a MaxSim
//! rerank over the fused candidates.
//!
//! ## Modules
//!
//! - [`chunk`] - Chunk model and the ingestion fold that produces chunks
//! - [`filter`] - Declarative filter conditions and the predicate builder
//! - [`embedding`] - Embedding capability trait and providers
//! - [`index`] - Multi-representation index capability and adapters
//! - [`search`] - Fusion engine (RRF + MaxSim) and result formatting
//! - [`processing`] - Ingestion pipeline with generation swaps
//! - [`evaluation`] - Recall / MRR / latency evaluation harness
//! - [`config`] - Default configuration constants
//! - [`error`] - Error types shared across modules

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod filter;
pub mod index;
pub mod processing;
pub mod search;

#[cfg(test)]
pub(crate) mod test_utils;
