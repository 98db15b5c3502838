//! Retrieval quality and latency evaluation.
//!
//! Runs a fixed labeled test set through the [`HybridSearchEngine`](crate::search::HybridSearchEngine)
//! under every configuration of a configuration matrix and reports, per
//! configuration:
//!
//! - **recall@10**: share of queries with an expected section in the top 10
//! - **mrr@10**: mean reciprocal rank of the first expected section
//! - **latency p50 / p95**: wall-clock query time, linear interpolation
//!
//! # Example
//!
//! ```ignore
//! use pepsearch_core::evaluation::{EvalConfig, EvaluationHarness};
//!
//! let eval = EvalConfig::load("data/eval.json")?;
//! let report = EvaluationHarness::new(engine).run(&eval, |_, _| {}).await?;
//! for config in &report.configs {
//!     println!("{}: recall@10 = {:.3}", config.name, config.metrics.recall_at_10);
//! }
//! ```

pub mod dataset;
pub mod harness;
pub mod metrics;

pub use dataset::{DatasetError, EvalConfig, NamedQueryConfig, TestCase};
pub use harness::{
    CaseOutcome, ConfigMetrics, ConfigReport, EvaluationError, EvaluationHarness, EvaluationReport,
};
