//! Labeled test sets and configuration matrices.
//!
//! An evaluation file is a JSON document:
//!
//! ```json
//! {
//!   "configs": [
//!     { "name": "baseline", "dense_limit": 100, "sparse_limit": 100, "rrf_limit": 100 }
//!   ],
//!   "tests": [
//!     { "query": "assignment expressions", "expected": ["https://peps.python.org/pep-0572/#syntax-and-semantics"] }
//!   ],
//!   "filter": [ { "field": "status", "op": "in", "value": ["Final", "Accepted"] } ]
//! }
//! ```
//!
//! `rff_limit` is accepted as a synonym of `rrf_limit`, and `colbert_top_k`
//! defaults to 10 when omitted.

use crate::filter::FilterCondition;
use crate::search::QueryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors loading or validating an evaluation file.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read evaluation file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse evaluation file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid evaluation file: {0}")]
    Invalid(String),
}

/// One labeled query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub query: String,
    /// Section URLs that count as relevant
    #[serde(default)]
    pub expected: Vec<String>,
}

/// A [`QueryConfig`] with a display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedQueryConfig {
    pub name: String,
    #[serde(flatten)]
    pub config: QueryConfig,
}

/// A full evaluation run: every config is evaluated against every test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    pub configs: Vec<NamedQueryConfig>,
    pub tests: Vec<TestCase>,
    /// Conditions applied to every query
    #[serde(default)]
    pub filter: Vec<FilterCondition>,
}

impl EvalConfig {
    /// Reads and validates an evaluation file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, DatasetError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Non-empty config and test lists, unique config names, valid limits.
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.configs.is_empty() {
            return Err(DatasetError::Invalid("no configs".to_string()));
        }
        if self.tests.is_empty() {
            return Err(DatasetError::Invalid("no tests".to_string()));
        }

        let mut names = HashSet::new();
        for named in &self.configs {
            if !names.insert(named.name.as_str()) {
                return Err(DatasetError::Invalid(format!(
                    "duplicate config name '{}'",
                    named.name
                )));
            }
            named
                .config
                .validate()
                .map_err(|e| DatasetError::Invalid(format!("config '{}': {}", named.name, e)))?;
        }

        if let Some(case) = self.tests.iter().find(|t| t.query.trim().is_empty()) {
            return Err(DatasetError::Invalid(format!(
                "empty query (expected {:?})",
                case.expected
            )));
        }
        Ok(())
    }
}
