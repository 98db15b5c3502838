//! Runs a configuration matrix against a live engine.

use super::dataset::{EvalConfig, NamedQueryConfig, TestCase};
use super::metrics::{mean, percentile, recall_at_k, reciprocal_rank};
use crate::config::RECALL_CUTOFF;
use crate::error::FilterError;
use crate::filter::{build_filter, FilterPredicate};
use crate::search::{HybridSearchEngine, QueryConfig, SearchError};
use futures::future::try_join_all;
use instant::Instant;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

/// Errors that abort an evaluation run.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// A query failed. A failed query is never scored as a miss.
    #[error("Config '{config}' failed on query '{query}': {source}")]
    Fatal {
        config: String,
        query: String,
        #[source]
        source: SearchError,
    },

    #[error("Invalid evaluation filter: {0}")]
    Filter(#[from] FilterError),
}

/// Outcome of one test case under one config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseOutcome {
    pub query: String,
    pub expected: Vec<String>,
    /// Section URLs in result order
    pub returned: Vec<String>,
    pub recall_at_10: f64,
    pub reciprocal_rank: f64,
    pub latency_ms: f64,
}

/// Aggregates for one config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigMetrics {
    pub recall_at_10: f64,
    pub mrr_at_10: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub test_count: usize,
}

impl ConfigMetrics {
    pub fn from_cases(cases: &[CaseOutcome]) -> Self {
        let recalls: Vec<f64> = cases.iter().map(|c| c.recall_at_10).collect();
        let ranks: Vec<f64> = cases.iter().map(|c| c.reciprocal_rank).collect();
        let latencies: Vec<f64> = cases.iter().map(|c| c.latency_ms).collect();
        Self {
            recall_at_10: mean(&recalls),
            mrr_at_10: mean(&ranks),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p95_ms: percentile(&latencies, 95.0),
            test_count: cases.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigReport {
    pub name: String,
    pub config: QueryConfig,
    pub metrics: ConfigMetrics,
    pub cases: Vec<CaseOutcome>,
}

/// Reports in the order the configs were declared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub configs: Vec<ConfigReport>,
}

/// Evaluates every config of an [`EvalConfig`] against every test case.
///
/// Test cases within a config always run one at a time so their latencies do
/// not interfere. Configs run one after another unless
/// [`with_parallel_configs`](Self::with_parallel_configs) is set; results
/// never depend on that choice.
pub struct EvaluationHarness {
    engine: HybridSearchEngine,
    parallel_configs: bool,
}

impl EvaluationHarness {
    pub fn new(engine: HybridSearchEngine) -> Self {
        Self {
            engine,
            parallel_configs: false,
        }
    }

    pub fn with_parallel_configs(mut self, parallel: bool) -> Self {
        self.parallel_configs = parallel;
        self
    }

    /// Runs the whole matrix. `on_case` is called after each completed case
    /// with the config name.
    ///
    /// # Errors
    ///
    /// The first failing query aborts the run with [`EvaluationError::Fatal`].
    #[instrument(skip_all, fields(configs = eval.configs.len(), tests = eval.tests.len()))]
    pub async fn run<F>(&self, eval: &EvalConfig, on_case: F) -> Result<EvaluationReport, EvaluationError>
    where
        F: Fn(&str, &CaseOutcome),
    {
        let filter = build_filter(&eval.filter)?;
        let filter = filter.as_ref();

        let configs = if self.parallel_configs {
            try_join_all(
                eval.configs
                    .iter()
                    .map(|named| self.run_config(named, &eval.tests, filter, &on_case)),
            )
            .await?
        } else {
            let mut reports = Vec::with_capacity(eval.configs.len());
            for named in &eval.configs {
                reports.push(self.run_config(named, &eval.tests, filter, &on_case).await?);
            }
            reports
        };

        Ok(EvaluationReport { configs })
    }

    /// Runs every test case under one config.
    pub async fn run_config<F>(
        &self,
        named: &NamedQueryConfig,
        tests: &[TestCase],
        filter: Option<&FilterPredicate>,
        on_case: &F,
    ) -> Result<ConfigReport, EvaluationError>
    where
        F: Fn(&str, &CaseOutcome),
    {
        let mut cases = Vec::with_capacity(tests.len());
        for test in tests {
            let start = Instant::now();
            let hits = self
                .engine
                .search(&test.query, filter, &named.config)
                .await
                .map_err(|source| EvaluationError::Fatal {
                    config: named.name.clone(),
                    query: test.query.clone(),
                    source,
                })?;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            let returned: Vec<String> = hits.into_iter().map(|h| h.chunk.section_url).collect();
            let outcome = CaseOutcome {
                query: test.query.clone(),
                expected: test.expected.clone(),
                recall_at_10: recall_at_k(&returned, &test.expected, RECALL_CUTOFF),
                reciprocal_rank: reciprocal_rank(&returned, &test.expected),
                returned,
                latency_ms,
            };
            on_case(&named.name, &outcome);
            cases.push(outcome);
        }

        let metrics = ConfigMetrics::from_cases(&cases);
        info!(
            "Config '{}': recall@10 {:.3}, mrr@10 {:.3}, p50 {:.1}ms, p95 {:.1}ms",
            named.name,
            metrics.recall_at_10,
            metrics.mrr_at_10,
            metrics.latency_p50_ms,
            metrics.latency_p95_ms
        );

        Ok(ConfigReport {
            name: named.name.clone(),
            config: named.config,
            metrics,
            cases,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{populated_index, FailingIndex};
    use crate::embedding::HashingEmbedder;
    use crate::filter::FilterCondition;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn engine() -> HybridSearchEngine {
        let index = populated_index().await;
        HybridSearchEngine::new(index, Arc::new(HashingEmbedder::default()), "peps")
    }

    fn eval_config(json: &str) -> EvalConfig {
        EvalConfig::from_json_str(json).unwrap()
    }

    const TWO_CONFIGS: &str = r#"{
        "configs": [
            {"name": "wide", "dense_limit": 50, "sparse_limit": 50, "rrf_limit": 50},
            {"name": "narrow", "dense_limit": 5, "sparse_limit": 5, "rrf_limit": 5, "colbert_top_k": 3}
        ],
        "tests": [
            {"query": "assignment expressions walrus operator",
             "expected": ["https://peps.python.org/pep-0572/#abstract"]},
            {"query": "structural pattern matching statement",
             "expected": ["https://peps.python.org/pep-0634/#abstract"]},
            {"query": "unrelated question", "expected": []}
        ]
    }"#;

    #[tokio::test]
    async fn test_reports_per_config_in_declared_order() {
        let harness = EvaluationHarness::new(engine().await);
        let report = harness.run(&eval_config(TWO_CONFIGS), |_, _| {}).await.unwrap();

        let names: Vec<&str> = report.configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["wide", "narrow"]);
        for config in &report.configs {
            assert_eq!(config.metrics.test_count, 3);
            assert_eq!(config.cases.len(), 3);
            assert!(config.metrics.recall_at_10 >= 0.0 && config.metrics.recall_at_10 <= 1.0);
            assert!(config.metrics.latency_p50_ms <= config.metrics.latency_p95_ms);
            // The empty-expected case never counts as a hit
            assert_eq!(config.cases[2].recall_at_10, 0.0);
            assert_eq!(config.cases[2].reciprocal_rank, 0.0);
        }
        assert!(report.configs[1].cases.iter().all(|c| c.returned.len() <= 3));
    }

    #[tokio::test]
    async fn test_relevant_sections_are_found() {
        let harness = EvaluationHarness::new(engine().await);
        let report = harness.run(&eval_config(TWO_CONFIGS), |_, _| {}).await.unwrap();
        let wide = &report.configs[0];
        assert_eq!(wide.cases[0].recall_at_10, 1.0);
        assert_eq!(wide.cases[1].recall_at_10, 1.0);
    }

    #[tokio::test]
    async fn test_parallel_configs_match_sequential() {
        let eval = eval_config(TWO_CONFIGS);
        let sequential = EvaluationHarness::new(engine().await)
            .run(&eval, |_, _| {})
            .await
            .unwrap();
        let parallel = EvaluationHarness::new(engine().await)
            .with_parallel_configs(true)
            .run(&eval, |_, _| {})
            .await
            .unwrap();

        for (a, b) in sequential.configs.iter().zip(&parallel.configs) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.metrics.recall_at_10, b.metrics.recall_at_10);
            assert_eq!(a.metrics.mrr_at_10, b.metrics.mrr_at_10);
            let returned_a: Vec<_> = a.cases.iter().map(|c| &c.returned).collect();
            let returned_b: Vec<_> = b.cases.iter().map(|c| &c.returned).collect();
            assert_eq!(returned_a, returned_b);
        }
    }

    #[tokio::test]
    async fn test_progress_callback_per_case() {
        let seen = AtomicUsize::new(0);
        let harness = EvaluationHarness::new(engine().await);
        harness
            .run(&eval_config(TWO_CONFIGS), |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_filter_applies_to_every_query() {
        let mut eval = eval_config(TWO_CONFIGS);
        eval.filter = vec![FilterCondition::new(
            "page_url",
            "==",
            "https://peps.python.org/pep-0572/",
        )];
        let report = EvaluationHarness::new(engine().await)
            .run(&eval, |_, _| {})
            .await
            .unwrap();
        for case in &report.configs[0].cases {
            assert!(case
                .returned
                .iter()
                .all(|url| url.starts_with("https://peps.python.org/pep-0572/")));
        }
    }

    #[tokio::test]
    async fn test_invalid_filter_rejected() {
        let mut eval = eval_config(TWO_CONFIGS);
        eval.filter = vec![FilterCondition::new("status", "~=", "Final")];
        let result = EvaluationHarness::new(engine().await).run(&eval, |_, _| {}).await;
        assert!(matches!(result, Err(EvaluationError::Filter(_))));
    }

    #[tokio::test]
    async fn test_failed_query_aborts_run() {
        let engine = HybridSearchEngine::new(
            Arc::new(FailingIndex),
            Arc::new(HashingEmbedder::default()),
            "peps",
        );
        let result = EvaluationHarness::new(engine)
            .run(&eval_config(TWO_CONFIGS), |_, _| {})
            .await;
        match result {
            Err(EvaluationError::Fatal { config, query, source }) => {
                assert_eq!(config, "wide");
                assert_eq!(query, "assignment expressions walrus operator");
                assert!(matches!(source, SearchError::RetrievalUnavailable(_)));
            }
            other => panic!("expected fatal error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_metrics_from_cases() {
        let case = |recall: f64, rr: f64, latency: f64| CaseOutcome {
            query: "q".to_string(),
            expected: vec![],
            returned: vec![],
            recall_at_10: recall,
            reciprocal_rank: rr,
            latency_ms: latency,
        };
        let metrics = ConfigMetrics::from_cases(&[
            case(1.0, 1.0, 10.0),
            case(1.0, 0.5, 20.0),
            case(0.0, 0.0, 30.0),
            case(0.0, 0.0, 40.0),
        ]);
        assert_eq!(metrics.recall_at_10, 0.5);
        assert_eq!(metrics.mrr_at_10, 0.375);
        assert!((metrics.latency_p50_ms - 25.0).abs() < 1e-9);
        assert!((metrics.latency_p95_ms - 38.5).abs() < 1e-9);
        assert_eq!(metrics.test_count, 4);
    }
}
