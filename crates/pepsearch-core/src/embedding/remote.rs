//! HTTP client for a hosted inference endpoint.
//!
//! Sends `{"model": .., "input": [..]}` to one endpoint per call and reads
//! either `{"data": [{"embedding": .., "index": ..}]}` or `{"embeddings": [..]}`.
//! The model name selects the representation, so the same endpoint serves the
//! dense, sparse and late-interaction models. Connection failures, 429s and
//! 5xx responses are retried with exponential backoff.

use super::traits::EmbeddingProvider;
use super::types::{validate_dimension, SparseVector, TokenMatrix};
use crate::config::{DENSE_DIM, DENSE_MODEL, SPARSE_MODEL, TOKEN_DIM, TOKEN_MODEL};
use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Connection settings for [`RemoteEmbedder`].
#[derive(Debug, Clone)]
pub struct RemoteEmbedderConfig {
    /// Full inference URL, e.g. `https://cluster.example/inference/text`
    pub endpoint: String,
    /// Value for the `api-key` header
    pub api_key: Option<String>,
    pub dense_model: String,
    pub sparse_model: String,
    pub token_model: String,
    pub dense_dim: usize,
    pub token_dim: usize,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl RemoteEmbedderConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            dense_model: DENSE_MODEL.to_string(),
            sparse_model: SPARSE_MODEL.to_string(),
            token_model: TOKEN_MODEL.to_string(),
            dense_dim: DENSE_DIM,
            token_dim: TOKEN_DIM,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Clone)]
pub struct RemoteEmbedder {
    client: Client,
    config: RemoteEmbedderConfig,
}

impl RemoteEmbedder {
    pub fn new(config: RemoteEmbedderConfig) -> Result<Self, EmbeddingError> {
        if !(config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://")) {
            return Err(EmbeddingError::InvalidConfig(
                "inference endpoint must be an http(s) URL".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(key)
                .map_err(|_| EmbeddingError::InvalidConfig("invalid API key".to_string()))?;
            headers.insert("api-key", value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::InvalidConfig(e.to_string()))?;

        let mut config = config;
        config.endpoint = config.endpoint.trim_end_matches('/').to_string();
        config.max_retries = config.max_retries.max(1);
        Ok(Self { client, config })
    }

    async fn infer<T: DeserializeOwned>(&self, model: &str, text: &str) -> Result<T, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let inputs = [text];
        let request = InferenceRequest {
            model,
            inputs: &inputs,
        };

        let mut attempt = 0usize;
        loop {
            let response = self
                .client
                .post(&self.config.endpoint)
                .json(&request)
                .send()
                .await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let payload: InferenceResponse<T> = resp
                            .json()
                            .await
                            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
                        return payload.into_single();
                    }
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.config.max_retries {
                        attempt += 1;
                        debug!(model, %status, attempt, "Retrying inference request");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingError::RequestFailed(format!("{}: {}", status, body)));
                }
                Err(err) => {
                    if (err.is_connect() || err.is_timeout() || err.is_request())
                        && attempt + 1 < self.config.max_retries
                    {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingError::RequestFailed(err.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    fn dense_dim(&self) -> usize {
        self.config.dense_dim
    }

    fn token_dim(&self) -> usize {
        self.config.token_dim
    }

    async fn embed_dense(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vector: Vec<f32> = self.infer(&self.config.dense_model, text).await?;
        validate_dimension(self.config.dense_dim, vector.len())?;
        Ok(vector)
    }

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector, EmbeddingError> {
        let raw: SparseVector = self.infer(&self.config.sparse_model, text).await?;
        if raw.indices.len() != raw.values.len() {
            return Err(EmbeddingError::InvalidResponse(
                "sparse indices and values differ in length".to_string(),
            ));
        }
        Ok(SparseVector::from_pairs(raw.indices.into_iter().zip(raw.values)))
    }

    async fn embed_tokens(&self, text: &str) -> Result<TokenMatrix, EmbeddingError> {
        let matrix: TokenMatrix = self.infer(&self.config.token_model, text).await?;
        for row in &matrix {
            validate_dimension(self.config.token_dim, row.len())?;
        }
        Ok(matrix)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(250 * (1 << capped))
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct InferenceResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<InferenceData<T>>,
    #[serde(default = "Vec::new")]
    embeddings: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct InferenceData<T> {
    embedding: T,
    #[serde(default)]
    index: Option<usize>,
}

impl<T> InferenceResponse<T> {
    fn into_single(self) -> Result<T, EmbeddingError> {
        let mut data = self.data;
        data.sort_by_key(|d| d.index.unwrap_or(0));
        data.into_iter()
            .next()
            .map(|d| d.embedding)
            .or_else(|| self.embeddings.into_iter().next())
            .ok_or_else(|| {
                EmbeddingError::InvalidResponse("response missing embedding payload".to_string())
            })
    }
}
