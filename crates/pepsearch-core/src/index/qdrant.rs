//! Qdrant REST adapter.
//!
//! Collections carry three named vectors: `dense` (cosine), `colbert`
//! (cosine multivector with `max_sim`, HNSW disabled with `m = 0`) and the
//! sparse vector `sparse`. Payloads are the serialized [`Chunk`]s, so filter
//! keys are chunk field names. Results are re-sorted client-side by score
//! descending then id ascending, so equal scores order the same way for
//! every adapter.

use super::traits::{
    CollectionSchema, IndexedPoint, PayloadSchemaType, QueryVector, RetrieveRequest,
    ScoredCandidate, StoredPoint, VectorIndex,
};
use crate::chunk::{Chunk, ChunkId};
use crate::embedding::TokenMatrix;
use crate::error::IndexError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for [`QdrantIndex`].
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Base URL, e.g. `http://localhost:6333`
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl QdrantConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct QdrantIndex {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

impl QdrantIndex {
    pub fn new(config: QdrantConfig) -> Result<Self, IndexError> {
        let url = url::Url::parse(&config.url)
            .map_err(|e| IndexError::InvalidRequest(format!("invalid Qdrant URL: {}", e)))?;

        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(key)
                .map_err(|_| IndexError::InvalidRequest("invalid Qdrant API key".to_string()))?;
            headers.insert("api-key", value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: url.as_str().trim_end_matches('/').to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        collection: Option<&str>,
    ) -> Result<T, IndexError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            let parsed: QdrantResponse<T> = response
                .json()
                .await
                .map_err(|e| IndexError::Serialization(e.to_string()))?;
            return Ok(parsed.result);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(match (status, collection) {
            (StatusCode::NOT_FOUND, Some(name)) => IndexError::CollectionNotFound(name.to_string()),
            (s, _) if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                IndexError::Unavailable(format!("{}: {}", s, body))
            }
            (s, _) => IndexError::InvalidRequest(format!("{}: {}", s, body)),
        })
    }
}

/// Request body for `PUT /collections/{name}`.
fn collection_body(schema: &CollectionSchema) -> Value {
    json!({
        "vectors": {
            "dense": { "size": schema.dense_dim, "distance": "Cosine" },
            "colbert": {
                "size": schema.token_dim,
                "distance": "Cosine",
                "multivector_config": { "comparator": "max_sim" },
                "hnsw_config": { "m": 0 }
            }
        },
        "sparse_vectors": { "sparse": {} }
    })
}

fn point_body(point: &IndexedPoint) -> Result<Value, IndexError> {
    Ok(json!({
        "id": point.id.as_u64(),
        "vector": {
            "dense": point.vectors.dense,
            "sparse": {
                "indices": point.vectors.sparse.indices,
                "values": point.vectors.sparse.values
            },
            "colbert": point.vectors.tokens
        },
        "payload": serde_json::to_value(&point.chunk)?
    }))
}

fn query_body(request: &RetrieveRequest) -> Result<Value, IndexError> {
    let query = match &request.query {
        QueryVector::Dense(v) => json!(v),
        QueryVector::Sparse(s) => json!({ "indices": s.indices, "values": s.values }),
        QueryVector::Tokens(m) => json!(m),
    };
    let mut body = json!({
        "query": query,
        "using": request.query.representation().name(),
        "limit": request.limit,
        "with_payload": false,
    });
    if let Some(filter) = &request.filter {
        body["filter"] = serde_json::to_value(filter)?;
    }
    Ok(body)
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    points: Vec<ScoredPointResult>,
}

#[derive(Debug, Deserialize)]
struct ScoredPointResult {
    id: u64,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct RecordResult {
    id: u64,
    #[serde(default)]
    payload: Option<Chunk>,
    #[serde(default)]
    vector: Option<RecordVectors>,
}

#[derive(Debug, Deserialize)]
struct RecordVectors {
    #[serde(default)]
    colbert: TokenMatrix,
}

#[derive(Debug, Deserialize)]
struct AliasesResult {
    aliases: Vec<AliasDescription>,
}

#[derive(Debug, Deserialize)]
struct AliasDescription {
    alias_name: String,
    collection_name: String,
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool, IndexError> {
        let result: ExistsResult = self
            .call(Method::GET, &format!("/collections/{}/exists", name), None, None)
            .await?;
        Ok(result.exists)
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<(), IndexError> {
        let _: Value = self
            .call(
                Method::PUT,
                &format!("/collections/{}", name),
                Some(collection_body(schema)),
                None,
            )
            .await?;
        info!("Created Qdrant collection {}", name);
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), IndexError> {
        let _: Value = self
            .call(Method::DELETE, &format!("/collections/{}", name), None, None)
            .await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        let result: CollectionsResult = self.call(Method::GET, "/collections", None, None).await?;
        Ok(result.collections.into_iter().map(|c| c.name).collect())
    }

    async fn ensure_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema: PayloadSchemaType,
    ) -> Result<(), IndexError> {
        let body = json!({ "field_name": field, "field_schema": schema });
        let _: Value = self
            .call(
                Method::PUT,
                &format!("/collections/{}/index?wait=true", collection),
                Some(body),
                Some(collection),
            )
            .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<(), IndexError> {
        if points.is_empty() {
            return Ok(());
        }
        let bodies = points.iter().map(point_body).collect::<Result<Vec<_>, _>>()?;
        let _: Value = self
            .call(
                Method::PUT,
                &format!("/collections/{}/points?wait=true", collection),
                Some(json!({ "points": bodies })),
                Some(collection),
            )
            .await?;
        debug!("Upserted {} points into {}", points.len(), collection);
        Ok(())
    }

    async fn retrieve(
        &self,
        collection: &str,
        request: &RetrieveRequest,
    ) -> Result<Vec<ScoredCandidate>, IndexError> {
        let result: QueryResult = self
            .call(
                Method::POST,
                &format!("/collections/{}/points/query", collection),
                Some(query_body(request)?),
                Some(collection),
            )
            .await?;

        let mut hits: Vec<ScoredCandidate> = result
            .points
            .into_iter()
            .map(|p| ScoredCandidate {
                id: ChunkId::from_u64(p.id),
                score: p.score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(request.limit);
        Ok(hits)
    }

    async fn fetch_points(&self, collection: &str, ids: &[ChunkId]) -> Result<Vec<StoredPoint>, IndexError> {
        let body = json!({
            "ids": ids.iter().map(ChunkId::as_u64).collect::<Vec<_>>(),
            "with_payload": true,
            "with_vector": ["colbert"],
        });
        let records: Vec<RecordResult> = self
            .call(
                Method::POST,
                &format!("/collections/{}/points", collection),
                Some(body),
                Some(collection),
            )
            .await?;

        records
            .into_iter()
            .map(|record| {
                let chunk = record.payload.ok_or_else(|| {
                    IndexError::Serialization(format!("point {} has no payload", record.id))
                })?;
                Ok(StoredPoint {
                    id: ChunkId::from_u64(record.id),
                    chunk,
                    tokens: record.vector.map(|v| v.colbert).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn alias_target(&self, alias: &str) -> Result<Option<String>, IndexError> {
        let result: AliasesResult = self.call(Method::GET, "/aliases", None, None).await?;
        Ok(result
            .aliases
            .into_iter()
            .find(|a| a.alias_name == alias)
            .map(|a| a.collection_name))
    }

    async fn swap_alias(&self, alias: &str, collection: &str) -> Result<Option<String>, IndexError> {
        let previous = self.alias_target(alias).await?;

        // Delete and create in one request so the switch is atomic server-side
        let mut actions = Vec::new();
        if previous.is_some() {
            actions.push(json!({ "delete_alias": { "alias_name": alias } }));
        }
        actions.push(json!({
            "create_alias": { "collection_name": collection, "alias_name": alias }
        }));

        let _: Value = self
            .call(
                Method::POST,
                "/collections/aliases",
                Some(json!({ "actions": actions })),
                Some(collection),
            )
            .await?;
        info!("Alias {} now points at {}", alias, collection);
        Ok(previous)
    }
}
