//! In-memory index with brute-force scoring.
//!
//! Scores every point of a collection per query: cosine for dense vectors,
//! dot product over shared indices for sparse vectors and MaxSim for token
//! matrices. State can be written to and restored from a JSON snapshot so
//! separate processes can ingest and query.

use super::traits::{
    CollectionSchema, IndexedPoint, PayloadSchemaType, QueryVector, RetrieveRequest,
    ScoredCandidate, StoredPoint, VectorIndex,
};
use crate::chunk::{Chunk, ChunkId};
use crate::embedding::{SparseVector, VectorTriple};
use crate::error::IndexError;
use crate::search::rerank::{cosine_similarity, maxsim};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    vectors: VectorTriple,
    chunk: Chunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Collection {
    schema: CollectionSchema,
    payload_indexes: BTreeMap<String, PayloadSchemaType>,
    points: BTreeMap<ChunkId, StoredRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexState {
    collections: BTreeMap<String, Collection>,
    aliases: BTreeMap<String, String>,
}

impl IndexState {
    fn resolve(&self, name: &str) -> Result<&Collection, IndexError> {
        let target = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.collections
            .get(target)
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))
    }
}

/// Brute-force [`VectorIndex`] for tests, benchmarks and small corpora.
///
/// The lock is never held across an `.await`, so a cancelled query cannot
/// block later ones. Alias swaps happen under one write lock, so readers see
/// either the old or the new generation.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    state: RwLock<IndexState>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores an index from a snapshot written by [`save_snapshot`](Self::save_snapshot).
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let state: IndexState = serde_json::from_slice(&bytes)?;
        info!(
            "Loaded index snapshot from {} ({} collections)",
            path.display(),
            state.collections.len()
        );
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Writes the full state as JSON. Written to a sibling temp file first,
    /// then renamed over `path`.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let path = path.as_ref();
        let bytes = {
            let state = self.read()?;
            serde_json::to_vec(&*state)?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        debug!("Saved index snapshot to {}", path.display());
        Ok(())
    }

    /// Number of points in a collection (or alias target).
    pub fn len(&self, collection: &str) -> Result<usize, IndexError> {
        Ok(self.read()?.resolve(collection)?.points.len())
    }

    pub fn payload_indexes(&self, collection: &str) -> Result<Vec<String>, IndexError> {
        Ok(self
            .read()?
            .resolve(collection)?
            .payload_indexes
            .keys()
            .cloned()
            .collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexState>, IndexError> {
        self.state
            .read()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>, IndexError> {
        self.state
            .write()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".to_string()))
    }
}

fn check_dim(representation: &'static str, expected: usize, actual: usize) -> Result<(), IndexError> {
    if expected != actual {
        return Err(IndexError::DimensionMismatch {
            representation,
            expected,
            actual,
        });
    }
    Ok(())
}

fn shares_index(a: &SparseVector, b: &SparseVector) -> bool {
    a.indices.iter().any(|i| b.indices.binary_search(i).is_ok())
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool, IndexError> {
        Ok(self.read()?.collections.contains_key(name))
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<(), IndexError> {
        let mut state = self.write()?;
        if state.collections.contains_key(name) {
            return Err(IndexError::InvalidRequest(format!(
                "collection '{}' already exists",
                name
            )));
        }
        state.collections.insert(
            name.to_string(),
            Collection {
                schema: *schema,
                payload_indexes: BTreeMap::new(),
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), IndexError> {
        self.write()?.collections.remove(name);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        Ok(self.read()?.collections.keys().cloned().collect())
    }

    async fn ensure_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema: PayloadSchemaType,
    ) -> Result<(), IndexError> {
        let mut state = self.write()?;
        let target = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        target
            .payload_indexes
            .entry(field.to_string())
            .or_insert(schema);
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<(), IndexError> {
        let mut state = self.write()?;
        let target = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;

        // Validate the whole batch before touching the collection
        for point in &points {
            check_dim("dense", target.schema.dense_dim, point.vectors.dense.len())?;
            for row in &point.vectors.tokens {
                check_dim("colbert", target.schema.token_dim, row.len())?;
            }
        }
        for point in points {
            target.points.insert(
                point.id,
                StoredRecord {
                    vectors: point.vectors,
                    chunk: point.chunk,
                },
            );
        }
        Ok(())
    }

    async fn retrieve(
        &self,
        collection: &str,
        request: &RetrieveRequest,
    ) -> Result<Vec<ScoredCandidate>, IndexError> {
        let state = self.read()?;
        let target = state.resolve(collection)?;

        match &request.query {
            QueryVector::Dense(vector) => check_dim("dense", target.schema.dense_dim, vector.len())?,
            QueryVector::Tokens(matrix) => {
                for row in matrix {
                    check_dim("colbert", target.schema.token_dim, row.len())?;
                }
            }
            QueryVector::Sparse(_) => {}
        }

        let filter = request.filter.as_ref();
        let mut hits: Vec<ScoredCandidate> = target
            .points
            .iter()
            .filter(|(_, record)| filter.map_or(true, |f| f.matches(&record.chunk)))
            .filter_map(|(id, record)| {
                let score = match &request.query {
                    QueryVector::Dense(q) => cosine_similarity(q, &record.vectors.dense),
                    QueryVector::Sparse(q) => {
                        if !shares_index(q, &record.vectors.sparse) {
                            return None;
                        }
                        q.dot(&record.vectors.sparse)
                    }
                    QueryVector::Tokens(q) => maxsim(q, &record.vectors.tokens),
                };
                Some(ScoredCandidate { id: *id, score })
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
        let state = self.read()?;
        let target = state.resolve(collection)?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                target.points.get(id).map(|record| StoredPoint {
                    id: *id,
                    chunk: record.chunk.clone(),
                    tokens: record.vectors.tokens.clone(),
                })
            })
            .collect())
    }

    async fn alias_target(&self, alias: &str) -> Result<Option<String>, IndexError> {
        Ok(self.read()?.aliases.get(alias).cloned())
    }

    async fn swap_alias(&self, alias: &str, collection: &str) -> Result<Option<String>, IndexError> {
        let mut state = self.write()?;
        if !state.collections.contains_key(collection) {
            return Err(IndexError::CollectionNotFound(collection.to_string()));
        }
        Ok(state
            .aliases
            .insert(alias.to_string(), collection.to_string()))
    }
}
