//! Generation-building ingestion pipeline.

use super::progress::{IngestProgress, ProgressTimer};
use crate::chunk::{Chunk, ChunkAssembler, EligibilityPolicy, SourceBlock};
use crate::config::{EMBED_CONCURRENCY, INGEST_BATCH_SIZE, KEYWORD_INDEX_FIELDS};
use crate::embedding::EmbeddingProvider;
use crate::error::{EmbeddingError, IndexError, IngestError};
use crate::index::{CollectionSchema, IndexedPoint, PayloadSchemaType, VectorIndex};
use futures::{Stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors that abort an ingestion run.
///
/// Structural errors in individual documents are not fatal; they are
/// collected in [`IngestReport::failed_documents`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Embedding failed for chunk {chunk}: {source}")]
    Embedding {
        chunk: u64,
        #[source]
        source: EmbeddingError,
    },

    #[error("Index operation failed: {0}")]
    Index(#[from] IndexError),

    #[error("{0}")]
    Source(IngestError),
}

/// Outcome of a completed ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub alias: String,
    /// Collection the alias now points at
    pub generation: String,
    /// Generation that was replaced, if any. It stays in the index until
    /// the next run so queries that resolved the alias before the swap can
    /// finish against it.
    pub previous_generation: Option<String>,
    /// Older generations removed after the swap
    pub dropped_generations: Vec<String>,
    pub chunks_indexed: usize,
    /// Structural errors, one per rejected document
    pub failed_documents: Vec<IngestError>,
    /// Blocks dropped by the eligibility gate
    pub skipped_ineligible: usize,
    pub elapsed_ms: u64,
}

/// Builds a new generation from a block source and swaps it in.
pub struct IngestionPipeline {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    alias: String,
    batch_size: usize,
    embed_concurrency: usize,
    policy: EligibilityPolicy,
}

struct RunState {
    generation: String,
    batch: Vec<Chunk>,
    progress: IngestProgress,
    failed_documents: Vec<IngestError>,
    timer: ProgressTimer,
}

impl IngestionPipeline {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            index,
            embedder,
            alias: alias.into(),
            batch_size: INGEST_BATCH_SIZE,
            embed_concurrency: EMBED_CONCURRENCY,
            policy: EligibilityPolicy::default(),
        }
    }

    /// Points per upsert request (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Chunks embedded concurrently (minimum 1).
    pub fn with_embed_concurrency(mut self, concurrency: usize) -> Self {
        self.embed_concurrency = concurrency.max(1);
        self
    }

    pub fn with_policy(mut self, policy: EligibilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ingests a synchronous block source.
    pub async fn ingest_iter<I>(&self, source: I) -> Result<IngestReport, PipelineError>
    where
        I: IntoIterator<Item = Result<SourceBlock, IngestError>>,
    {
        self.ingest(futures::stream::iter(source), |_| {}).await
    }

    /// Ingests a block stream into a fresh generation and swaps the alias.
    ///
    /// `on_progress` runs after every flushed batch.
    #[instrument(skip_all, fields(alias = %self.alias))]
    pub async fn ingest<S, F>(&self, source: S, mut on_progress: F) -> Result<IngestReport, PipelineError>
    where
        S: Stream<Item = Result<SourceBlock, IngestError>>,
        F: FnMut(&IngestProgress),
    {
        let generation = self.next_generation().await?;
        let schema = CollectionSchema {
            dense_dim: self.embedder.dense_dim(),
            token_dim: self.embedder.token_dim(),
        };

        if self.index.collection_exists(&generation).await? {
            warn!("Dropping stale collection {}", generation);
            self.index.drop_collection(&generation).await?;
        }
        self.index.create_collection(&generation, &schema).await?;
        info!("Building generation {}", generation);

        let mut run = RunState {
            generation: generation.clone(),
            batch: Vec::with_capacity(self.batch_size),
            progress: IngestProgress::default(),
            failed_documents: Vec::new(),
            timer: ProgressTimer::new(),
        };

        let mut assembler = ChunkAssembler::new(self.policy.clone());
        if let Err(err) = self
            .populate(source, &mut assembler, &mut run, &mut on_progress)
            .await
        {
            warn!("Ingestion failed, dropping partial generation {}: {}", generation, err);
            if let Err(drop_err) = self.index.drop_collection(&generation).await {
                warn!("Failed to drop {}: {}", generation, drop_err);
            }
            return Err(err);
        }

        let previous = self.index.swap_alias(&self.alias, &generation).await?;
        info!(
            "Alias {} -> {} ({} chunks)",
            self.alias, generation, run.progress.chunks_indexed
        );
        let dropped_generations = self.prune_generations(&generation, previous.as_deref()).await;

        Ok(IngestReport {
            alias: self.alias.clone(),
            generation,
            previous_generation: previous,
            dropped_generations,
            chunks_indexed: run.progress.chunks_indexed,
            failed_documents: run.failed_documents,
            skipped_ineligible: assembler.skipped_ineligible(),
            elapsed_ms: run.timer.elapsed_ms(),
        })
    }

    async fn populate<S, F>(
        &self,
        source: S,
        assembler: &mut ChunkAssembler,
        run: &mut RunState,
        on_progress: &mut F,
    ) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<SourceBlock, IngestError>>,
        F: FnMut(&IngestProgress),
    {
        for field in KEYWORD_INDEX_FIELDS {
            self.index
                .ensure_payload_index(&run.generation, field, PayloadSchemaType::Keyword)
                .await?;
        }

        futures::pin_mut!(source);
        while let Some(item) = source.next().await {
            for output in assembler.push(item) {
                self.accept(output, run, on_progress).await?;
            }
        }
        for output in assembler.finish() {
            self.accept(output, run, on_progress).await?;
        }
        self.flush(run, on_progress).await
    }

    async fn accept<F>(
        &self,
        output: Result<Chunk, IngestError>,
        run: &mut RunState,
        on_progress: &mut F,
    ) -> Result<(), PipelineError>
    where
        F: FnMut(&IngestProgress),
    {
        match output {
            Ok(chunk) => {
                run.batch.push(chunk);
                if run.batch.len() >= self.batch_size {
                    self.flush(run, on_progress).await?;
                }
                Ok(())
            }
            Err(err @ IngestError::Structural { .. }) => {
                run.failed_documents.push(err);
                run.progress.failed_documents = run.failed_documents.len();
                Ok(())
            }
            Err(err) => Err(PipelineError::Source(err)),
        }
    }

    /// Embeds the pending batch, at most `embed_concurrency` chunks at a
    /// time, and upserts it.
    async fn flush<F>(&self, run: &mut RunState, on_progress: &mut F) -> Result<(), PipelineError>
    where
        F: FnMut(&IngestProgress),
    {
        if run.batch.is_empty() {
            return Ok(());
        }
        let chunks = std::mem::take(&mut run.batch);

        let embedder = &self.embedder;
        let triples: Vec<_> = futures::stream::iter(chunks.iter())
            .map(|chunk| async move {
                embedder
                    .embed_document(chunk.embedding_text())
                    .await
                    .map_err(|source| PipelineError::Embedding {
                        chunk: chunk.id.as_u64(),
                        source,
                    })
            })
            .buffered(self.embed_concurrency)
            .try_collect()
            .await?;

        let points: Vec<IndexedPoint> = chunks
            .into_iter()
            .zip(triples)
            .map(|(chunk, vectors)| IndexedPoint {
                id: chunk.id,
                vectors,
                chunk,
            })
            .collect();
        let count = points.len();
        self.index.upsert(&run.generation, points).await?;

        run.progress.chunks_indexed += count;
        run.progress.batches_flushed += 1;
        run.progress.elapsed_ms = run.timer.elapsed_ms();
        debug!(
            "Flushed batch {} ({} points)",
            run.progress.batches_flushed, count
        );
        on_progress(&run.progress);
        Ok(())
    }

    /// Drops every generation of the alias except `current` and `previous`.
    ///
    /// Runs after the swap, so failures are logged and never fail the run.
    async fn prune_generations(&self, current: &str, previous: Option<&str>) -> Vec<String> {
        let names = match self.index.list_collections().await {
            Ok(names) => names,
            Err(err) => {
                warn!("Skipping cleanup of old generations: {}", err);
                return Vec::new();
            }
        };

        let mut dropped = Vec::new();
        for name in names {
            if self.generation_number(&name).is_none()
                || name == current
                || Some(name.as_str()) == previous
            {
                continue;
            }
            match self.index.drop_collection(&name).await {
                Ok(()) => {
                    debug!("Dropped old generation {}", name);
                    dropped.push(name);
                }
                Err(err) => warn!("Failed to drop old generation {}: {}", name, err),
            }
        }
        dropped
    }

    fn generation_number(&self, name: &str) -> Option<u64> {
        name.strip_prefix(&self.alias)?
            .strip_prefix("_g")?
            .parse()
            .ok()
    }

    /// `{alias}_g{n}` with `n` one past the highest existing generation.
    async fn next_generation(&self) -> Result<String, PipelineError> {
        let latest = self
            .index
            .list_collections()
            .await?
            .iter()
            .filter_map(|name| self.generation_number(name))
            .max();
        Ok(format!("{}_g{}", self.alias, latest.map_or(1, |n| n + 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::index::InMemoryIndex;
    use crate::search::{HybridSearchEngine, QueryConfig};
    use crate::test_utils::{sample_blocks, CountingEmbedder, FailingEmbedder, GatedIndex};
    use std::time::Duration;

    fn pipeline(index: Arc<InMemoryIndex>) -> IngestionPipeline {
        IngestionPipeline::new(index, Arc::new(HashingEmbedder::new(32, 8)), "pep_search")
    }

    fn ok(blocks: Vec<SourceBlock>) -> Vec<Result<SourceBlock, IngestError>> {
        blocks.into_iter().map(Ok).collect()
    }

    #[tokio::test]
    async fn test_ingest_builds_generation_and_swaps_alias() {
        let index = Arc::new(InMemoryIndex::new());
        let report = pipeline(index.clone())
            .ingest_iter(ok(sample_blocks()))
            .await
            .unwrap();

        assert_eq!(report.generation, "pep_search_g1");
        assert_eq!(report.previous_generation, None);
        assert_eq!(report.chunks_indexed, index.len("pep_search").unwrap());
        assert!(report.chunks_indexed > 0);
        assert_eq!(
            index.alias_target("pep_search").await.unwrap(),
            Some("pep_search_g1".to_string())
        );
        assert_eq!(
            index.payload_indexes("pep_search").unwrap(),
            vec!["page_url", "status"]
        );
    }

    #[tokio::test]
    async fn test_reingest_keeps_previous_generation_and_drops_older_ones() {
        let index = Arc::new(InMemoryIndex::new());
        let pipeline = pipeline(index.clone());
        pipeline.ingest_iter(ok(sample_blocks())).await.unwrap();
        let second = pipeline
            .ingest_iter(ok(sample_blocks()[..2].to_vec()))
            .await
            .unwrap();

        assert_eq!(second.generation, "pep_search_g2");
        assert_eq!(second.previous_generation.as_deref(), Some("pep_search_g1"));
        assert!(second.dropped_generations.is_empty());
        assert_eq!(
            index.list_collections().await.unwrap(),
            vec!["pep_search_g1", "pep_search_g2"]
        );
        assert_eq!(index.len("pep_search").unwrap(), 2);

        let third = pipeline
            .ingest_iter(ok(sample_blocks()[..1].to_vec()))
            .await
            .unwrap();
        assert_eq!(third.previous_generation.as_deref(), Some("pep_search_g2"));
        assert_eq!(third.dropped_generations, vec!["pep_search_g1"]);
        assert_eq!(
            index.list_collections().await.unwrap(),
            vec!["pep_search_g2", "pep_search_g3"]
        );
    }

    #[tokio::test]
    async fn test_query_in_flight_during_reingest_finishes_on_old_generation() {
        let inner = Arc::new(InMemoryIndex::new());
        pipeline(inner.clone())
            .ingest_iter(ok(sample_blocks()))
            .await
            .unwrap();

        let gated = Arc::new(GatedIndex::gating_fetches(inner.clone()));
        let engine = HybridSearchEngine::new(
            gated.clone(),
            Arc::new(HashingEmbedder::new(32, 8)),
            "pep_search",
        );
        let query = tokio::spawn(async move {
            engine
                .search("walrus operator", None, &QueryConfig::default())
                .await
        });

        // The query has resolved the alias to g1 and is waiting in fetch_points
        gated.fetch_started.notified().await;
        let report = pipeline(inner.clone())
            .ingest_iter(ok(sample_blocks()[..2].to_vec()))
            .await
            .unwrap();
        assert_eq!(report.previous_generation.as_deref(), Some("pep_search_g1"));
        assert_eq!(
            inner.alias_target("pep_search").await.unwrap(),
            Some("pep_search_g2".to_string())
        );

        gated.release_fetch.notify_one();
        let hits = query.await.unwrap().unwrap();
        assert_eq!(hits.len(), sample_blocks().len());
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_fail_ingest() {
        let inner = Arc::new(InMemoryIndex::new());
        let pipeline = pipeline(inner.clone());
        pipeline.ingest_iter(ok(sample_blocks())).await.unwrap();
        pipeline.ingest_iter(ok(sample_blocks())).await.unwrap();

        let report = IngestionPipeline::new(
            Arc::new(GatedIndex::failing_drops(inner.clone())),
            Arc::new(HashingEmbedder::new(32, 8)),
            "pep_search",
        )
        .ingest_iter(ok(sample_blocks()[..1].to_vec()))
        .await
        .unwrap();

        assert_eq!(report.generation, "pep_search_g3");
        assert!(report.dropped_generations.is_empty());
        assert_eq!(
            inner.alias_target("pep_search").await.unwrap(),
            Some("pep_search_g3".to_string())
        );
        assert_eq!(
            inner.list_collections().await.unwrap(),
            vec!["pep_search_g1", "pep_search_g2", "pep_search_g3"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_embedding_concurrency_is_bounded() {
        let embedder = Arc::new(CountingEmbedder::new(Duration::from_millis(10)));
        let report = IngestionPipeline::new(
            Arc::new(InMemoryIndex::new()),
            embedder.clone(),
            "pep_search",
        )
        .with_embed_concurrency(2)
        .ingest_iter(ok(sample_blocks()))
        .await
        .unwrap();

        assert_eq!(report.chunks_indexed, sample_blocks().len());
        // Two chunks at a time, three encoder calls each
        assert_eq!(embedder.peak(), 6);
    }

    #[tokio::test]
    async fn test_structural_errors_are_reported_not_fatal() {
        let index = Arc::new(InMemoryIndex::new());
        let mut broken = sample_blocks()[0].clone();
        broken.title = "Broken PEP".to_string();
        broken.page_url = None;

        let mut source = ok(sample_blocks());
        source.insert(1, Ok(broken));
        let report = pipeline(index).ingest_iter(source).await.unwrap();

        assert_eq!(
            report.failed_documents,
            vec![IngestError::structural("Broken PEP", "page_url")]
        );
        assert_eq!(report.chunks_indexed, sample_blocks().len());
    }

    #[tokio::test]
    async fn test_batches_and_progress() {
        let index = Arc::new(InMemoryIndex::new());
        let blocks = sample_blocks();
        let mut seen = Vec::new();
        let report = pipeline(index)
            .with_batch_size(2)
            .ingest(futures::stream::iter(ok(blocks.clone())), |p| {
                seen.push(p.chunks_indexed)
            })
            .await
            .unwrap();

        let expected_batches = blocks.len().div_ceil(2);
        assert_eq!(seen.len(), expected_batches);
        assert_eq!(seen.last().copied(), Some(report.chunks_indexed));
    }

    #[tokio::test]
    async fn test_embedding_failure_drops_partial_generation_and_keeps_alias() {
        let index = Arc::new(InMemoryIndex::new());
        pipeline(index.clone())
            .ingest_iter(ok(sample_blocks()))
            .await
            .unwrap();

        let failing = IngestionPipeline::new(index.clone(), Arc::new(FailingEmbedder), "pep_search");
        let err = failing.ingest_iter(ok(sample_blocks())).await.unwrap_err();

        assert!(matches!(err, PipelineError::Embedding { chunk: 0, .. }));
        assert_eq!(
            index.alias_target("pep_search").await.unwrap(),
            Some("pep_search_g1".to_string())
        );
        assert_eq!(index.list_collections().await.unwrap(), vec!["pep_search_g1"]);
    }

    #[tokio::test]
    async fn test_source_failure_is_fatal() {
        let index = Arc::new(InMemoryIndex::new());
        let source = vec![Err(IngestError::Source("listing unavailable".to_string()))];
        let err = pipeline(index.clone()).ingest_iter(source).await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
        assert!(index.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_source_swaps_in_empty_generation() {
        let index = Arc::new(InMemoryIndex::new());
        let report = pipeline(index.clone()).ingest_iter(Vec::new()).await.unwrap();
        assert_eq!(report.chunks_indexed, 0);
        assert_eq!(index.len("pep_search").unwrap(), 0);
    }
}
