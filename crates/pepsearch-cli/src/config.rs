//! Runtime configuration and backend construction for the CLI.
//!
//! Every option can come from a flag or an environment variable:
//! - `PEPSEARCH_BACKEND`: `memory` (snapshot on disk) or `qdrant`
//! - `QDRANT_URL`, `QDRANT_API_KEY`
//! - `PEPSEARCH_COLLECTION`: collection alias
//! - `PEPSEARCH_DATA_DIR`: where the memory backend keeps its snapshot
//! - `PEPSEARCH_EMBEDDER`: `hashing` (offline) or `remote`
//! - `PEPSEARCH_INFERENCE_URL`, `PEPSEARCH_INFERENCE_API_KEY`
//! - `PEPSEARCH_TIMEOUT_SECS`: bound on every external call

use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use directories::ProjectDirs;
use pepsearch_core::config::DEFAULT_COLLECTION;
use pepsearch_core::embedding::{
    EmbeddingProvider, HashingEmbedder, RemoteEmbedder, RemoteEmbedderConfig,
};
use pepsearch_core::index::{InMemoryIndex, QdrantConfig, QdrantIndex, VectorIndex};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Snapshot file name for the memory backend
const SNAPSHOT_FILENAME: &str = "index.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    Hashing,
    Remote,
}

/// Backend and embedding options shared by all subcommands.
#[derive(Debug, Clone, Args)]
pub struct BackendArgs {
    /// Index backend
    #[arg(long, value_enum, env = "PEPSEARCH_BACKEND", default_value = "memory", global = true)]
    pub backend: BackendKind,

    /// Qdrant REST endpoint
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333", global = true)]
    pub qdrant_url: String,

    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true, global = true)]
    pub qdrant_api_key: Option<String>,

    /// Collection alias to ingest into and search
    #[arg(long, env = "PEPSEARCH_COLLECTION", default_value = DEFAULT_COLLECTION, global = true)]
    pub collection: String,

    /// Custom data directory (default: platform standard location)
    #[arg(long, env = "PEPSEARCH_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Embedding provider
    #[arg(long, value_enum, env = "PEPSEARCH_EMBEDDER", default_value = "hashing", global = true)]
    pub embedder: EmbedderKind,

    /// Inference service base URL (remote embedder)
    #[arg(long, env = "PEPSEARCH_INFERENCE_URL", global = true)]
    pub inference_url: Option<String>,

    #[arg(long, env = "PEPSEARCH_INFERENCE_API_KEY", hide_env_values = true, global = true)]
    pub inference_api_key: Option<String>,

    /// Timeout in seconds for every external call
    #[arg(long, env = "PEPSEARCH_TIMEOUT_SECS", default_value = "30", global = true)]
    pub timeout_secs: u64,
}

impl BackendArgs {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds the configured embedding provider.
    pub fn build_embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match self.embedder {
            EmbedderKind::Hashing => Ok(Arc::new(HashingEmbedder::default())),
            EmbedderKind::Remote => {
                let endpoint = self.inference_url.clone().ok_or_else(|| {
                    anyhow!("--inference-url (or PEPSEARCH_INFERENCE_URL) is required for the remote embedder")
                })?;
                let mut config = RemoteEmbedderConfig::new(endpoint);
                config.api_key = self.inference_api_key.clone();
                config.timeout = self.call_timeout();
                let embedder =
                    RemoteEmbedder::new(config).context("Failed to configure remote embedder")?;
                Ok(Arc::new(embedder))
            }
        }
    }

    /// Opens the configured index backend.
    pub fn open_index(&self) -> Result<OpenIndex> {
        match self.backend {
            BackendKind::Memory => {
                let path = snapshot_path(self.data_dir.as_ref())?;
                let index = if path.exists() {
                    InMemoryIndex::load_snapshot(&path).with_context(|| {
                        format!("Failed to load index snapshot: {}", path.display())
                    })?
                } else {
                    InMemoryIndex::new()
                };
                Ok(OpenIndex::Memory {
                    index: Arc::new(index),
                    path,
                })
            }
            BackendKind::Qdrant => {
                let mut config = QdrantConfig::new(self.qdrant_url.clone());
                config.api_key = self.qdrant_api_key.clone();
                config.timeout = self.call_timeout();
                let index = QdrantIndex::new(config)
                    .with_context(|| format!("Invalid Qdrant URL: {}", self.qdrant_url))?;
                Ok(OpenIndex::Qdrant(Arc::new(index)))
            }
        }
    }
}

/// An opened backend. The memory backend remembers where to persist itself.
pub enum OpenIndex {
    Memory {
        index: Arc<InMemoryIndex>,
        path: PathBuf,
    },
    Qdrant(Arc<QdrantIndex>),
}

impl OpenIndex {
    pub fn as_dyn(&self) -> Arc<dyn VectorIndex> {
        match self {
            OpenIndex::Memory { index, .. } => index.clone(),
            OpenIndex::Qdrant(index) => index.clone(),
        }
    }

    /// Writes the memory backend's snapshot. No-op for Qdrant.
    pub fn persist(&self) -> Result<()> {
        if let OpenIndex::Memory { index, path } = self {
            index
                .save_snapshot(path)
                .with_context(|| format!("Failed to write index snapshot: {}", path.display()))?;
            info!("Saved index snapshot to {}", path.display());
        }
        Ok(())
    }
}

/// Returns the data directory.
///
/// - macOS: `~/Library/Application Support/org.pepsearch.pepsearch/`
/// - Linux: `~/.local/share/pepsearch/`
/// - Windows: `%APPDATA%\pepsearch\pepsearch\data\`
pub fn get_data_dir(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = custom_dir {
        return Ok(dir.clone());
    }

    ProjectDirs::from("org", "pepsearch", "pepsearch")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

/// Returns the path of the memory backend snapshot.
pub fn snapshot_path(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    Ok(get_data_dir(custom_dir)?.join(SNAPSHOT_FILENAME))
}

/// True if a snapshot exists at the resolved location.
pub fn has_snapshot(path: &Path) -> bool {
    path.is_file()
}
