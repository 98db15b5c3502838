use serde::{Deserialize, Serialize};
use std::fmt;

/// Chunk identifier.
///
/// Assigned sequentially from 0 during ingestion, in document, section, block
/// order. Unique within one collection generation; a new generation starts
/// over at 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Create a ChunkId from a u64 value.
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The atomic retrievable unit.
///
/// Immutable once built. Every chunk belongs to one section (`section_url`)
/// of one document (`page_url`). This is also the payload stored next to the
/// vectors in the index, so field names are the filterable payload keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub page_title: String,
    /// Lifecycle label of the PEP (Draft, Accepted, Final, ...)
    pub status: String,
    pub page_url: String,
    pub section_title: String,
    /// `page_url` plus the intra-page anchor (possibly empty)
    pub section_url: String,
    /// URL path segments followed by the anchor fragment
    pub breadcrumbs: Vec<String>,
    /// Whitespace-collapsed text of one block; never empty
    pub chunk_text: String,
    /// Text of the preceding block in the same section
    pub prev_section_text: Option<String>,
    /// Text of the following block in the same section
    pub next_section_text: Option<String>,
    /// Lowercase title keywords longer than 3 characters
    pub tags: Vec<String>,
}

impl Chunk {
    /// Text handed to the embedding providers.
    pub fn embedding_text(&self) -> &str {
        &self.chunk_text
    }

    /// Look up a payload field as JSON, for in-process filter evaluation.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        use serde_json::Value;
        match name {
            "id" => Some(Value::from(self.id.as_u64())),
            "page_title" => Some(Value::from(self.page_title.as_str())),
            "status" => Some(Value::from(self.status.as_str())),
            "page_url" => Some(Value::from(self.page_url.as_str())),
            "section_title" => Some(Value::from(self.section_title.as_str())),
            "section_url" => Some(Value::from(self.section_url.as_str())),
            "breadcrumbs" => Some(Value::from(self.breadcrumbs.clone())),
            "chunk_text" => Some(Value::from(self.chunk_text.as_str())),
            "prev_section_text" => self.prev_section_text.as_deref().map(Value::from),
            "next_section_text" => self.next_section_text.as_deref().map(Value::from),
            "tags" => Some(Value::from(self.tags.clone())),
            _ => None,
        }
    }
}

/// Raw pre-chunk record produced by a document source.
///
/// One record per structural block, in page order. Document level fields are
/// repeated on every block of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBlock {
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub page_url: Option<String>,
    /// Anchor including the leading `#`, or empty
    #[serde(default)]
    pub section_anchor: String,
    pub section_id: String,
    pub block_text: String,
    #[serde(default)]
    pub python_version: Option<String>,
}
