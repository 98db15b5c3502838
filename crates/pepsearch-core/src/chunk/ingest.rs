//! Ingestion fold: ordered source blocks in, linked and numbered chunks out.
//!
//! The fold keeps a one-chunk window. A chunk is held back until the next
//! block arrives, because its `next_section_text` is only known then. The
//! held chunk also provides `prev_section_text` for the incoming block.

use super::types::{Chunk, ChunkId, SourceBlock};
use crate::config::{MIN_TAG_LEN, REJECTED_STATUSES, TARGET_VERSION_MARKER};
use crate::error::IngestError;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Data-quality gate applied before chunking.
///
/// Excluded documents are dropped silently. This is not an error path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityPolicy {
    pub rejected_statuses: Vec<String>,
    pub version_marker: String,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            rejected_statuses: REJECTED_STATUSES.iter().map(|s| s.to_string()).collect(),
            version_marker: TARGET_VERSION_MARKER.to_string(),
        }
    }
}

impl EligibilityPolicy {
    /// Accept everything. Useful for sources that are already curated.
    pub fn permissive() -> Self {
        Self {
            rejected_statuses: Vec::new(),
            version_marker: String::new(),
        }
    }

    pub fn is_eligible(&self, status: &str, python_version: Option<&str>) -> bool {
        if self.rejected_statuses.iter().any(|s| s == status) {
            return false;
        }
        match python_version {
            Some(version) => version.contains(self.version_marker.as_str()),
            None => self.version_marker.is_empty(),
        }
    }
}

/// Collapses every whitespace run to one space and trims both ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase title tokens longer than [`MIN_TAG_LEN`] characters, first-seen order.
pub fn extract_tags(title: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for token in title.split_whitespace() {
        if token.chars().count() <= MIN_TAG_LEN {
            continue;
        }
        let tag = token.to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Path segments of `section_url` without the first and last, then the fragment.
///
/// `https://peps.python.org/pep-0008/#intro` gives `["pep-0008", "intro"]`.
/// The fragment is always the last element (empty when the URL has none).
pub fn breadcrumbs_for(section_url: &str) -> Vec<String> {
    let (path, fragment) = match url::Url::parse(section_url) {
        Ok(parsed) => (
            parsed.path().to_string(),
            parsed.fragment().unwrap_or_default().to_string(),
        ),
        // Relative URL: no scheme, split by hand
        Err(_) => {
            let (rest, fragment) = section_url.split_once('#').unwrap_or((section_url, ""));
            let path = rest.split_once('?').map_or(rest, |(p, _)| p);
            (path.to_string(), fragment.to_string())
        }
    };

    let parts: Vec<&str> = path.split('/').collect();
    let mut crumbs: Vec<String> = if parts.len() > 2 {
        parts[1..parts.len() - 1]
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        Vec::new()
    };
    crumbs.push(fragment);
    crumbs
}

/// Identity of a section: chunks only link to neighbours sharing it.
type SectionKey = (String, String);

/// Explicit fold over the ingestion sequence.
///
/// Feed blocks in source order with [`push`](Self::push), then call
/// [`finish`](Self::finish) once to flush the last held chunk.
///
/// ```
/// use pepsearch_core::chunk::{ChunkAssembler, SourceBlock};
///
/// let block = |text: &str| SourceBlock {
///     title: "Structural Pattern Matching".into(),
///     status: "Final".into(),
///     page_url: Some("https://peps.python.org/pep-0634/".into()),
///     section_anchor: "#abstract".into(),
///     section_id: "abstract".into(),
///     block_text: text.into(),
///     python_version: Some("3.10".into()),
/// };
///
/// let mut assembler = ChunkAssembler::default();
/// let mut chunks = assembler.push(Ok(block("first")));
/// chunks.extend(assembler.push(Ok(block("second"))));
/// chunks.extend(assembler.finish());
///
/// let chunks: Vec<_> = chunks.into_iter().map(Result::unwrap).collect();
/// assert_eq!(chunks[0].next_section_text.as_deref(), Some("second"));
/// assert_eq!(chunks[1].prev_section_text.as_deref(), Some("first"));
/// ```
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    policy: EligibilityPolicy,
    next_id: u64,
    held: Option<(SectionKey, Chunk)>,
    /// Title of the document whose remaining blocks are being skipped
    failed_document: Option<String>,
    skipped_ineligible: usize,
}

impl ChunkAssembler {
    pub fn new(policy: EligibilityPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Number of chunks emitted or held so far.
    pub fn assigned(&self) -> u64 {
        self.next_id
    }

    /// Number of blocks dropped by the eligibility gate.
    pub fn skipped_ineligible(&self) -> usize {
        self.skipped_ineligible
    }

    /// Fold one source item. Returns zero, one or two outputs.
    pub fn push(
        &mut self,
        item: Result<SourceBlock, IngestError>,
    ) -> Vec<Result<Chunk, IngestError>> {
        let block = match item {
            Ok(block) => block,
            Err(err) => return self.fail(err),
        };

        if let Some(failed) = &self.failed_document {
            if *failed == block.title {
                return Vec::new();
            }
            self.failed_document = None;
        }

        if !self
            .policy
            .is_eligible(&block.status, block.python_version.as_deref())
        {
            self.skipped_ineligible += 1;
            return Vec::new();
        }

        let page_url = match block.page_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => return self.fail(IngestError::structural(&block.title, "page_url")),
        };

        let text = normalize_text(&block.block_text);
        if text.is_empty() {
            debug!(section = %block.section_id, "Dropping empty block");
            return Vec::new();
        }

        let key: SectionKey = (page_url.clone(), block.section_id.clone());
        let mut chunk = self.build(block, page_url, text);

        let mut out = Vec::new();
        if let Some((held_key, mut held)) = self.held.take() {
            if held_key == key {
                held.next_section_text = Some(chunk.chunk_text.clone());
                chunk.prev_section_text = Some(held.chunk_text.clone());
            }
            out.push(Ok(held));
        }
        self.held = Some((key, chunk));
        out
    }

    /// Flush the held chunk. The assembler is spent afterwards.
    pub fn finish(&mut self) -> Vec<Result<Chunk, IngestError>> {
        self.held
            .take()
            .map(|(_, chunk)| Ok(chunk))
            .into_iter()
            .collect()
    }

    fn build(&mut self, block: SourceBlock, page_url: String, chunk_text: String) -> Chunk {
        let id = ChunkId::from_u64(self.next_id);
        self.next_id += 1;

        let section_url = format!("{}{}", page_url, block.section_anchor);
        Chunk {
            id,
            tags: extract_tags(&block.title),
            breadcrumbs: breadcrumbs_for(&section_url),
            page_title: block.title,
            status: block.status,
            page_url,
            section_title: block.section_id,
            section_url,
            chunk_text,
            prev_section_text: None,
            next_section_text: None,
        }
    }

    fn fail(&mut self, err: IngestError) -> Vec<Result<Chunk, IngestError>> {
        if let IngestError::Structural { document, element } = &err {
            if self.failed_document.as_deref() == Some(document.as_str()) {
                return Vec::new();
            }
            warn!(document = %document, element = %element, "Skipping structurally invalid document");
            self.failed_document = Some(document.clone());
        }
        let mut out = self.finish();
        out.push(Err(err));
        out
    }
}

/// Iterator adapter running a [`ChunkAssembler`] over a block source.
///
/// Lazy and single-pass, like the source it wraps.
pub struct ChunkStream<I> {
    source: I,
    assembler: ChunkAssembler,
    ready: VecDeque<Result<Chunk, IngestError>>,
    exhausted: bool,
}

impl<I> ChunkStream<I>
where
    I: Iterator<Item = Result<SourceBlock, IngestError>>,
{
    pub fn new(source: I, policy: EligibilityPolicy) -> Self {
        Self {
            source,
            assembler: ChunkAssembler::new(policy),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<I> Iterator for ChunkStream<I>
where
    I: Iterator<Item = Result<SourceBlock, IngestError>>,
{
    type Item = Result<Chunk, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }
            if self.exhausted {
                return None;
            }
            match self.source.next() {
                Some(item) => self.ready.extend(self.assembler.push(item)),
                None => {
                    self.exhausted = true;
                    self.ready.extend(self.assembler.finish());
                }
            }
        }
    }
}
