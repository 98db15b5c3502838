//! Display records and query-term highlighting.
//!
//! Pure presentation: nothing here touches the underlying results.

use super::types::SearchHit;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::debug;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid token regex"));

const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_RESET: &str = "\x1b[0m";

/// Compiled size cap for the highlight pattern (the `regex` default).
const PATTERN_SIZE_LIMIT: usize = 10 * (1 << 20);

/// What a consumer shows for one result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRecord {
    pub score: f32,
    pub page_title: String,
    pub section: String,
    pub section_url: String,
    pub chunk_text: String,
    pub breadcrumbs: Vec<String>,
}

impl From<&SearchHit> for DisplayRecord {
    fn from(hit: &SearchHit) -> Self {
        Self {
            score: hit.score,
            page_title: hit.chunk.page_title.clone(),
            section: hit.chunk.section_title.clone(),
            section_url: hit.chunk.section_url.clone(),
            chunk_text: hit.chunk.chunk_text.clone(),
            breadcrumbs: hit.chunk.breadcrumbs.clone(),
        }
    }
}

/// Marks whole-word, case-insensitive occurrences of query tokens.
///
/// ```
/// use pepsearch_core::search::Highlighter;
///
/// let h = Highlighter::new("match", "[", "]");
/// assert_eq!(h.highlight("Match statements match; rematch", 100), "[Match] statements [match]; rematch");
/// ```
#[derive(Debug, Clone)]
pub struct Highlighter {
    pattern: Option<Regex>,
    open: String,
    close: String,
}

impl Highlighter {
    pub fn new(query: &str, open: impl Into<String>, close: impl Into<String>) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        for m in TOKEN_RE.find_iter(query) {
            let token = m.as_str().to_lowercase();
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        // Longest first so overlapping alternatives prefer the full word
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Self {
            pattern: build_pattern(&tokens, PATTERN_SIZE_LIMIT),
            open: open.into(),
            close: close.into(),
        }
    }

    /// Green terminal emphasis.
    pub fn ansi(query: &str) -> Self {
        Self::new(query, ANSI_GREEN, ANSI_RESET)
    }

    /// Takes the first `max_chars` characters of `text` and wraps every match.
    /// Matched text keeps its original casing.
    pub fn highlight(&self, text: &str, max_chars: usize) -> String {
        let snippet: String = text.chars().take(max_chars).collect();
        match &self.pattern {
            Some(pattern) => pattern
                .replace_all(&snippet, |caps: &regex::Captures| {
                    format!("{}{}{}", self.open, &caps[0], self.close)
                })
                .into_owned(),
            None => snippet,
        }
    }
}

/// Whole-word, case-insensitive alternation of `tokens`.
///
/// `None` when there is nothing to match or the pattern does not compile;
/// highlighting then returns the plain prefix.
fn build_pattern(tokens: &[String], size_limit: usize) -> Option<Regex> {
    if tokens.is_empty() {
        return None;
    }
    let alternation = tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    match RegexBuilder::new(&format!(r"\b(?:{})\b", alternation))
        .case_insensitive(true)
        .size_limit(size_limit)
        .build()
    {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            debug!(tokens = tokens.len(), "Highlighting disabled: {}", err);
            None
        }
    }
}
