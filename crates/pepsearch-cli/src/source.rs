//! Document sources: the PEP website and JSON-lines files.
//!
//! Both produce a lazy, ordered stream of [`SourceBlock`]s. Problems with one
//! document surface as [`IngestError::Structural`] so the pipeline can skip
//! it; transport failures surface as [`IngestError::Source`] and end the run.

use anyhow::{Context, Result};
use futures::stream::{self, Stream, StreamExt};
use once_cell::sync::Lazy;
use pepsearch_core::chunk::{EligibilityPolicy, SourceBlock};
use pepsearch_core::error::IngestError;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// PEP index published by the PEP website
pub const PEPS_API: &str = "https://peps.python.org/api/peps.json";

/// Pages fetched concurrently. Output order is unaffected.
const FETCH_CONCURRENCY: usize = 4;

const USER_AGENT: &str = concat!("pepsearch/", env!("CARGO_PKG_VERSION"));

/// Direct children of a section that never become blocks
const SKIPPED_ELEMENTS: &[&str] = &["h1", "h2", "h3", "h4", "section", "details", "img", "hr"];

static PAGE_SECTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#pep-page-section").expect("valid selector"));
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").expect("valid selector"));
static SECTION: Lazy<Selector> = Lazy::new(|| Selector::parse("section").expect("valid selector"));
static BACKREF: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.toc-backref").expect("valid selector"));

/// One entry of the PEP index.
#[derive(Debug, Clone, Deserialize)]
pub struct PepEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub python_version: Option<String>,
}

impl PepEntry {
    fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| "Unknown".to_string())
    }

    fn status(&self) -> &str {
        self.status.as_deref().unwrap_or_default()
    }

    /// Block carrying the document-level fields; text and section filled per block.
    fn template(&self) -> SourceBlock {
        SourceBlock {
            title: self.title(),
            status: self.status().to_string(),
            page_url: self.url.clone(),
            section_anchor: String::new(),
            section_id: String::new(),
            block_text: String::new(),
            python_version: self.python_version.clone(),
        }
    }
}

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Fetches the PEP index and returns entries in PEP number order.
pub async fn fetch_pep_index(client: &Client, api_url: &str) -> Result<Vec<PepEntry>> {
    let url = url::Url::parse(api_url).with_context(|| format!("Invalid API URL: {}", api_url))?;
    let index: BTreeMap<String, PepEntry> = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("Failed to fetch PEP index from {}", api_url))?
        .json()
        .await
        .context("Failed to decode PEP index")?;

    let mut entries: Vec<(u32, PepEntry)> = index
        .into_iter()
        .map(|(number, entry)| (number.parse().unwrap_or(u32::MAX), entry))
        .collect();
    entries.sort_by_key(|(number, _)| *number);
    info!("PEP index lists {} documents", entries.len());
    Ok(entries.into_iter().map(|(_, entry)| entry).collect())
}

/// Streams the blocks of every eligible PEP.
///
/// Ineligible entries are dropped before any page is fetched.
pub fn pep_blocks(
    client: Client,
    entries: Vec<PepEntry>,
    policy: &EligibilityPolicy,
) -> impl Stream<Item = Result<SourceBlock, IngestError>> {
    let eligible: Vec<PepEntry> = entries
        .into_iter()
        .filter(|e| policy.is_eligible(e.status(), e.python_version.as_deref()))
        .collect();
    info!("{} eligible documents", eligible.len());

    stream::iter(eligible)
        .map(move |entry| {
            let client = client.clone();
            async move { document_blocks(&client, entry).await }
        })
        .buffered(FETCH_CONCURRENCY)
        .flat_map(stream::iter)
}

async fn document_blocks(client: &Client, entry: PepEntry) -> Vec<Result<SourceBlock, IngestError>> {
    let Some(page_url) = entry.url.clone() else {
        return vec![Err(IngestError::structural(&entry.title(), "page_url"))];
    };

    debug!("Fetching {}", page_url);
    let html = match fetch_text(client, &page_url).await {
        Ok(html) => html,
        Err(err) => return vec![Err(IngestError::Source(format!("{}: {}", page_url, err)))],
    };

    match parse_pep_page(&html, &entry.template()) {
        Ok(blocks) => blocks.into_iter().map(Ok).collect(),
        Err(err) => vec![Err(err)],
    }
}

async fn fetch_text(client: &Client, url: &str) -> Result<String, reqwest::Error> {
    client.get(url).send().await?.error_for_status()?.text().await
}

/// Splits a PEP page into blocks.
///
/// Walks every `section` of the article inside `#pep-page-section`. The
/// anchor is the `href` of the section's `a.toc-backref`, or empty. Every
/// direct child element except headings, nested sections, `details`, images
/// and rules becomes one block.
pub fn parse_pep_page(html: &str, template: &SourceBlock) -> Result<Vec<SourceBlock>, IngestError> {
    let document = Html::parse_document(html);
    let container = document
        .select(&PAGE_SECTION)
        .next()
        .ok_or_else(|| IngestError::structural(&template.title, "pep-page-section"))?;
    let article = container
        .select(&ARTICLE)
        .next()
        .ok_or_else(|| IngestError::structural(&template.title, "article"))?;

    let mut blocks = Vec::new();
    for section in article.select(&SECTION) {
        let section_id = section.value().attr("id").unwrap_or_default().to_string();
        let anchor = section
            .select(&BACKREF)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default()
            .to_string();

        for child in section.children().filter_map(ElementRef::wrap) {
            if SKIPPED_ELEMENTS.contains(&child.value().name()) {
                continue;
            }
            blocks.push(SourceBlock {
                section_anchor: anchor.clone(),
                section_id: section_id.clone(),
                block_text: child.text().collect(),
                ..template.clone()
            });
        }
    }
    Ok(blocks)
}

/// Reads one JSON-encoded [`SourceBlock`] per line. Blank lines are skipped.
///
/// A line that fails to decode is a source error carrying its line number.
pub fn jsonl_blocks(path: &Path) -> Result<impl Iterator<Item = Result<SourceBlock, IngestError>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let lines = std::io::BufReader::new(file).lines().enumerate();

    Ok(lines.filter_map(|(number, line)| {
        let line = match line {
            Ok(line) => line,
            Err(err) => return Some(Err(IngestError::Source(err.to_string()))),
        };
        if line.trim().is_empty() {
            return None;
        }
        Some(
            serde_json::from_str::<SourceBlock>(&line)
                .map_err(|e| IngestError::Source(format!("line {}: {}", number + 1, e))),
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PAGE: &str = r##"
        <html><body>
        <section id="pep-page-section">
          <article>
            <section id="abstract">
              <h2><a class="toc-backref" href="#abstract">Abstract</a></h2>
              <p>This PEP proposes
                 the walrus operator.</p>
              <img src="x.png">
              <pre>x := 1</pre>
              <section id="nested">
                <h3><a class="toc-backref" href="#nested">Nested</a></h3>
                <p>Nested text.</p>
              </section>
            </section>
            <section id="no-anchor">
              <hr>
              <p>Plain block.</p>
            </section>
          </article>
        </section>
        </body></html>
    "##;

    fn template() -> SourceBlock {
        PepEntry {
            title: Some("PEP 572 Assignment Expressions".to_string()),
            status: Some("Final".to_string()),
            url: Some("https://peps.python.org/pep-0572/".to_string()),
            python_version: Some("3.8".to_string()),
        }
        .template()
    }

    #[test]
    fn test_parse_sections_and_blocks() {
        let blocks = parse_pep_page(PAGE, &template()).unwrap();
        let summary: Vec<(&str, &str)> = blocks
            .iter()
            .map(|b| (b.section_id.as_str(), b.section_anchor.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("abstract", "#abstract"),
                ("abstract", "#abstract"),
                ("nested", "#nested"),
                ("no-anchor", ""),
            ]
        );
        assert!(blocks[0].block_text.contains("walrus operator"));
        assert_eq!(blocks[1].block_text, "x := 1");
        assert_eq!(blocks[3].block_text, "Plain block.");
        assert!(blocks
            .iter()
            .all(|b| b.page_url.as_deref() == Some("https://peps.python.org/pep-0572/")));
    }

    #[test]
    fn test_missing_container_is_structural() {
        let err = parse_pep_page("<html><body><p>moved</p></body></html>", &template()).unwrap_err();
        assert_eq!(
            err,
            IngestError::structural("PEP 572 Assignment Expressions", "pep-page-section")
        );
    }

    #[test]
    fn test_missing_article_is_structural() {
        let html = r#"<div id="pep-page-section"><p>no article</p></div>"#;
        let err = parse_pep_page(html, &template()).unwrap_err();
        assert!(matches!(err, IngestError::Structural { element, .. } if element == "article"));
    }

    #[tokio::test]
    async fn test_entry_without_url_is_structural() {
        let client = http_client(Duration::from_secs(1)).unwrap();
        let entry = PepEntry {
            title: Some("PEP 9999 Lost".to_string()),
            status: Some("Final".to_string()),
            url: None,
            python_version: Some("3.12".to_string()),
        };
        let blocks = document_blocks(&client, entry).await;
        assert_eq!(blocks, vec![Err(IngestError::structural("PEP 9999 Lost", "page_url"))]);
    }

    #[test]
    fn test_jsonl_blocks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let block = serde_json::to_string(&template()).unwrap();
        writeln!(file, "{}", block).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{not json").unwrap();

        let items: Vec<_> = jsonl_blocks(file.path()).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &template());
        assert!(matches!(&items[1], Err(IngestError::Source(msg)) if msg.starts_with("line 3")));
    }
}
