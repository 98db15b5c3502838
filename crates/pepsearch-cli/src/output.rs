//! Output formatting for search results and ingest reports.
//!
//! Supports both human-readable terminal output and JSON for scripting.

use pepsearch_core::processing::IngestReport;
use pepsearch_core::search::{DisplayRecord, Highlighter, SearchHit};
use serde::Serialize;

/// JSON output structure for search results
#[derive(Serialize)]
pub struct JsonOutput<'a> {
    pub query: &'a str,
    pub results: Vec<JsonResult>,
}

/// One result in JSON format
#[derive(Serialize)]
pub struct JsonResult {
    pub rank: usize,
    /// RRF score from Stage 1
    pub fused_score: f64,
    #[serde(flatten)]
    pub record: DisplayRecord,
}

/// Formats search results as JSON.
pub fn format_json(query: &str, hits: &[SearchHit]) -> String {
    let output = JsonOutput {
        query,
        results: hits
            .iter()
            .enumerate()
            .map(|(i, hit)| JsonResult {
                rank: i + 1,
                fused_score: hit.fused_score,
                record: DisplayRecord::from(hit),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

/// Formats search results for the terminal.
///
/// `highlighter` decides how query terms are marked in the snippet; pass
/// [`Highlighter::ansi`] for color output.
pub fn format_human(
    query: &str,
    hits: &[SearchHit],
    highlighter: &Highlighter,
    snippet_size: usize,
) -> String {
    if hits.is_empty() {
        return format!("No results found for \"{}\"", query);
    }

    let mut output = String::new();
    output.push_str(&format!(
        "Found {} result{} for \"{}\":\n\n",
        hits.len(),
        if hits.len() == 1 { "" } else { "s" },
        query
    ));

    for (i, hit) in hits.iter().enumerate() {
        let record = DisplayRecord::from(hit);
        output.push_str(&format!("#{} score={:.4}\n", i + 1, record.score));
        output.push_str(&format!("   {}\n", record.page_title));
        if !record.section.is_empty() {
            output.push_str(&format!("   Section: {}\n", record.section));
        }
        output.push_str(&format!("   {}\n", record.section_url));

        let mut snippet = highlighter.highlight(&record.chunk_text, snippet_size);
        if record.chunk_text.chars().count() > snippet_size {
            snippet.push_str("...");
        }
        output.push_str(&format!("   {}\n\n", snippet));
    }

    output.trim_end().to_string()
}

/// Summarizes a finished ingestion run.
pub fn format_report(report: &IngestReport) -> String {
    let mut output = format!(
        "Indexed {} chunk{} into {} (alias {}) in {:.1}s\n",
        report.chunks_indexed,
        if report.chunks_indexed == 1 { "" } else { "s" },
        report.generation,
        report.alias,
        report.elapsed_ms as f64 / 1000.0
    );
    if let Some(previous) = &report.previous_generation {
        output.push_str(&format!("Replaced generation {}\n", previous));
    }
    if !report.dropped_generations.is_empty() {
        output.push_str(&format!(
            "Dropped old generation(s): {}\n",
            report.dropped_generations.join(", ")
        ));
    }
    if report.skipped_ineligible > 0 {
        output.push_str(&format!(
            "Skipped {} ineligible block(s)\n",
            report.skipped_ineligible
        ));
    }
    if !report.failed_documents.is_empty() {
        output.push_str(&format!(
            "{} document(s) failed:\n",
            report.failed_documents.len()
        ));
        for err in &report.failed_documents {
            output.push_str(&format!("   {}\n", err));
        }
    }
    output.trim_end().to_string()
}
