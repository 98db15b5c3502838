//! Retrieval metrics over ranked section URLs.
//!
//! Relevance is binary: a result is relevant when its `section_url` is in the
//! expected set. An empty expected set scores 0.0 on every metric.

/// Computes Recall@k as a hit indicator.
///
/// # Formula
///
/// ```text
/// Recall@k = 1.0 if any result in the top k is expected, else 0.0
/// ```
pub fn recall_at_k<S: AsRef<str>>(results: &[S], expected: &[String], k: usize) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let hit = results
        .iter()
        .take(k)
        .any(|url| expected.iter().any(|e| e == url.as_ref()));
    if hit {
        1.0
    } else {
        0.0
    }
}

/// Computes Reciprocal Rank over all returned results.
///
/// # Formula
///
/// ```text
/// RR = 1 / rank_of_first_expected_result
/// ```
///
/// Returns 0.0 if no expected result is present.
pub fn reciprocal_rank<S: AsRef<str>>(results: &[S], expected: &[String]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    results
        .iter()
        .position(|url| expected.iter().any(|e| e == url.as_ref()))
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

/// Arithmetic mean. 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Percentile with linear interpolation between closest ranks.
///
/// # Formula
///
/// ```text
/// r = p / 100 * (n - 1)
/// P = v[floor(r)] + (v[ceil(r)] - v[floor(r)]) * (r - floor(r))
/// ```
///
/// `p` is clamped to `[0, 100]`. Returns 0.0 for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}
