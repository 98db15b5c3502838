//! Late-interaction (MaxSim) scoring.
//!
//! # Formula
//!
//! ```text
//! MaxSim(q, d) = Σ_{i ∈ q} max_{j ∈ d} cos(q_i, d_j)
//! ```
//!
//! Each query token is matched against its best document token, so documents
//! containing locally matching fragments score well even when their pooled
//! vectors diverge from the query.

use std::cmp::Ordering;

/// Cosine similarity. Zero when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// MaxSim score of a document token matrix against a query token matrix.
///
/// An empty document matrix scores 0.
pub fn maxsim(query: &[Vec<f32>], document: &[Vec<f32>]) -> f32 {
    if document.is_empty() {
        return 0.0;
    }
    query
        .iter()
        .map(|q| {
            document
                .iter()
                .map(|d| cosine_similarity(q, d))
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .sum()
}

/// Rescores candidates with MaxSim and keeps the best `top_k`.
///
/// Sorted by score descending, ties by ascending id.
pub fn rerank<'a, T, I>(query: &[Vec<f32>], candidates: I, top_k: usize) -> Vec<(T, f32)>
where
    T: Copy + Ord,
    I: IntoIterator<Item = (T, &'a [Vec<f32>])>,
{
    let mut scored: Vec<(T, f32)> = candidates
        .into_iter()
        .map(|(id, tokens)| (id, maxsim(query, tokens)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(top_k);
    scored
}
