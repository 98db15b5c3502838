// Reciprocal Rank Fusion (RRF) algorithm

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

pub use crate::config::RRF_K;

/// One fused candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedCandidate<T> {
    pub id: T,
    /// Sum of `1 / (k + rank)` over the lists containing `id`
    pub score: f64,
    /// Best (lowest) 1-based rank across lists
    pub best_rank: usize,
}

/// Combine two ranked id lists using RRF.
///
/// RRF Formula: RRF_score(d) = sum_{r} 1 / (k + rank_r(d))
///
/// Where:
/// - d is a candidate id
/// - r is a ranker (retrieval list)
/// - rank_r(d) is the 1-indexed position of d in ranker r
/// - k is the smoothing constant (typically 60)
///
/// A list lacking a candidate contributes nothing. Only the first occurrence of
/// an id inside a list counts. Output is sorted by score descending, then
/// best rank ascending, then id ascending, so equal inputs always give the
/// same order. Callers truncate to their fused limit.
pub fn reciprocal_rank_fusion<T: Copy + Ord + Hash>(
    results_a: &[T],
    results_b: &[T],
    k: usize,
) -> Vec<FusedCandidate<T>> {
    let mut fused: HashMap<T, FusedCandidate<T>> = HashMap::new();

    for list in [results_a, results_b] {
        let mut seen: HashSet<T> = HashSet::with_capacity(list.len());
        for (index, &id) in list.iter().enumerate() {
            if !seen.insert(id) {
                continue;
            }
            let rank = index + 1;
            let contribution = 1.0 / (k + rank) as f64;
            let entry = fused.entry(id).or_insert(FusedCandidate {
                id,
                score: 0.0,
                best_rank: rank,
            });
            entry.score += contribution;
            entry.best_rank = entry.best_rank.min(rank);
        }
    }

    let mut combined: Vec<FusedCandidate<T>> = fused.into_values().collect();
    combined.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.best_rank.cmp(&b.best_rank))
            .then_with(|| a.id.cmp(&b.id))
    });
    combined
}
