//! Deterministic feature-hashing embedder.
//!
//! Needs no model files or network, so it backs tests, benchmarks and offline
//! runs. Quality is lexical only: texts sharing words land close together.
//!
//! - dense: signed hashing of word unigrams and bigrams, L2-normalized
//! - sparse: `1 + ln(tf)` per hashed word
//! - tokens: one vector per word from signed character trigrams, L2-normalized

use super::traits::EmbeddingProvider;
use super::types::{SparseVector, TokenMatrix};
use crate::config::{DENSE_DIM, TOKEN_DIM};
use crate::error::EmbeddingError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid word regex"));

/// Hashed sparse vocabulary size (2^20).
const SPARSE_VOCAB: u64 = 1 << 20;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dense_dim: usize,
    token_dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DENSE_DIM, TOKEN_DIM)
    }
}

impl HashingEmbedder {
    pub fn new(dense_dim: usize, token_dim: usize) -> Self {
        Self {
            dense_dim: dense_dim.max(1),
            token_dim: token_dim.max(1),
        }
    }

    fn words(text: &str) -> Result<Vec<String>, EmbeddingError> {
        let words: Vec<String> = WORD_RE
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        if words.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        Ok(words)
    }

    fn dense_vector(&self, words: &[String]) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dense_dim];
        for word in words {
            add_signed(&mut vector, fnv1a(word.as_bytes()), 1.0);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            add_signed(&mut vector, fnv1a(bigram.as_bytes()), 0.5);
        }
        l2_normalize(&mut vector);
        vector
    }

    fn token_vector(&self, word: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.token_dim];
        let padded: Vec<char> = format!("#{}#", word).chars().collect();
        for gram in padded.windows(3) {
            let gram: String = gram.iter().collect();
            add_signed(&mut vector, fnv1a(gram.as_bytes()), 1.0);
        }
        add_signed(&mut vector, fnv1a(word.as_bytes()), 1.0);
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn dense_dim(&self) -> usize {
        self.dense_dim
    }

    fn token_dim(&self) -> usize {
        self.token_dim
    }

    async fn embed_dense(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.dense_vector(&Self::words(text)?))
    }

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector, EmbeddingError> {
        let mut counts: HashMap<u32, u32> = HashMap::new();
        for word in Self::words(text)? {
            *counts.entry((fnv1a(word.as_bytes()) % SPARSE_VOCAB) as u32).or_insert(0) += 1;
        }
        Ok(SparseVector::from_pairs(
            counts
                .into_iter()
                .map(|(index, tf)| (index, 1.0 + (tf as f32).ln())),
        ))
    }

    async fn embed_tokens(&self, text: &str) -> Result<TokenMatrix, EmbeddingError> {
        Ok(Self::words(text)?
            .iter()
            .map(|word| self.token_vector(word))
            .collect())
    }
}

/// 64-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn add_signed(vector: &mut [f32], hash: u64, weight: f32) {
    let index = (hash % vector.len() as u64) as usize;
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    vector[index] += sign * weight;
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_dense_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(64, 16);
        let a = embedder.embed_dense("Pattern matching for Python").await.unwrap();
        let b = embedder.embed_dense("Pattern matching for Python").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_dense_similarity_prefers_shared_words() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_dense("walrus operator").await.unwrap();
        let close = embedder.embed_dense("the walrus operator assigns").await.unwrap();
        let far = embedder.embed_dense("packaging metadata fields").await.unwrap();
        assert!(dot(&query, &close) > dot(&query, &far));
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let embedder = HashingEmbedder::default();
        assert!(matches!(
            embedder.embed_dense("  ?! ").await,
            Err(EmbeddingError::EmptyInput)
        ));
        assert!(embedder.embed_tokens("").await.is_err());
        assert!(embedder.embed_sparse("\n").await.is_err());
    }

    #[tokio::test]
    async fn test_sparse_weights_use_log_term_frequency() {
        let embedder = HashingEmbedder::default();
        let sparse = embedder.embed_sparse("async async async").await.unwrap();
        assert_eq!(sparse.len(), 1);
        assert!((sparse.values[0] - (1.0 + 3f32.ln())).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_one_token_vector_per_word() {
        let embedder = HashingEmbedder::new(32, 8);
        let tokens = embedder.embed_tokens("Type hints, generics").await.unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|t| t.len() == 8));
    }

    #[tokio::test]
    async fn test_embed_document_produces_all_three() {
        let embedder = HashingEmbedder::new(32, 8);
        let triple = embedder.embed_document("Exception groups").await.unwrap();
        assert_eq!(triple.dense.len(), 32);
        assert_eq!(triple.sparse.len(), 2);
        assert_eq!(triple.tokens.len(), 2);
    }

    #[test]
    fn test_fnv1a_known_value() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
