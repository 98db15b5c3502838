use crate::error::EmbeddingError;
use serde::{Deserialize, Serialize};

/// Ordered per-token vectors of one text.
pub type TokenMatrix = Vec<Vec<f32>>;

/// Sparse term-weight vector, sorted by ascending index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Builds a vector from unordered (index, weight) pairs, summing duplicates.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, f32)>) -> Self {
        let mut pairs: Vec<(u32, f32)> = pairs.into_iter().collect();
        pairs.sort_by_key(|(index, _)| *index);

        let mut vector = SparseVector::default();
        for (index, value) in pairs {
            match vector.indices.last() {
                Some(&last) if last == index => {
                    if let Some(v) = vector.values.last_mut() {
                        *v += value;
                    }
                }
                _ => {
                    vector.indices.push(index);
                    vector.values.push(value);
                }
            }
        }
        vector
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product over shared indices. Both sides must be sorted.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// The three representations of one chunk. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorTriple {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub tokens: TokenMatrix,
}

/// Validates that a vector has the expected dimension.
pub fn validate_dimension(expected: usize, actual: usize) -> Result<(), EmbeddingError> {
    if expected != actual {
        return Err(EmbeddingError::DimensionMismatch { expected, actual });
    }
    Ok(())
}
