//! Hash-based fallback embedder.
//!
//! Deterministic pseudo-embeddings for environments without a model:
//! lexically similar texts land near each other, but there is no real
//! semantics. Any dimensionality is supported, so the fallback can stand
//! in for either lane's backend.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rayon::prelude::*;

use crate::embedding::Embedder;
use crate::error::Result;

/// Deterministic lexical embedder.
///
/// Combines word-level hashing (vocabulary signal) with character
/// trigram hashing (fuzzy-match signal) and normalises to unit length.
pub struct HashEmbedder {
    dimension: usize,
    name: String,
}

impl HashEmbedder {
    /// Creates a fallback embedder producing `dimension`-length vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            name: format!("hash-{dimension}"),
        }
    }

    fn hash64(s: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn project(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let normalized: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();

        for word in normalized.split_whitespace() {
            let h = Self::hash64(word);
            let slot = (h as usize) % self.dimension;
            let sign = if h & (1 << 40) == 0 { 1.0 } else { -1.0 };
            let weight = 1.0 + ((h >> 24) & 0x7F) as f32 / 127.0;
            vector[slot] += sign * weight;
        }

        let chars: Vec<char> = normalized.chars().collect();
        for window in chars.windows(3) {
            if window.iter().all(|c| c.is_whitespace()) {
                continue;
            }
            let trigram: String = window.iter().collect();
            let h = Self::hash64(&trigram);
            let slot = (h as usize) % self.dimension;
            let sign = if h & (1 << 41) == 0 { 0.5 } else { -0.5 };
            vector[slot] += sign;
        }

        crate::embedding::l2_normalize(&mut vector);
        vector
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.project(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.par_iter().map(|t| self.project(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{LOCAL_DIMENSIONS, cosine_similarity};

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::new(LOCAL_DIMENSIONS);
        assert_eq!(
            embedder.embed("hello world").unwrap(),
            embedder.embed("hello world").unwrap()
        );
    }

    #[test]
    fn test_dimension_and_name() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(embedder.dimension(), 64);
        assert_eq!(embedder.name(), "hash-64");
        assert_eq!(embedder.embed("x").unwrap().len(), 64);
    }

    #[test]
    fn test_unit_norm() {
        let embedder = HashEmbedder::new(LOCAL_DIMENSIONS);
        let v = embedder.embed("the pace of trust").unwrap();
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_lexical_overlap_scores_higher() {
        let embedder = HashEmbedder::new(LOCAL_DIMENSIONS);
        let base = embedder.embed("the quick brown fox").unwrap();
        let near = embedder.embed("the quick brown dog").unwrap();
        let far = embedder.embed("entirely unrelated content").unwrap();
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_empty_text_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed("").unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_batch_matches_single() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder.embed_batch(&["one", "two"]).unwrap();
        assert_eq!(batch[0], embedder.embed("one").unwrap());
        assert_eq!(batch[1], embedder.embed("two").unwrap());
    }
}
