//! Maximal Marginal Relevance diversification.
//!
//! Greedy selection balancing relevance against similarity to what has
//! already been picked: `lambda * relevance - (1 - lambda) * max_sim`.
//! Candidate embeddings come from the index's in-memory rows, cached at
//! add time.

use crate::embedding::cosine_similarity;

/// Default relevance/diversity balance.
pub const DEFAULT_MMR_LAMBDA: f32 = 0.4;

/// Selects up to `k` candidates by MMR.
///
/// `candidates` are `(row, relevance)` pairs sorted or unsorted;
/// `vectors[i]` is the embedding of `candidates[i]`. Returns selected
/// pairs in pick order. Selection continues until `k` are chosen or the
/// candidates are exhausted.
#[must_use]
pub fn mmr_select(
    candidates: &[(usize, f32)],
    vectors: &[&[f32]],
    lambda: f32,
    k: usize,
) -> Vec<(usize, f32)> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));

    // Seed with the highest-relevance candidate.
    if let Some(position) = remaining
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            candidates[**a]
                .1
                .partial_cmp(&candidates[**b].1)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(pos, _)| pos)
    {
        selected.push(remaining.remove(position));
    }

    while selected.len() < k && !remaining.is_empty() {
        let mut best_position = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (position, &candidate) in remaining.iter().enumerate() {
            let relevance = candidates[candidate].1;
            let max_sim = selected
                .iter()
                .map(|&chosen| cosine_similarity(vectors[candidate], vectors[chosen]))
                .fold(0.0f32, f32::max);

            let mmr = lambda * relevance - (1.0 - lambda) * max_sim;
            if mmr > best_score {
                best_score = mmr;
                best_position = position;
            }
        }

        selected.push(remaining.remove(best_position));
    }

    selected.into_iter().map(|i| candidates[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_candidates() {
        assert!(mmr_select(&[], &[], 0.4, 5).is_empty());
    }

    #[test]
    fn test_k_zero() {
        let candidates = [(0usize, 0.9f32)];
        let v: &[f32] = &[1.0, 0.0];
        assert!(mmr_select(&candidates, &[v], 0.4, 0).is_empty());
    }

    #[test]
    fn test_seeds_with_highest_relevance() {
        let candidates = [(10usize, 0.2f32), (11, 0.9), (12, 0.5)];
        let a: &[f32] = &[1.0, 0.0];
        let b: &[f32] = &[0.0, 1.0];
        let c: &[f32] = &[0.7, 0.7];
        let picked = mmr_select(&candidates, &[a, b, c], 0.4, 1);
        assert_eq!(picked, vec![(11, 0.9)]);
    }

    #[test]
    fn test_prefers_diverse_over_near_duplicate() {
        // Two near-identical vectors with high relevance and one
        // orthogonal vector with lower relevance: MMR at lambda 0.4
        // picks the diverse one second.
        let candidates = [(0usize, 0.95f32), (1, 0.94), (2, 0.60)];
        let a: &[f32] = &[1.0, 0.0];
        let a2: &[f32] = &[0.999, 0.045];
        let b: &[f32] = &[0.0, 1.0];
        let picked = mmr_select(&candidates, &[a, a2, b], 0.4, 2);
        assert_eq!(picked[0].0, 0);
        assert_eq!(picked[1].0, 2, "expected the orthogonal candidate");
    }

    #[test]
    fn test_exhausts_candidates_below_k() {
        let candidates = [(0usize, 0.9f32), (1, 0.8)];
        let a: &[f32] = &[1.0, 0.0];
        let b: &[f32] = &[0.0, 1.0];
        let picked = mmr_select(&candidates, &[a, b], 0.4, 10);
        assert_eq!(picked.len(), 2);
    }
}
