//! Query-time fusion of the two lanes.
//!
//! Combines the ranked outputs of the speed and accuracy lanes by
//! Reciprocal Rank Fusion (`1 / (k_rrf + rank)`, summed per chunk) or a
//! weighted score blend. Results are de-duplicated strictly by
//! `chunk_id`; ties keep first-insertion order (speed lane first).

use std::collections::HashMap;

use crate::core::{FusionInfo, SearchResult};
use crate::search::Hit;

/// Default RRF k parameter.
pub const DEFAULT_K_RRF: u32 = 60;

/// Default weighted-blend weights `(speed, accuracy)`.
pub const DEFAULT_BLEND_WEIGHTS: (f32, f32) = (0.35, 0.65);

struct FusedEntry {
    result: SearchResult,
    fused_score: f32,
}

/// Reciprocal Rank Fusion of the two lane outputs.
///
/// Each result contributes `1 / (k_rrf + rank)` (1-indexed rank) per
/// lane; contributions are summed per `chunk_id`.
#[must_use]
pub fn rrf_fuse(speed: &[Hit], accuracy: &[Hit], k_rrf: u32, top_k: usize) -> Vec<SearchResult> {
    let mut order: Vec<String> = Vec::new();
    let mut entries: HashMap<String, FusedEntry> = HashMap::new();

    let contribution = |rank: usize| {
        #[allow(clippy::cast_precision_loss)]
        let denominator = k_rrf as f32 + rank as f32 + 1.0;
        1.0 / denominator
    };

    for (rank, hit) in speed.iter().enumerate() {
        let chunk_id = hit.chunk.metadata.chunk_id.clone();
        let score = contribution(rank);
        let entry = entries.entry(chunk_id.clone()).or_insert_with(|| {
            order.push(chunk_id);
            FusedEntry {
                result: hit.to_result(),
                fused_score: 0.0,
            }
        });
        entry.fused_score += score;
        let info = entry.result.fusion_info.get_or_insert_with(FusionInfo::default);
        info.speed_rank = Some(rank + 1);
    }

    for (rank, hit) in accuracy.iter().enumerate() {
        let chunk_id = hit.chunk.metadata.chunk_id.clone();
        let score = contribution(rank);
        let entry = entries.entry(chunk_id.clone()).or_insert_with(|| {
            order.push(chunk_id);
            FusedEntry {
                result: hit.to_result(),
                fused_score: 0.0,
            }
        });
        entry.fused_score += score;
        let info = entry.result.fusion_info.get_or_insert_with(FusionInfo::default);
        info.accuracy_rank = Some(rank + 1);
    }

    finalize(order, entries, top_k, |entry| {
        let info = entry.result.fusion_info.get_or_insert_with(FusionInfo::default);
        info.rrf_score = Some(entry.fused_score);
    })
}

/// Weighted blend of the two lane outputs:
/// `w_speed * score_speed + w_accuracy * score_accuracy`, with a missing
/// lane contributing zero.
#[must_use]
pub fn weighted_blend(
    speed: &[Hit],
    accuracy: &[Hit],
    weights: (f32, f32),
    top_k: usize,
) -> Vec<SearchResult> {
    let (w_speed, w_accuracy) = weights;
    let mut order: Vec<String> = Vec::new();
    let mut entries: HashMap<String, FusedEntry> = HashMap::new();

    for hit in speed {
        let chunk_id = hit.chunk.metadata.chunk_id.clone();
        let entry = entries.entry(chunk_id.clone()).or_insert_with(|| {
            order.push(chunk_id);
            FusedEntry {
                result: hit.to_result(),
                fused_score: 0.0,
            }
        });
        entry.fused_score += hit.score * w_speed;
        let info = entry.result.fusion_info.get_or_insert_with(FusionInfo::default);
        info.speed_score = Some(hit.score);
    }

    for hit in accuracy {
        let chunk_id = hit.chunk.metadata.chunk_id.clone();
        let entry = entries.entry(chunk_id.clone()).or_insert_with(|| {
            order.push(chunk_id);
            FusedEntry {
                result: hit.to_result(),
                fused_score: 0.0,
            }
        });
        entry.fused_score += hit.score * w_accuracy;
        let info = entry.result.fusion_info.get_or_insert_with(FusionInfo::default);
        info.accuracy_score = Some(hit.score);
    }

    finalize(order, entries, top_k, |entry| {
        let info = entry.result.fusion_info.get_or_insert_with(FusionInfo::default);
        info.weighted_score = Some(entry.fused_score);
    })
}

fn finalize(
    order: Vec<String>,
    mut entries: HashMap<String, FusedEntry>,
    top_k: usize,
    stamp: impl Fn(&mut FusedEntry),
) -> Vec<SearchResult> {
    let mut fused: Vec<FusedEntry> = order
        .into_iter()
        .filter_map(|chunk_id| entries.remove(&chunk_id))
        .collect();

    // Stable sort: equal scores keep insertion order.
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(top_k);

    fused
        .into_iter()
        .map(|mut entry| {
            stamp(&mut entry);
            entry.result.score = entry.fused_score;
            entry.result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chunk, ChunkMetadata, text_hash};

    fn hit(pid: &str, chunk_idx: usize, score: f32) -> Hit {
        let text = format!("{pid} chunk {chunk_idx}");
        Hit {
            row: chunk_idx,
            score,
            chunk: Chunk::new(
                text.clone(),
                ChunkMetadata {
                    chunk_id: ChunkMetadata::format_id(pid, 0, chunk_idx),
                    protocol_id: pid.to_string(),
                    title: pid.to_string(),
                    section_name: "Overall Purpose".to_string(),
                    section_idx: 0,
                    chunk_idx,
                    n_tokens: 4,
                    source_path: format!("/tmp/{pid}.json"),
                    stones: vec![],
                    created_at: "2025-01-01T00:00:00Z".to_string(),
                    hash: text_hash(&text),
                    profile: None,
                },
            ),
            source: None,
        }
    }

    #[test]
    fn test_rrf_known_scores() {
        // speed: [A, B, C], accuracy: [B, D, A]
        let a = hit("a", 0, 0.9);
        let b = hit("b", 0, 0.8);
        let c = hit("c", 0, 0.7);
        let d = hit("d", 0, 0.6);
        let speed = vec![a.clone(), b.clone(), c];
        let accuracy = vec![b, d, a];

        let fused = rrf_fuse(&speed, &accuracy, 60, 3);
        assert_eq!(fused.len(), 3);

        // B: 1/62 (speed rank 2) + 1/61 (accuracy rank 1)
        assert_eq!(fused[0].metadata.protocol_id, "b");
        let expected_b = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((fused[0].score - expected_b).abs() < 1e-6);

        // A: 1/61 + 1/63
        assert_eq!(fused[1].metadata.protocol_id, "a");
        let expected_a = 1.0 / 61.0 + 1.0 / 63.0;
        assert!((fused[1].score - expected_a).abs() < 1e-6);

        // D (1/62) outranks C (1/63)
        assert_eq!(fused[2].metadata.protocol_id, "d");

        let info = fused[0].fusion_info.as_ref().unwrap();
        assert_eq!(info.speed_rank, Some(2));
        assert_eq!(info.accuracy_rank, Some(1));
        assert!(info.rrf_score.is_some());
    }

    #[test]
    fn test_rrf_deduplicates_by_chunk_id() {
        let a = hit("a", 0, 0.9);
        let fused = rrf_fuse(&[a.clone()], &[a], 60, 10);
        assert_eq!(fused.len(), 1);
        // Present in both lanes at rank 1: 2/61.
        assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_tie_keeps_insertion_order() {
        // Disjoint singletons at the same rank tie exactly; the speed
        // lane entry was inserted first.
        let fused = rrf_fuse(&[hit("s", 0, 0.5)], &[hit("acc", 0, 0.5)], 60, 2);
        assert_eq!(fused[0].metadata.protocol_id, "s");
        assert_eq!(fused[1].metadata.protocol_id, "acc");
    }

    #[test]
    fn test_weighted_blend() {
        let shared_speed = hit("x", 0, 0.8);
        let shared_accuracy = hit("x", 0, 0.6);
        let only_speed = hit("y", 0, 0.9);

        let fused = weighted_blend(
            &[shared_speed, only_speed],
            &[shared_accuracy],
            (0.35, 0.65),
            10,
        );

        let x = fused
            .iter()
            .find(|r| r.metadata.protocol_id == "x")
            .unwrap();
        assert!((x.score - (0.8 * 0.35 + 0.6 * 0.65)).abs() < 1e-6);
        let info = x.fusion_info.as_ref().unwrap();
        assert_eq!(info.speed_score, Some(0.8));
        assert_eq!(info.accuracy_score, Some(0.6));

        // Missing accuracy score contributes zero.
        let y = fused
            .iter()
            .find(|r| r.metadata.protocol_id == "y")
            .unwrap();
        assert!((y.score - 0.9 * 0.35).abs() < 1e-6);
        assert!(y.fusion_info.as_ref().unwrap().accuracy_score.is_none());
    }

    #[test]
    fn test_top_k_truncation() {
        let speed: Vec<Hit> = (0..5).map(|i| hit("p", i, 0.9)).collect();
        let fused = rrf_fuse(&speed, &[], 60, 2);
        assert_eq!(fused.len(), 2);
    }
}
