//! Result types for the ingest pipeline and the query path.

use serde::{Deserialize, Serialize};

use crate::core::ChunkMetadata;

/// A single ranked retrieval result.
///
/// In fused output, `score` is the fusion score and `fusion_info` records
/// per-lane ranks and scores. Items pulled back in during router-scope
/// top-up carry `source = "topup"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Similarity, rerank or fusion score (higher is better).
    pub score: f32,

    /// Truncated chunk text for display.
    pub text_preview: String,

    /// Metadata of the underlying chunk.
    pub metadata: ChunkMetadata,

    /// Per-lane rank/score breakdown, present on fused results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion_info: Option<FusionInfo>,

    /// Provenance marker ("topup" for items restored past the router scope).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Per-lane contribution breakdown attached to fused results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionInfo {
    /// 1-indexed rank in the speed lane, if the chunk appeared there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_rank: Option<usize>,

    /// 1-indexed rank in the accuracy lane, if the chunk appeared there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_rank: Option<usize>,

    /// Summed reciprocal-rank score (RRF mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f32>,

    /// Raw speed-lane score (blend mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_score: Option<f32>,

    /// Raw accuracy-lane score (blend mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_score: Option<f32>,

    /// Combined weighted score (blend mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted_score: Option<f32>,
}

/// Outcome of processing one protocol file through an ingest lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Absolute path of the processed file.
    pub file_path: String,

    /// Resolved protocol identifier.
    pub protocol_id: String,

    /// Whether the file passed validation and parsing.
    pub valid: bool,

    /// Number of chunks created and indexed.
    #[serde(default)]
    pub chunks_created: usize,

    /// Path of the emitted per-chunk JSONL file, when chunk saving is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_file: Option<String>,

    /// Joined validation/processing errors for invalid files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProcessingResult {
    /// A failed result for `file_path` with the given error message.
    #[must_use]
    pub fn failure(file_path: &str, protocol_id: &str, error_message: String) -> Self {
        Self {
            file_path: file_path.to_string(),
            protocol_id: protocol_id.to_string(),
            valid: false,
            chunks_created: 0,
            chunks_file: None,
            error_message: Some(error_message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chunk::text_hash;

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            chunk_id: "p::s0::c0".to_string(),
            protocol_id: "p".to_string(),
            title: "P".to_string(),
            section_name: "Title".to_string(),
            section_idx: 0,
            chunk_idx: 0,
            n_tokens: 2,
            source_path: "/tmp/p.json".to_string(),
            stones: vec![],
            created_at: "2025-01-01T00:00:00Z".to_string(),
            hash: text_hash("Title: P"),
            profile: Some("speed".to_string()),
        }
    }

    #[test]
    fn test_search_result_serde_omits_empty_fusion() {
        let result = SearchResult {
            score: 0.5,
            text_preview: "Title: P".to_string(),
            metadata: meta(),
            fusion_info: None,
            source: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("fusion_info"));
        assert!(!json.contains("\"source\""));
    }

    #[test]
    fn test_fusion_info_round_trip() {
        let info = FusionInfo {
            speed_rank: Some(1),
            accuracy_rank: None,
            rrf_score: Some(1.0 / 61.0),
            ..FusionInfo::default()
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: FusionInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_processing_result_failure() {
        let result = ProcessingResult::failure("/tmp/x.json", "x", "bad schema".to_string());
        assert!(!result.valid);
        assert_eq!(result.chunks_created, 0);
        assert_eq!(result.error_message.as_deref(), Some("bad schema"));
    }
}
