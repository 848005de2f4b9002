//! Cross-encoder reranking for the accurate lane.
//!
//! Scores (query, chunk text) pairs in batches of 32. The real
//! cross-encoder is the fastembed reranker; a deterministic token-overlap
//! scorer stands in when the feature (or model) is unavailable.

use crate::error::Result;

#[cfg(feature = "fastembed-embeddings")]
use crate::error::BackendError;

/// Cross-encoder scoring batch size.
pub const RERANK_BATCH: usize = 32;

/// Scores query/text pairs; higher is more relevant.
pub trait Reranker: Send + Sync {
    /// Model identifier.
    fn name(&self) -> &str;

    /// Scores each text against the query, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying model fails.
    fn score_pairs(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>>;
}

/// Creates the reranker for a resolved model identifier; `None` disables
/// reranking for the lane.
#[must_use]
pub fn create_reranker(model_id: Option<&str>) -> Option<Box<dyn Reranker>> {
    let model_id = model_id?;

    // An explicit overlap model id requests the deterministic scorer
    // (offline runs, tests).
    if model_id.starts_with("overlap") {
        return Some(Box::new(OverlapReranker::new(model_id)));
    }

    #[cfg(feature = "fastembed-embeddings")]
    {
        Some(Box::new(CrossEncoderReranker::new(model_id)))
    }
    #[cfg(not(feature = "fastembed-embeddings"))]
    {
        tracing::warn!(
            model = model_id,
            "fastembed-embeddings feature disabled, using token-overlap reranker"
        );
        Some(Box::new(OverlapReranker::new(model_id)))
    }
}

/// Deterministic token-overlap reranker (Jaccard over word sets).
pub struct OverlapReranker {
    name: String,
}

impl OverlapReranker {
    /// Creates the overlap reranker, recording the requested model id.
    #[must_use]
    pub fn new(model_id: &str) -> Self {
        Self {
            name: format!("overlap:{model_id}"),
        }
    }
}

impl Reranker for OverlapReranker {
    fn name(&self) -> &str {
        &self.name
    }

    fn score_pairs(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>> {
        let query_words: std::collections::HashSet<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(ToString::to_string)
            .collect();

        Ok(texts
            .iter()
            .map(|text| {
                let text_words: std::collections::HashSet<String> = text
                    .to_lowercase()
                    .split_whitespace()
                    .map(ToString::to_string)
                    .collect();
                let intersection = query_words.intersection(&text_words).count();
                let union = query_words.union(&text_words).count();
                if union == 0 {
                    0.0
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    {
                        intersection as f32 / union as f32
                    }
                }
            })
            .collect())
    }
}

#[cfg(feature = "fastembed-embeddings")]
mod cross_encoder {
    use std::sync::{Mutex, OnceLock};

    use super::{BackendError, RERANK_BATCH, Reranker, Result};

    static RERANK_MODEL: OnceLock<Mutex<fastembed::TextRerank>> = OnceLock::new();

    /// Cross-encoder reranker backed by the fastembed reranking model.
    pub struct CrossEncoderReranker {
        model_id: String,
    }

    impl CrossEncoderReranker {
        /// Creates the reranker; the model loads lazily on first score.
        #[must_use]
        pub fn new(model_id: &str) -> Self {
            Self {
                model_id: model_id.to_string(),
            }
        }

        fn model() -> Result<&'static Mutex<fastembed::TextRerank>> {
            if let Some(model) = RERANK_MODEL.get() {
                return Ok(model);
            }

            let options =
                fastembed::RerankInitOptions::new(fastembed::RerankerModel::BGERerankerBase)
                    .with_show_download_progress(false);
            let model = fastembed::TextRerank::try_new(options).map_err(|e| {
                BackendError::ModelInit {
                    model: "bge-reranker-base".to_string(),
                    reason: e.to_string(),
                }
            })?;

            let _ = RERANK_MODEL.set(Mutex::new(model));
            RERANK_MODEL.get().ok_or_else(|| {
                BackendError::ModelInit {
                    model: "bge-reranker-base".to_string(),
                    reason: "initialization race".to_string(),
                }
                .into()
            })
        }
    }

    impl Reranker for CrossEncoderReranker {
        fn name(&self) -> &str {
            &self.model_id
        }

        fn score_pairs(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let model = Self::model()?;
            let mut model = model
                .lock()
                .map_err(|e| BackendError::Embed(format!("reranker lock poisoned: {e}")))?;

            let results = model
                .rerank(query, texts.to_vec(), false, Some(RERANK_BATCH))
                .map_err(|e| BackendError::Embed(format!("rerank failed: {e}")))?;

            let mut scores = vec![0.0f32; texts.len()];
            for result in results {
                if let Some(slot) = scores.get_mut(result.index) {
                    *slot = result.score;
                }
            }
            Ok(scores)
        }
    }
}

#[cfg(feature = "fastembed-embeddings")]
pub use cross_encoder::CrossEncoderReranker;
