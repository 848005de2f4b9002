//! Local semantic embedder backed by fastembed.
//!
//! Serves the fast lane with all-MiniLM-L6-v2 (384 dimensions). The model
//! is loaded lazily on first use behind a process-wide lock, so
//! constructing the embedder stays cheap.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, OnceLock};

use crate::embedding::{Embedder, LOCAL_DIMENSIONS};
use crate::error::{BackendError, Result};

static EMBEDDING_MODEL: OnceLock<Mutex<fastembed::TextEmbedding>> = OnceLock::new();

/// Local sentence encoder for the fast lane.
pub struct LocalEmbedder {
    model_id: String,
}

impl LocalEmbedder {
    /// Creates a local embedder. The identifier is recorded for catalog
    /// cache keys; the underlying model is always all-MiniLM-L6-v2.
    #[must_use]
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
        }
    }

    fn model() -> Result<&'static Mutex<fastembed::TextEmbedding>> {
        if let Some(model) = EMBEDDING_MODEL.get() {
            return Ok(model);
        }

        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false);

        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            BackendError::ModelInit {
                model: "all-MiniLM-L6-v2".to_string(),
                reason: e.to_string(),
            }
        })?;

        // Another thread may have won the race; use whichever landed.
        let _ = EMBEDDING_MODEL.set(Mutex::new(model));
        EMBEDDING_MODEL.get().ok_or_else(|| {
            BackendError::ModelInit {
                model: "all-MiniLM-L6-v2".to_string(),
                reason: "initialization race".to_string(),
            }
            .into()
        })
    }

    fn run_model(texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let model = Self::model()?;
        let mut model = model
            .lock()
            .map_err(|e| BackendError::Embed(format!("model lock poisoned: {e}")))?;

        // The ONNX runtime can panic on malformed input; contain it.
        let outcome = catch_unwind(AssertUnwindSafe(|| model.embed(texts.to_vec(), None)));

        match outcome {
            Ok(Ok(embeddings)) => Ok(embeddings),
            Ok(Err(e)) => Err(BackendError::Embed(e.to_string()).into()),
            Err(panic_info) => {
                let message = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(BackendError::Embed(format!("ONNX runtime panic: {message}")).into())
            }
        }
    }
}

impl Embedder for LocalEmbedder {
    fn name(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        LOCAL_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(BackendError::Embed("cannot embed empty text".to_string()).into());
        }
        let mut embeddings = Self::run_model(&[text])?;
        embeddings
            .pop()
            .ok_or_else(|| BackendError::Embed("no embedding returned".to_string()).into())
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.is_empty()) {
            return Err(BackendError::Embed("cannot embed empty text".to_string()).into());
        }
        Self::run_model(texts)
    }
}
