//! Remote embedding backend for the accurate lane.
//!
//! Calls an OpenAI-style embeddings API (text-embedding-3-large, 3072
//! dimensions) through a blocking facade over an internal runtime. Failed
//! batches are retried with exponential backoff (factor 2, starting at
//! `retry_delay`); a missing credential fails construction immediately.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;

use crate::embedding::Embedder;
use crate::error::{BackendError, Result};

const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Maximum inputs per embeddings request.
const REQUEST_BATCH: usize = 256;

/// Remote embeddings client with retry and backoff.
pub struct RemoteEmbedder {
    model: String,
    dimension: usize,
    max_retries: usize,
    retry_delay: Duration,
    client: Client<OpenAIConfig>,
    runtime: tokio::runtime::Runtime,
}

impl RemoteEmbedder {
    /// Creates a remote embedder for `model`.
    ///
    /// # Errors
    ///
    /// Fails fast when `OPENAI_API_KEY` is not configured, and if the
    /// internal runtime cannot be built.
    pub fn new(model: &str) -> Result<Self> {
        Self::with_retries(model, 3, Duration::from_secs(1))
    }

    /// Creates a remote embedder with explicit retry settings.
    pub fn with_retries(model: &str, max_retries: usize, retry_delay: Duration) -> Result<Self> {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| BackendError::MissingCredential {
                backend: format!("remote-embed ({model})"),
                env_var: API_KEY_VAR.to_string(),
            })?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| BackendError::ModelInit {
                model: model.to_string(),
                reason: format!("runtime: {e}"),
            })?;

        let dimension = if model.contains("3-large") { 3072 } else { 1536 };

        Ok(Self {
            model: model.to_string(),
            dimension,
            max_retries: max_retries.max(1),
            retry_delay,
            client: Client::with_config(OpenAIConfig::new().with_api_key(api_key)),
            runtime,
        })
    }

    /// One embeddings request with retry + exponential backoff.
    fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut delay = self.retry_delay;
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(texts.to_vec())
                .build()
                .map_err(|e| BackendError::Embed(e.to_string()))?;

            match self.runtime.block_on(self.client.embeddings().create(request)) {
                Ok(response) => {
                    let mut vectors = vec![Vec::new(); texts.len()];
                    for item in response.data {
                        let slot = item.index as usize;
                        if slot < vectors.len() {
                            vectors[slot] = item.embedding;
                        }
                    }
                    if vectors.iter().any(Vec::is_empty) && !texts.is_empty() {
                        return Err(BackendError::Embed(
                            "embeddings response missing inputs".to_string(),
                        )
                        .into());
                    }
                    return Ok(vectors);
                }
                Err(err) => {
                    last_error = err.to_string();
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "embedding request failed, backing off"
                    );
                    if attempt + 1 < self.max_retries {
                        std::thread::sleep(delay);
                        delay *= 2;
                    }
                }
            }
        }

        Err(BackendError::Exhausted {
            backend: format!("remote-embed ({})", self.model),
            attempts: self.max_retries,
            reason: last_error,
        }
        .into())
    }
}

impl Embedder for RemoteEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| BackendError::Embed("no embedding returned".to_string()).into())
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let owned: Vec<String> = texts.iter().map(ToString::to_string).collect();
        let mut all = Vec::with_capacity(owned.len());
        for batch in owned.chunks(REQUEST_BATCH) {
            all.extend(self.request(batch)?);
        }
        Ok(all)
    }
}
