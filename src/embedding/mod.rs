//! Embedding backends for the two lanes.
//!
//! Both lanes sit behind the same [`Embedder`] contract: a fast local
//! sentence encoder (fastembed, 384 dimensions) and an accurate remote
//! backend (3072 dimensions), with a deterministic hash-based fallback
//! when neither is available. Backend outputs are not required to be
//! L2-normalised; the index normalises on insert and query.
//!
//! # Feature flags
//!
//! - `fastembed-embeddings`: local all-MiniLM-L6-v2 model
//! - `remote-embeddings`: remote embeddings API for the accurate lane

mod fallback;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;

#[cfg(feature = "remote-embeddings")]
mod remote;

pub use fallback::HashEmbedder;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::LocalEmbedder;

#[cfg(feature = "remote-embeddings")]
pub use remote::RemoteEmbedder;

use crate::core::Lane;
use crate::error::Result;

/// Dimensions of the local all-MiniLM-L6-v2 model.
pub const LOCAL_DIMENSIONS: usize = 384;

/// Dimensions of the remote text-embedding-3-large model.
pub const REMOTE_DIMENSIONS: usize = 3072;

/// Uniform contract over embedding backends.
///
/// Implementations must be thread-safe: ingest embeds from a worker pool.
/// A backend returns vectors of a fixed [`dimension`](Embedder::dimension)
/// for all inputs in a session.
pub trait Embedder: Send + Sync {
    /// Backend name, used for catalog cache keys and logs.
    fn name(&self) -> &str;

    /// Embedding dimensionality.
    fn dimension(&self) -> usize;

    /// Embeds a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch of texts.
    ///
    /// The default implementation embeds sequentially; backends with real
    /// batch endpoints override this.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails for any text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Creates the embedder for a lane from a resolved model identifier.
///
/// `None` and unavailable backends degrade to the deterministic hash
/// embedder at the lane's native dimensionality, with a warning; the
/// remote backend itself fails fast on a missing credential.
#[must_use]
pub fn create_embedder(model_id: Option<&str>, lane: Lane) -> Box<dyn Embedder> {
    let default_dims = match lane {
        Lane::Fast => LOCAL_DIMENSIONS,
        Lane::Accurate => REMOTE_DIMENSIONS,
    };

    let Some(model_id) = model_id else {
        return Box::new(HashEmbedder::new(default_dims));
    };

    if model_id.starts_with("text-embedding") {
        #[cfg(feature = "remote-embeddings")]
        match RemoteEmbedder::new(model_id) {
            Ok(embedder) => return Box::new(embedder),
            Err(err) => {
                tracing::warn!(%err, model = model_id, "remote embedder unavailable, using hash fallback");
            }
        }
        #[cfg(not(feature = "remote-embeddings"))]
        tracing::warn!(model = model_id, "remote-embeddings feature disabled, using hash fallback");

        return Box::new(HashEmbedder::new(default_dims));
    }

    #[cfg(feature = "fastembed-embeddings")]
    {
        Box::new(LocalEmbedder::new(model_id))
    }
    #[cfg(not(feature = "fastembed-embeddings"))]
    {
        tracing::warn!(model = model_id, "fastembed-embeddings feature disabled, using hash fallback");
        Box::new(HashEmbedder::new(LOCAL_DIMENSIONS))
    }
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-magnitude inputs. For
/// unit-norm vectors this equals the dot product.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Scales a vector to unit L2 norm in place. Zero vectors are left as-is.
pub fn l2_normalize(v: &mut [f32]) {
    let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in v.iter_mut() {
            *x /= magnitude;
        }
    }
}
