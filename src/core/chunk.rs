//! Chunk representation: the unit of indexing and retrieval.
//!
//! A chunk is a token-bounded fragment of one protocol section. Its
//! identity (`chunk_id`) and content hash are deterministic functions of
//! the source document, so re-ingesting the same input reproduces the
//! same chunks.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A chunk of protocol text with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk content.
    pub text: String,

    /// Chunk metadata (identity, provenance, token count).
    pub metadata: ChunkMetadata,
}

/// Metadata associated with a chunk.
///
/// `chunk_id` has the form `"{protocol_id}::s{section_idx}::c{chunk_idx}"`
/// and is unique within a lane. `hash` is the SHA-256 of the exact chunk
/// text; callers may detect duplicates by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Globally unique identifier within a lane.
    pub chunk_id: String,

    /// Owning protocol identifier.
    pub protocol_id: String,

    /// Protocol title.
    pub title: String,

    /// Name of the section this chunk came from.
    pub section_name: String,

    /// Section position within the document (monotone).
    pub section_idx: usize,

    /// Chunk position within the section (monotone, starts at 0).
    pub chunk_idx: usize,

    /// Token count of the chunk text.
    pub n_tokens: usize,

    /// Absolute path of the source file.
    pub source_path: String,

    /// Principle slugs tagging the owning protocol.
    #[serde(default)]
    pub stones: Vec<String>,

    /// ISO-8601 creation timestamp.
    pub created_at: String,

    /// SHA-256 of the chunk text (hex).
    pub hash: String,

    /// Ingest profile that produced this chunk ("speed" | "accuracy").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl Chunk {
    /// Creates a new chunk.
    #[must_use]
    pub const fn new(text: String, metadata: ChunkMetadata) -> Self {
        Self { text, metadata }
    }

    /// Returns a preview of the chunk content, truncated to at most
    /// `max_len` bytes on a character boundary.
    #[must_use]
    pub fn preview(&self, max_len: usize) -> &str {
        if self.text.len() <= max_len {
            &self.text
        } else {
            let mut end = max_len;
            while end > 0 && !self.text.is_char_boundary(end) {
                end -= 1;
            }
            &self.text[..end]
        }
    }

    /// Checks the `hash == SHA-256(text)` invariant.
    #[must_use]
    pub fn hash_matches(&self) -> bool {
        self.metadata.hash == text_hash(&self.text)
    }
}

impl ChunkMetadata {
    /// Formats the canonical chunk identifier.
    #[must_use]
    pub fn format_id(protocol_id: &str, section_idx: usize, chunk_idx: usize) -> String {
        format!("{protocol_id}::s{section_idx}::c{chunk_idx}")
    }
}

/// SHA-256 of a text, as lowercase hex.
#[must_use]
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
