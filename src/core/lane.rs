//! Retrieval lane identifiers.

use serde::{Deserialize, Serialize};

/// One of the two parallel retrieval pipelines.
///
/// The fast lane favours latency (local embeddings, MMR diversification);
/// the accurate lane favours quality (higher-dimensional remote embeddings,
/// cross-encoder reranking). Ingest profiles are named "speed" and
/// "accuracy"; the lanes they feed are "fast" and "accurate". Both spellings
/// are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// Low-latency lane: local embeddings, MMR diversification.
    Fast,
    /// High-quality lane: remote embeddings, cross-encoder reranking.
    Accurate,
}

impl Lane {
    /// Lane name as used in query-path payloads and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Accurate => "accurate",
        }
    }

    /// Profile name as used by the ingest pipeline and the on-disk layout
    /// (`<index-root>/speed/`, `<index-root>/accuracy/`).
    #[must_use]
    pub const fn profile_name(self) -> &'static str {
        match self {
            Self::Fast => "speed",
            Self::Accurate => "accuracy",
        }
    }

    /// The other lane.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Fast => Self::Accurate,
            Self::Accurate => Self::Fast,
        }
    }

    /// Parses a lane or profile name. Accepts both spellings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fast" | "speed" => Some(Self::Fast),
            "accurate" | "accuracy" => Some(Self::Accurate),
            _ => None,
        }
    }

    /// Both lanes, fast first.
    #[must_use]
    pub const fn both() -> [Self; 2] {
        [Self::Fast, Self::Accurate]
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
