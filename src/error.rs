//! Error types for duolane operations.
//!
//! This module provides the error hierarchy (via `thiserror`) for all
//! operations: chunking, embedding backends, the vector index, routing,
//! validation, and configuration.

use thiserror::Error;

/// Result type alias for duolane operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for duolane operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Chunking-related errors (text segmentation).
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// Vector index errors (persistence, dimensions).
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Embedding/reranker backend errors.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Router errors (catalog, scoring).
    #[error("router error: {0}")]
    Router(#[from] RouterError),

    /// Document failed structural validation.
    #[error("validation failed: {}", errors.join("; "))]
    Validation {
        /// Individual validation error messages.
        errors: Vec<String>,
    },

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Chunking-specific errors for text segmentation.
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// Invalid chunker configuration.
    #[error("invalid chunker configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Overlap budget meets or exceeds the chunk token cap.
    #[error("overlap {overlap} must be less than max tokens {max_tokens}")]
    OverlapTooLarge {
        /// Overlap token budget.
        overlap: usize,
        /// Maximum tokens per chunk.
        max_tokens: usize,
    },

    /// Document parse error.
    #[error("failed to parse protocol: {0}")]
    Parse(String),
}

/// Vector index errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Query embedding dimension does not match the index dimension.
    ///
    /// Signals that the caller is mixing embedding backends; the index
    /// must be recreated with the same backend that produced the query.
    #[error("query dimension {query} does not match index dimension {index}")]
    DimensionMismatch {
        /// Query embedding dimension.
        query: usize,
        /// Index dimension.
        index: usize,
    },

    /// On-disk index failed to load (missing sidecar, wrong magic,
    /// inconsistent sizes). The caller discards and recreates.
    #[error("corrupt index at {path}: {reason}")]
    Corrupt {
        /// Path to the offending artefact.
        path: String,
        /// Why the load failed.
        reason: String,
    },

    /// Index persistence failure.
    #[error("failed to persist index: {0}")]
    Persist(String),
}

/// Embedding and reranker backend errors.
#[derive(Error, Debug)]
pub enum BackendError {
    /// No credential configured for a remote backend.
    #[error("missing credential for {backend}: set {env_var}")]
    MissingCredential {
        /// Backend name.
        backend: String,
        /// Environment variable that must be set.
        env_var: String,
    },

    /// Request failed after exhausting retries.
    #[error("{backend} failed after {attempts} attempts: {reason}")]
    Exhausted {
        /// Backend name.
        backend: String,
        /// Number of attempts made.
        attempts: usize,
        /// Final failure reason.
        reason: String,
    },

    /// Model initialization failure.
    #[error("failed to initialize model {model}: {reason}")]
    ModelInit {
        /// Model identifier.
        model: String,
        /// Why initialization failed.
        reason: String,
    },

    /// Embedding failure for a specific input.
    #[error("embedding failed: {0}")]
    Embed(String),
}

/// Router errors.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Catalog not built or embedder missing; callers fall back to
    /// TF-IDF scoring and an unscoped ("all") retrieval.
    #[error("router unavailable: {reason}")]
    Unavailable {
        /// Why the router cannot score.
        reason: String,
    },

    /// Catalog cache read/write failure.
    #[error("catalog cache error: {0}")]
    Cache(String),
}

// From impls for standard library and serde errors.

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(format!("serialization error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_joins_messages() {
        let err = Error::Validation {
            errors: vec!["missing Title".to_string(), "missing Themes".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "validation failed: missing Title; missing Themes"
        );
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = Error::Index(IndexError::DimensionMismatch {
            query: 384,
            index: 3072,
        });
        assert!(err.to_string().contains("384"));
        assert!(err.to_string().contains("3072"));
    }

    #[test]
    fn test_backend_exhausted_display() {
        let err = BackendError::Exhausted {
            backend: "remote-embed".to_string(),
            attempts: 3,
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_missing_credential_display() {
        let err = BackendError::MissingCredential {
            backend: "openai".to_string(),
            env_var: "OPENAI_API_KEY".to_string(),
        };
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_chunking_overlap_too_large() {
        let err = ChunkingError::OverlapTooLarge {
            overlap: 700,
            max_tokens: 600,
        };
        assert_eq!(
            err.to_string(),
            "overlap 700 must be less than max tokens 600"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_chunking() {
        let err: Error = ChunkingError::Parse("bad json".to_string()).into();
        assert!(matches!(err, Error::Chunking(_)));
    }

    #[test]
    fn test_router_unavailable_display() {
        let err = RouterError::Unavailable {
            reason: "catalog not built".to_string(),
        };
        assert!(err.to_string().contains("catalog not built"));
    }

    #[test]
    fn test_index_corrupt_display() {
        let err = IndexError::Corrupt {
            path: "/tmp/index.bin".to_string(),
            reason: "bad magic".to_string(),
        };
        assert!(err.to_string().contains("bad magic"));
    }
}
