//! # duolane
//!
//! Dual-lane retrieval engine for structured protocol documents.
//!
//! duolane ingests semi-structured protocol JSON, fractures it into
//! token-bounded, section-aware chunks, embeds the chunks through two
//! parallel pipelines (a fast local model and an accurate remote model),
//! and serves queries through a protocol router, lane-specific retrieval
//! with reranking, and query-time rank fusion.
//!
//! ## Features
//!
//! - **Chunking**: section-aware, token-bounded splitting with stable
//!   chunk identity
//! - **Dual lanes**: per-lane vector indices with MMR (fast) or
//!   cross-encoder reranking (accurate)
//! - **Routing**: a lightweight classifier narrowing queries to 1-3
//!   candidate protocols
//! - **Fusion**: Reciprocal Rank Fusion or weighted blending of the two
//!   lanes
//! - **Guardrails**: grounding scoring with deterministic refusals, and
//!   per-turn JSONL observability

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod catalog;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod core;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod guard;
pub mod index;
pub mod obs;
pub mod pipeline;
pub mod protocol;
pub mod router;
pub mod search;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{Chunk, ChunkMetadata, FusionInfo, Lane, ProcessingResult, SearchResult};

// Re-export configuration
pub use config::Config;

// Re-export the chunker
pub use chunking::{ChunkerConfig, SectionChunker, TokenCounter};

// Re-export the protocol model
pub use protocol::{Protocol, derive_protocol_id, to_snake_slug};

// Re-export the index
pub use index::{IndexPaths, SearchFilters, VectorIndex};

// Re-export embedding types
pub use embedding::{Embedder, HashEmbedder, cosine_similarity, create_embedder};

// Re-export the ingest pipeline
pub use pipeline::{ProcessingPipeline, ProfileConfig, ProfileOverrides, process, process_both};

// Re-export router types
pub use router::{ParsedQuery, RouteDecision, Router};

// Re-export the engine
pub use engine::{AnswerOptions, Engine, Fusion, RagResponse, load_protocols};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
