//! Core domain types shared across the crate.
//!
//! Defines the retrieval lane, the chunk (the unit of indexing and
//! retrieval) with its metadata, and the result types returned by the
//! ingest pipeline and the query path.

pub mod chunk;
pub mod lane;
pub mod results;

pub use chunk::{Chunk, ChunkMetadata, text_hash};
pub use lane::Lane;
pub use results::{FusionInfo, ProcessingResult, SearchResult};
