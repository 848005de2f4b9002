//! Per-lane vector index.
//!
//! An exact inner-product index over L2-normalised vectors (cosine
//! similarity), persisted as three artefacts in the lane directory:
//!
//! - `index.bin` - the vector rows (magic, version, dimension, count,
//!   little-endian f32 data)
//! - `docstore.json` - the ordered chunks, parallel to the vector order
//! - `metadata.jsonl` - a denormalised tabular dump for inspection
//!   (advisory, not a source of truth)
//!
//! All artefacts are written via write-to-temp + rename. A load that
//! finds inconsistent artefacts logs, discards them, and starts from an
//! empty index at the configured dimension. Vector rows stay resident in
//! memory so diversification can reuse candidate embeddings.

use std::collections::HashSet;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{Chunk, ChunkMetadata, SearchResult};
use crate::embedding::{Embedder, l2_normalize};
use crate::error::{Error, IndexError, Result};

/// Magic bytes of the vector artefact.
const INDEX_MAGIC: [u8; 4] = *b"DLIX";

/// Current vector artefact version.
const INDEX_VERSION: u32 = 1;

/// Preview length for search results, in bytes.
const PREVIEW_LEN: usize = 240;

/// Locations of the index artefacts.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    /// Vector rows.
    pub index: PathBuf,
    /// Ordered chunk sidecar.
    pub docstore: PathBuf,
    /// Advisory metadata dump.
    pub dump: PathBuf,
    /// Advisory stats record.
    pub stats: PathBuf,
}

impl IndexPaths {
    /// Conventional artefact paths inside a lane directory.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            index: dir.join("index.bin"),
            docstore: dir.join("docstore.json"),
            dump: dir.join("metadata.jsonl"),
            stats: dir.join("stats.json"),
        }
    }
}

/// Post-retrieval metadata filters.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Keep only chunks of this protocol.
    pub protocol_id: Option<String>,
    /// Keep only chunks of this section.
    pub section_name: Option<String>,
    /// Keep chunks whose stones intersect this set.
    pub stones: Option<Vec<String>>,
}

impl SearchFilters {
    /// Whether any filter is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.protocol_id.is_none() && self.section_name.is_none() && self.stones.is_none()
    }

    /// Whether `metadata` passes all set filters.
    #[must_use]
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(pid) = &self.protocol_id {
            if &metadata.protocol_id != pid {
                return false;
            }
        }
        if let Some(section) = &self.section_name {
            if &metadata.section_name != section {
                return false;
            }
        }
        if let Some(stones) = &self.stones {
            if !stones.iter().any(|s| metadata.stones.contains(s)) {
                return false;
            }
        }
        true
    }
}

/// Advisory stats record written next to the index.
#[derive(Debug, Serialize, Deserialize)]
struct IndexStatsRecord {
    dim: usize,
    count: usize,
    model_name: String,
}

/// Index statistics.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    /// Number of indexed chunks.
    pub total_chunks: usize,
    /// Embedding dimensionality.
    pub embedding_dimension: usize,
    /// Embedding backend name.
    pub embedding_backend: String,
    /// Vector artefact path.
    pub index_path: String,
}

/// Exact inner-product index over L2-normalised vectors, with its chunk
/// sidecar. The index exclusively owns its vectors and chunks; `add`
/// appends to both atomically.
pub struct VectorIndex {
    paths: IndexPaths,
    embedder: Box<dyn Embedder>,
    dimension: usize,
    /// Row-major vector data, `dimension` floats per row.
    vectors: Vec<f32>,
    /// Ordered chunks, parallel to the vector rows.
    chunks: Vec<Chunk>,
    /// Content hashes of indexed chunks, for duplicate detection.
    hashes: HashSet<String>,
}

impl VectorIndex {
    /// Opens (or creates) the index in `dir` with the given embedder.
    ///
    /// Existing artefacts are loaded when both the vector file and the
    /// docstore are present; corrupt artefacts are discarded and replaced
    /// with an empty index.
    pub fn open(dir: &Path, embedder: Box<dyn Embedder>) -> Result<Self> {
        Self::open_at(IndexPaths::in_dir(dir), embedder)
    }

    /// Opens (or creates) the index at explicit artefact paths.
    pub fn open_at(paths: IndexPaths, embedder: Box<dyn Embedder>) -> Result<Self> {
        let dimension = embedder.dimension();
        let mut index = Self {
            paths,
            embedder,
            dimension,
            vectors: Vec::new(),
            chunks: Vec::new(),
            hashes: HashSet::new(),
        };

        match index.try_load() {
            Ok(loaded) => {
                if loaded {
                    tracing::info!(
                        count = index.chunks.len(),
                        dim = index.dimension,
                        "loaded existing index"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(%err, "discarding corrupt index, starting empty");
                index.vectors.clear();
                index.chunks.clear();
                index.hashes.clear();
            }
        }

        Ok(index)
    }

    /// Number of indexed chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embedding dimensionality.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Name of the embedding backend.
    #[must_use]
    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// The embedding backend itself.
    #[must_use]
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Whether a chunk with this content hash is already indexed.
    #[must_use]
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// The chunk at a row index.
    #[must_use]
    pub fn chunk_at(&self, idx: usize) -> Option<&Chunk> {
        self.chunks.get(idx)
    }

    /// The normalised vector at a row index.
    #[must_use]
    pub fn vector_at(&self, idx: usize) -> Option<&[f32]> {
        let start = idx.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    /// Embeds and L2-normalises a query with this index's backend.
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut v = self.embedder.embed(query)?;
        l2_normalize(&mut v);
        Ok(v)
    }

    /// Embeds, normalises, and appends chunks.
    ///
    /// The append is atomic at chunk-list granularity: the vectors and
    /// the docstore either both grow by `chunks.len()` or neither does.
    pub fn add(&mut self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;

        // Stage the rows before touching index state.
        let mut staged = Vec::with_capacity(chunks.len() * self.dimension);
        for mut embedding in embeddings {
            if embedding.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    query: embedding.len(),
                    index: self.dimension,
                }
                .into());
            }
            l2_normalize(&mut embedding);
            staged.extend_from_slice(&embedding);
        }

        self.vectors.extend_from_slice(&staged);
        for chunk in chunks {
            self.hashes.insert(chunk.metadata.hash.clone());
            self.chunks.push(chunk.clone());
        }

        tracing::debug!(added = chunks.len(), total = self.chunks.len(), "indexed chunks");
        Ok(chunks.len())
    }

    /// Top-k inner-product search over a pre-normalised query vector.
    ///
    /// Results are `(row index, score)` sorted by score descending.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                query: query.len(),
                index: self.dimension,
            }
            .into());
        }
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = (0..self.chunks.len())
            .map(|i| {
                let row = &self.vectors[i * self.dimension..(i + 1) * self.dimension];
                let dot: f32 = row.iter().zip(query.iter()).map(|(a, b)| a * b).sum();
                (i, dot)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k.min(self.chunks.len()));
        Ok(scored)
    }

    /// Embeds the query and returns the top-k results, with filters
    /// applied post-retrieval.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<SearchResult>> {
        if self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embed_query(query)?;
        let hits = self.search_vector(&query_vector, k)?;

        let results = hits
            .into_iter()
            .filter_map(|(idx, score)| {
                let chunk = self.chunks.get(idx)?;
                if let Some(filters) = filters {
                    if !filters.matches(&chunk.metadata) {
                        return None;
                    }
                }
                Some(SearchResult {
                    score,
                    text_preview: chunk.preview(PREVIEW_LEN).to_string(),
                    metadata: chunk.metadata.clone(),
                    fusion_info: None,
                    source: None,
                })
            })
            .collect();

        Ok(results)
    }

    /// Persists all artefacts via write-to-temp + rename.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.index.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(parent) = self.paths.docstore.parent() {
            fs::create_dir_all(parent)?;
        }

        self.write_vectors()?;

        let docstore = serde_json::to_vec(&self.chunks)?;
        write_atomic(&self.paths.docstore, &docstore)?;

        let mut dump = Vec::new();
        for chunk in &self.chunks {
            serde_json::to_writer(&mut dump, &chunk.metadata)?;
            dump.push(b'\n');
        }
        write_atomic(&self.paths.dump, &dump)?;

        let stats = serde_json::to_vec_pretty(&IndexStatsRecord {
            dim: self.dimension,
            count: self.chunks.len(),
            model_name: self.embedder.name().to_string(),
        })?;
        write_atomic(&self.paths.stats, &stats)?;

        tracing::info!(
            count = self.chunks.len(),
            path = %self.paths.index.display(),
            "saved index"
        );
        Ok(())
    }

    /// Replaces the contents with an empty index of the configured
    /// dimension.
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.chunks.clear();
        self.hashes.clear();
    }

    /// Index statistics.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_chunks: self.chunks.len(),
            embedding_dimension: self.dimension,
            embedding_backend: self.embedder.name().to_string(),
            index_path: self.paths.index.display().to_string(),
        }
    }

    /// Loads artefacts when both required files exist. Returns whether
    /// anything was loaded; errors signal corruption.
    fn try_load(&mut self) -> Result<bool> {
        if !self.paths.index.exists() || !self.paths.docstore.exists() {
            return Ok(false);
        }

        let raw = fs::read(&self.paths.index)?;
        let (dim, count, data) = parse_vector_file(&raw, &self.paths.index)?;

        if dim != self.dimension {
            return Err(corrupt(
                &self.paths.index,
                format!("dimension {dim} does not match configured {}", self.dimension),
            ));
        }

        let docstore_raw = fs::read(&self.paths.docstore)?;
        let chunks: Vec<Chunk> = serde_json::from_slice(&docstore_raw)
            .map_err(|e| corrupt(&self.paths.docstore, format!("unreadable docstore: {e}")))?;

        if chunks.len() != count {
            return Err(corrupt(
                &self.paths.index,
                format!("vector count {count} does not match docstore {}", chunks.len()),
            ));
        }

        self.vectors = data;
        self.hashes = chunks.iter().map(|c| c.metadata.hash.clone()).collect();
        self.chunks = chunks;
        Ok(true)
    }

    fn write_vectors(&self) -> Result<()> {
        let mut buffer =
            Vec::with_capacity(16 + self.vectors.len() * std::mem::size_of::<f32>());
        buffer.extend_from_slice(&INDEX_MAGIC);
        buffer.extend_from_slice(&INDEX_VERSION.to_le_bytes());
        buffer.extend_from_slice(&u32::try_from(self.dimension).unwrap_or(u32::MAX).to_le_bytes());
        buffer.extend_from_slice(&u32::try_from(self.chunks.len()).unwrap_or(u32::MAX).to_le_bytes());
        for value in &self.vectors {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        write_atomic(&self.paths.index, &buffer)
    }
}

fn corrupt(path: &Path, reason: String) -> Error {
    IndexError::Corrupt {
        path: path.display().to_string(),
        reason,
    }
    .into()
}

fn parse_vector_file(raw: &[u8], path: &Path) -> Result<(usize, usize, Vec<f32>)> {
    if raw.len() < 16 {
        return Err(corrupt(path, "truncated header".to_string()));
    }
    if raw[0..4] != INDEX_MAGIC {
        return Err(corrupt(path, "wrong magic".to_string()));
    }
    let version = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
    if version != INDEX_VERSION {
        return Err(corrupt(path, format!("unsupported version {version}")));
    }
    let dim = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]) as usize;
    let count = u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]) as usize;

    let expected = dim
        .checked_mul(count)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .ok_or_else(|| corrupt(path, "size overflow".to_string()))?;
    let data = &raw[16..];
    if data.len() != expected {
        return Err(corrupt(
            path,
            format!("expected {expected} data bytes, found {}", data.len()),
        ));
    }

    let mut vectors = Vec::with_capacity(dim * count);
    for bytes in data.chunks_exact(4) {
        vectors.push(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
    }
    Ok((dim, count, vectors))
}

/// Writes `data` to `path` through a temporary file and rename, so a
/// crash never leaves a torn artefact.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChunkMetadata, text_hash};
    use crate::embedding::HashEmbedder;

    fn chunk(pid: &str, section_idx: usize, chunk_idx: usize, text: &str) -> Chunk {
        Chunk::new(
            text.to_string(),
            ChunkMetadata {
                chunk_id: ChunkMetadata::format_id(pid, section_idx, chunk_idx),
                protocol_id: pid.to_string(),
                title: pid.to_string(),
                section_name: "Overall Purpose".to_string(),
                section_idx,
                chunk_idx,
                n_tokens: text.len().div_ceil(4),
                source_path: format!("/tmp/{pid}.json"),
                stones: vec!["stewardship".to_string()],
                created_at: "2025-01-01T00:00:00Z".to_string(),
                hash: text_hash(text),
                profile: None,
            },
        )
    }

    fn open_index(dir: &Path) -> VectorIndex {
        VectorIndex::open(dir, Box::new(HashEmbedder::new(64))).unwrap()
    }

    #[test]
    fn test_add_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_index(dir.path());

        index
            .add(&[
                chunk("pace", 0, 0, "slowing down the pace of work"),
                chunk("edges", 0, 0, "keeping the boundary clean and firm"),
            ])
            .unwrap();

        let results = index.search("slow pace of work", 2, None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.protocol_id, "pace");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_search_respects_k_and_sorting() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_index(dir.path());
        let chunks: Vec<Chunk> = (0..10)
            .map(|i| chunk("p", 0, i, &format!("text body number {i}")))
            .collect();
        index.add(&chunks).unwrap();

        let results = index.search("text body number 3", 4, None).unwrap();
        assert!(results.len() <= 4);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        let mut seen = HashSet::new();
        for r in &results {
            assert!(seen.insert(r.metadata.chunk_id.clone()));
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_index(dir.path());
        index.add(&[chunk("p", 0, 0, "text")]).unwrap();

        let err = index.search_vector(&vec![0.0f32; 32], 1).unwrap_err();
        assert!(matches!(
            err,
            Error::Index(IndexError::DimensionMismatch { query: 32, index: 64 })
        ));
    }

    #[test]
    fn test_filters() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_index(dir.path());
        let mut other = chunk("other", 0, 0, "a different protocol entirely");
        other.metadata.stones = vec!["clarity".to_string()];
        index
            .add(&[chunk("pace", 0, 0, "slowing the pace"), other])
            .unwrap();

        let filters = SearchFilters {
            protocol_id: Some("pace".to_string()),
            ..SearchFilters::default()
        };
        let results = index.search("pace", 5, Some(&filters)).unwrap();
        assert!(results.iter().all(|r| r.metadata.protocol_id == "pace"));

        let stone_filters = SearchFilters {
            stones: Some(vec!["clarity".to_string()]),
            ..SearchFilters::default()
        };
        let results = index.search("protocol", 5, Some(&stone_filters)).unwrap();
        assert!(results.iter().all(|r| r.metadata.stones.contains(&"clarity".to_string())));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = vec![
            chunk("p", 0, 0, "first chunk text"),
            chunk("p", 1, 0, "second chunk text"),
            chunk("p", 1, 1, "third chunk text"),
        ];
        {
            let mut index = open_index(dir.path());
            index.add(&chunks[..2]).unwrap();
            index.save().unwrap();
        }
        {
            let mut index = open_index(dir.path());
            assert_eq!(index.len(), 2);
            index.add(&chunks[2..]).unwrap();
            index.save().unwrap();
        }
        let index = open_index(dir.path());
        assert_eq!(index.len(), 3);
        // Metadata order matches insertion order.
        let ids: Vec<&str> = (0..3)
            .map(|i| index.chunk_at(i).unwrap().metadata.chunk_id.as_str())
            .collect();
        assert_eq!(ids, vec!["p::s0::c0", "p::s1::c0", "p::s1::c1"]);
        assert!(index.contains_hash(&text_hash("first chunk text")));
    }

    #[test]
    fn test_corrupt_index_recreated_empty() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut index = open_index(dir.path());
            index.add(&[chunk("p", 0, 0, "text")]).unwrap();
            index.save().unwrap();
        }
        // Truncate the vector artefact mid-file.
        let index_path = dir.path().join("index.bin");
        let raw = fs::read(&index_path).unwrap();
        fs::write(&index_path, &raw[..raw.len() / 2]).unwrap();

        let index = open_index(dir.path());
        assert!(index.is_empty());
    }

    #[test]
    fn test_missing_artefacts_create_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 64);
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_index(dir.path());
        index.add(&[chunk("p", 0, 0, "text")]).unwrap();
        index.clear();
        assert!(index.is_empty());
        assert!(!index.contains_hash(&text_hash("text")));
        assert_eq!(index.dimension(), 64);
    }

    #[test]
    fn test_docstore_parallel_to_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_index(dir.path());
        index
            .add(&[chunk("p", 0, 0, "one"), chunk("p", 0, 1, "two")])
            .unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.vector_at(1).is_some());
        assert!(index.vector_at(2).is_none());
    }

    #[test]
    fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let stats = index.stats();
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.embedding_dimension, 64);
        assert_eq!(stats.embedding_backend, "hash-64");
    }
}
