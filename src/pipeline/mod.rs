//! Dual-lane ingest pipeline.
//!
//! Per lane: optional validation, deterministic ID derivation, parse,
//! chunk with lane-specific knobs, embed with the lane's backend, add to
//! the lane's index. Files are processed on a bounded worker pool; chunks
//! from one file land contiguously in the index. The two lanes are
//! independent: a failure in one never corrupts or blocks the other.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::chunking::{ChunkerConfig, SectionChunker};
use crate::config::Config;
use crate::core::{Chunk, Lane, ProcessingResult, SearchResult};
use crate::embedding::create_embedder;
use crate::error::Result;
use crate::index::{IndexPaths, IndexStats, SearchFilters, VectorIndex};
use crate::protocol::{Protocol, derive_protocol_id, normalize_protocol_value, validate_protocol_value};

/// Default ingest worker pool size.
pub const DEFAULT_WORKERS: usize = 8;

/// Resolved per-lane ingest profile.
///
/// The two named profiles:
///
/// | profile  | validation | max_tokens | overlap | backend | save_chunks | duplicate_check |
/// |----------|-----------|-----------:|--------:|---------|-------------|-----------------|
/// | speed    | off       | 1000       | 100     | local   | off         | off             |
/// | accuracy | on        |  600       |  60     | remote  | on          | on              |
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    /// The lane this profile feeds.
    pub lane: Lane,
    /// Whether to validate documents before parsing.
    pub validation: bool,
    /// Chunk token cap.
    pub max_tokens: usize,
    /// Overlap token budget.
    pub overlap_tokens: usize,
    /// Embedding model identifier; `None` selects the hash fallback.
    pub backend: Option<String>,
    /// Whether to emit per-chunk JSONL files.
    pub save_chunks: bool,
    /// Whether to skip chunks whose hash is already indexed.
    pub duplicate_check: bool,
    /// Presentation toggle: single-line theme outcome fields.
    pub flatten_fields: bool,
    /// Presentation toggle: leave bodies as authored.
    pub minimal_normalization: bool,
    /// Sentence-aware splitting (vs word windows).
    pub sentence_aware: bool,
    /// Prefix chunks with a section-path line.
    pub add_breadcrumbs: bool,
    /// Persist a corrected `Protocol ID` back to the source file.
    pub persist_corrected_id: bool,
    /// Worker pool size for multi-file ingest.
    pub workers: usize,
}

impl ProfileConfig {
    /// The speed profile: fast local embeddings, larger chunks, no
    /// validation or bookkeeping.
    #[must_use]
    pub fn speed(config: &Config) -> Self {
        Self {
            lane: Lane::Fast,
            validation: false,
            max_tokens: 1000,
            overlap_tokens: 100,
            backend: config.fast.embed.clone(),
            save_chunks: false,
            duplicate_check: false,
            flatten_fields: true,
            minimal_normalization: true,
            sentence_aware: false,
            add_breadcrumbs: false,
            persist_corrected_id: false,
            workers: config.ingest_workers,
        }
    }

    /// The accuracy profile: remote embeddings, tighter chunks, full
    /// validation and bookkeeping.
    #[must_use]
    pub fn accuracy(config: &Config) -> Self {
        Self {
            lane: Lane::Accurate,
            validation: true,
            max_tokens: 600,
            overlap_tokens: 60,
            backend: config.accurate.embed.clone(),
            save_chunks: true,
            duplicate_check: true,
            flatten_fields: false,
            minimal_normalization: false,
            sentence_aware: true,
            add_breadcrumbs: true,
            persist_corrected_id: false,
            workers: config.ingest_workers,
        }
    }

    /// Resolves a profile by lane and applies field overrides.
    #[must_use]
    pub fn resolve(config: &Config, lane: Lane, overrides: Option<&ProfileOverrides>) -> Self {
        let mut profile = match lane {
            Lane::Fast => Self::speed(config),
            Lane::Accurate => Self::accuracy(config),
        };
        if let Some(overrides) = overrides {
            overrides.apply(&mut profile);
        }
        profile
    }
}

/// Optional overrides for any profile field (the caller-facing
/// "sidebar" contract).
#[derive(Debug, Clone, Default)]
pub struct ProfileOverrides {
    /// Override validation.
    pub validation: Option<bool>,
    /// Override the chunk token cap.
    pub max_tokens: Option<usize>,
    /// Override the overlap budget.
    pub overlap_tokens: Option<usize>,
    /// Override the embedding backend (`Some(None)` forces the hash
    /// fallback).
    pub backend: Option<Option<String>>,
    /// Override chunk-file emission.
    pub save_chunks: Option<bool>,
    /// Override duplicate checking.
    pub duplicate_check: Option<bool>,
    /// Override sentence-aware splitting.
    pub sentence_aware: Option<bool>,
    /// Override breadcrumb prefixes.
    pub add_breadcrumbs: Option<bool>,
    /// Override corrected-ID persistence.
    pub persist_corrected_id: Option<bool>,
    /// Override the worker pool size.
    pub workers: Option<usize>,
}

impl ProfileOverrides {
    fn apply(&self, profile: &mut ProfileConfig) {
        if let Some(v) = self.validation {
            profile.validation = v;
        }
        if let Some(v) = self.max_tokens {
            profile.max_tokens = v;
        }
        if let Some(v) = self.overlap_tokens {
            profile.overlap_tokens = v;
        }
        if let Some(v) = &self.backend {
            profile.backend = v.clone();
        }
        if let Some(v) = self.save_chunks {
            profile.save_chunks = v;
        }
        if let Some(v) = self.duplicate_check {
            profile.duplicate_check = v;
        }
        if let Some(v) = self.sentence_aware {
            profile.sentence_aware = v;
        }
        if let Some(v) = self.add_breadcrumbs {
            profile.add_breadcrumbs = v;
        }
        if let Some(v) = self.persist_corrected_id {
            profile.persist_corrected_id = v;
        }
        if let Some(v) = self.workers {
            profile.workers = v;
        }
    }
}

/// One lane's ingest pipeline: chunker + embedder + index.
pub struct ProcessingPipeline {
    profile: ProfileConfig,
    chunker: SectionChunker,
    index: Mutex<VectorIndex>,
}

impl ProcessingPipeline {
    /// Creates the pipeline for a resolved profile, opening (or
    /// creating) the lane index at `paths`.
    pub fn new(profile: ProfileConfig, paths: IndexPaths) -> Result<Self> {
        let embedder = create_embedder(profile.backend.as_deref(), profile.lane);
        let index = VectorIndex::open_at(paths, embedder)?;
        Self::with_index(profile, index)
    }

    /// Creates the pipeline over an already-open index.
    pub fn with_index(profile: ProfileConfig, index: VectorIndex) -> Result<Self> {
        let chunker = SectionChunker::new(ChunkerConfig {
            max_tokens: profile.max_tokens,
            overlap_tokens: profile.overlap_tokens,
            sentence_aware: profile.sentence_aware,
            add_breadcrumbs: profile.add_breadcrumbs,
            flatten_fields: profile.flatten_fields,
            minimal_normalization: profile.minimal_normalization,
        })?;

        Ok(Self {
            profile,
            chunker,
            index: Mutex::new(index),
        })
    }

    /// The resolved profile.
    #[must_use]
    pub const fn profile(&self) -> &ProfileConfig {
        &self.profile
    }

    /// Processes files on a bounded worker pool. Per-file failures are
    /// reported in the results; they never abort the batch.
    #[must_use]
    pub fn process_files(
        &self,
        paths: &[PathBuf],
        output_dir: &Path,
        schema_path: Option<&Path>,
    ) -> Vec<ProcessingResult> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.profile.workers.max(1))
            .build();

        match pool {
            Ok(pool) => pool.install(|| {
                paths
                    .par_iter()
                    .map(|path| self.process_file(path, output_dir, schema_path))
                    .collect()
            }),
            Err(err) => {
                tracing::warn!(%err, "worker pool unavailable, processing serially");
                paths
                    .iter()
                    .map(|path| self.process_file(path, output_dir, schema_path))
                    .collect()
            }
        }
    }

    /// Processes one protocol file end to end.
    #[must_use]
    pub fn process_file(
        &self,
        path: &Path,
        output_dir: &Path,
        schema_path: Option<&Path>,
    ) -> ProcessingResult {
        let abs_path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let file_path = abs_path.display().to_string();

        let raw = match std::fs::read_to_string(&abs_path) {
            Ok(raw) => raw,
            Err(err) => {
                return ProcessingResult::failure(&file_path, "unknown", err.to_string());
            }
        };
        let mut value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                return ProcessingResult::failure(&file_path, "unknown", format!("Invalid JSON: {err}"));
            }
        };

        // Resolve the protocol id before anything else so even failures
        // report a stable identity.
        let explicit = value.get("Protocol ID").and_then(|v| v.as_str()).map(ToString::to_string);
        let (protocol_id, changed) = derive_protocol_id(&abs_path, explicit.as_deref());
        if changed {
            value["Protocol ID"] = serde_json::Value::String(protocol_id.clone());
            if self.profile.persist_corrected_id {
                if let Err(err) = persist_document(&abs_path, &value) {
                    tracing::warn!(%err, path = %file_path, "failed to persist corrected protocol id");
                }
            }
        }

        if self.profile.validation {
            let (is_valid, errors) = validate_protocol_value(&value, schema_path);
            if !is_valid {
                return ProcessingResult::failure(&file_path, &protocol_id, errors.join("; "));
            }
        }

        let normalized = normalize_protocol_value(value);
        let protocol: Protocol = match serde_json::from_value(normalized) {
            Ok(protocol) => protocol,
            Err(err) => {
                return ProcessingResult::failure(
                    &file_path,
                    &protocol_id,
                    format!("Error parsing protocol: {err}"),
                );
            }
        };

        let mut chunks = self.chunker.chunk_protocol(
            &protocol,
            &abs_path,
            Some(&protocol_id),
            Some(self.profile.lane.profile_name()),
        );

        if self.profile.duplicate_check {
            let index = match self.index.lock() {
                Ok(index) => index,
                Err(poisoned) => poisoned.into_inner(),
            };
            chunks.retain(|c| !index.contains_hash(&c.metadata.hash));
        }

        let chunks_file = if self.profile.save_chunks && !chunks.is_empty() {
            match self.write_chunks_file(&protocol_id, &chunks, output_dir) {
                Ok(path) => Some(path),
                Err(err) => {
                    return ProcessingResult::failure(&file_path, &protocol_id, err.to_string());
                }
            }
        } else {
            None
        };

        // One add per file keeps the file's chunks contiguous in the
        // index.
        {
            let mut index = match self.index.lock() {
                Ok(index) => index,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(err) = index.add(&chunks) {
                return ProcessingResult::failure(&file_path, &protocol_id, err.to_string());
            }
        }

        ProcessingResult {
            file_path,
            protocol_id,
            valid: true,
            chunks_created: chunks.len(),
            chunks_file: chunks_file.map(|p| p.display().to_string()),
            error_message: None,
        }
    }

    fn write_chunks_file(
        &self,
        protocol_id: &str,
        chunks: &[Chunk],
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let lane_dir = output_dir.join(self.profile.lane.profile_name());
        std::fs::create_dir_all(&lane_dir)?;
        let path = lane_dir.join(format!("{protocol_id}.chunks.jsonl"));

        let mut data = Vec::new();
        for chunk in chunks {
            serde_json::to_writer(&mut data, chunk)?;
            data.push(b'\n');
        }
        std::fs::write(&path, data)?;
        Ok(path)
    }

    /// Searches the lane index.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<SearchResult>> {
        let index = self
            .index
            .lock()
            .map_err(|e| crate::error::Error::Io(format!("index lock poisoned: {e}")))?;
        index.search(query, k, filters)
    }

    /// Persists the lane index.
    pub fn save_index(&self) -> Result<()> {
        let index = self
            .index
            .lock()
            .map_err(|e| crate::error::Error::Io(format!("index lock poisoned: {e}")))?;
        index.save()
    }

    /// Clears the lane index.
    pub fn clear_index(&self) -> Result<()> {
        let mut index = self
            .index
            .lock()
            .map_err(|e| crate::error::Error::Io(format!("index lock poisoned: {e}")))?;
        index.clear();
        Ok(())
    }

    /// Lane index statistics.
    pub fn stats(&self) -> Result<IndexStats> {
        let index = self
            .index
            .lock()
            .map_err(|e| crate::error::Error::Io(format!("index lock poisoned: {e}")))?;
        Ok(index.stats())
    }

    /// Consumes the pipeline, returning the lane index.
    pub fn into_index(self) -> Result<VectorIndex> {
        self.index
            .into_inner()
            .map_err(|e| crate::error::Error::Io(format!("index lock poisoned: {e}")))
    }
}

/// The ingest entry point: resolves the profile, processes the files,
/// and persists the lane index.
pub fn process(
    config: &Config,
    paths: &[PathBuf],
    output_dir: &Path,
    schema_path: Option<&Path>,
    lane: Lane,
    overrides: Option<&ProfileOverrides>,
) -> Result<Vec<ProcessingResult>> {
    let profile = ProfileConfig::resolve(config, lane, overrides);
    let pipeline = ProcessingPipeline::new(profile, config.index_paths(lane))?;
    let results = pipeline.process_files(paths, output_dir, schema_path);
    pipeline.save_index()?;
    Ok(results)
}

/// Ingest results for both lanes.
#[derive(Debug, Default)]
pub struct DualLaneReport {
    /// Speed-profile results.
    pub speed: Vec<ProcessingResult>,
    /// Accuracy-profile results.
    pub accuracy: Vec<ProcessingResult>,
}

/// Runs both lanes over the same files. The lanes are isolated: a
/// pipeline-level failure in one is reported as per-file failures there
/// and does not stop the other.
#[must_use]
pub fn process_both(
    config: &Config,
    paths: &[PathBuf],
    output_dir: &Path,
    schema_path: Option<&Path>,
) -> DualLaneReport {
    let mut report = DualLaneReport::default();

    for lane in Lane::both() {
        let results = match process(config, paths, output_dir, schema_path, lane, None) {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(%err, lane = %lane, "lane ingest failed");
                paths
                    .iter()
                    .map(|p| {
                        ProcessingResult::failure(&p.display().to_string(), "unknown", err.to_string())
                    })
                    .collect()
            }
        };
        match lane {
            Lane::Fast => report.speed = results,
            Lane::Accurate => report.accuracy = results,
        }
    }

    report
}

fn persist_document(path: &Path, value: &serde_json::Value) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, data)?;
    Ok(())
}
