//! Section-aware, token-bounded chunking.
//!
//! Flattens a protocol into its ordered section sequence and splits each
//! section into token-bounded, overlapping chunks. Chunk identity is a
//! deterministic function of the document: the same input always yields
//! the same `chunk_id`s and hashes.

pub mod tokens;

pub use tokens::TokenCounter;

use std::path::Path;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::core::{Chunk, ChunkMetadata, text_hash};
use crate::error::{ChunkingError, Result};
use crate::protocol::sections::{SectionOptions, section_sequence};
use crate::protocol::{Protocol, to_snake_slug};

/// Default maximum tokens per chunk (accuracy lane).
pub const DEFAULT_MAX_TOKENS: usize = 600;

/// Default overlap token budget (accuracy lane).
pub const DEFAULT_OVERLAP_TOKENS: usize = 60;

/// Chunker configuration knobs.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Hard cap on tokens per chunk. The single documented exception is a
    /// lone sentence longer than the cap, which is emitted whole.
    pub max_tokens: usize,

    /// Soft target for the overlap prefix carried into the next chunk.
    pub overlap_tokens: usize,

    /// Split long sections on sentence boundaries; when off, fall back to
    /// word-window splitting on token budgets.
    pub sentence_aware: bool,

    /// Prefix each chunk with a short section-path line.
    pub add_breadcrumbs: bool,

    /// Single-line theme outcome fields (speed profile presentation).
    pub flatten_fields: bool,

    /// Leave section bodies exactly as authored.
    pub minimal_normalization: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap_tokens: DEFAULT_OVERLAP_TOKENS,
            sentence_aware: true,
            add_breadcrumbs: false,
            flatten_fields: false,
            minimal_normalization: false,
        }
    }
}

/// Chunks protocols into section-aware, token-bounded segments.
///
/// The creation timestamp is captured once at construction, so chunking
/// is a pure function of `(protocol, config)` for the chunker's lifetime
/// and repeated runs produce byte-identical chunk records.
#[derive(Debug)]
pub struct SectionChunker {
    config: ChunkerConfig,
    counter: TokenCounter,
    created_at: String,
}

impl SectionChunker {
    /// Creates a chunker with the given configuration and the default
    /// (BPE-backed) token counter.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_tokens` is zero or `overlap_tokens` is
    /// not strictly smaller than `max_tokens`.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        Self::with_counter(config, TokenCounter::new())
    }

    /// Creates a chunker with an explicit token counter.
    pub fn with_counter(config: ChunkerConfig, counter: TokenCounter) -> Result<Self> {
        if config.max_tokens == 0 {
            return Err(ChunkingError::InvalidConfig {
                reason: "max_tokens must be > 0".to_string(),
            }
            .into());
        }
        if config.overlap_tokens >= config.max_tokens {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: config.overlap_tokens,
                max_tokens: config.max_tokens,
            }
            .into());
        }
        Ok(Self {
            config,
            counter,
            created_at: now_rfc3339(),
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunks a protocol into an ordered list of chunks.
    ///
    /// `protocol_id` overrides derivation from the file stem; `profile`
    /// is recorded on each chunk when given.
    #[must_use]
    pub fn chunk_protocol(
        &self,
        protocol: &Protocol,
        source_path: &Path,
        protocol_id: Option<&str>,
        profile: Option<&str>,
    ) -> Vec<Chunk> {
        let pid = protocol_id.map_or_else(
            || {
                to_snake_slug(
                    source_path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default(),
                )
            },
            ToString::to_string,
        );
        let source = std::path::absolute(source_path)
            .unwrap_or_else(|_| source_path.to_path_buf())
            .to_string_lossy()
            .into_owned();
        let stones = protocol.stone_slugs();

        let section_opts = SectionOptions {
            flatten_fields: self.config.flatten_fields,
            minimal_normalization: self.config.minimal_normalization,
        };

        let mut chunks = Vec::new();
        for (section_idx, section) in section_sequence(protocol, section_opts)
            .into_iter()
            .enumerate()
        {
            let breadcrumb = if self.config.add_breadcrumbs {
                Some(format!("{} > {}\n", protocol.title, section.name))
            } else {
                None
            };

            for (chunk_idx, text) in self
                .split_section(&section.body, breadcrumb.as_deref())
                .into_iter()
                .enumerate()
            {
                let n_tokens = self.counter.count(&text);
                let metadata = ChunkMetadata {
                    chunk_id: ChunkMetadata::format_id(&pid, section_idx, chunk_idx),
                    protocol_id: pid.clone(),
                    title: protocol.title.clone(),
                    section_name: section.name.clone(),
                    section_idx,
                    chunk_idx,
                    n_tokens,
                    source_path: source.clone(),
                    stones: stones.clone(),
                    created_at: self.created_at.clone(),
                    hash: text_hash(&text),
                    profile: profile.map(ToString::to_string),
                };
                chunks.push(Chunk::new(text, metadata));
            }
        }

        chunks
    }

    /// Splits one section body into chunk texts.
    fn split_section(&self, body: &str, breadcrumb: Option<&str>) -> Vec<String> {
        // Reserve the breadcrumb's tokens so prefixed chunks stay within
        // the cap.
        let budget = breadcrumb.map_or(self.config.max_tokens, |b| {
            self.config.max_tokens.saturating_sub(self.counter.count(b)).max(1)
        });

        let texts = if self.counter.count(body) <= budget {
            vec![body.to_string()]
        } else if self.config.sentence_aware {
            self.split_sentences_greedy(body, budget)
        } else {
            self.split_word_windows(body, budget)
        };

        match breadcrumb {
            Some(prefix) => texts
                .into_iter()
                .map(|t| format!("{prefix}{t}"))
                .collect(),
            None => texts,
        }
    }

    /// Greedy sentence accumulation with a suffix-sentence overlap prefix.
    fn split_sentences_greedy(&self, body: &str, max_tokens: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in split_into_sentences(body) {
            let mut test = current.clone();
            test.push_str(sentence);
            test.push('\n');

            if self.counter.count(&test) > max_tokens && !current.is_empty() {
                let emitted = current.trim().to_string();
                let overlap = self.overlap_text(&emitted);
                chunks.push(emitted);

                current = overlap;
                current.push_str(sentence);
                current.push('\n');
            } else {
                current = test;
            }
        }

        if !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }

        chunks
    }

    /// The overlap prefix: suffix sentences of the just-emitted chunk
    /// whose cumulative token count fits the overlap budget, in original
    /// order, newline-joined so the prefix is a literal suffix of the
    /// previous chunk.
    fn overlap_text(&self, text: &str) -> String {
        if text.is_empty() || self.config.overlap_tokens == 0 {
            return String::new();
        }

        let sentences = split_into_sentences(text);
        let mut kept: Vec<&str> = Vec::new();
        let mut used = 0usize;

        for sentence in sentences.iter().rev().copied() {
            let cost = self.counter.count(sentence);
            if used + cost > self.config.overlap_tokens {
                break;
            }
            kept.insert(0, sentence);
            used += cost;
        }

        if kept.is_empty() {
            String::new()
        } else {
            let mut prefix = kept.join("\n");
            prefix.push('\n');
            prefix
        }
    }

    /// Word-window fallback for `sentence_aware = false`: greedy word
    /// accumulation against the token budget, with a trailing-word
    /// overlap.
    fn split_word_windows(&self, body: &str, max_tokens: usize) -> Vec<String> {
        let words: Vec<&str> = body.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < words.len() {
            let mut end = start;
            let mut current = String::new();
            while end < words.len() {
                let mut test = current.clone();
                if !test.is_empty() {
                    test.push(' ');
                }
                test.push_str(words[end]);
                if self.counter.count(&test) > max_tokens && !current.is_empty() {
                    break;
                }
                current = test;
                end += 1;
            }

            chunks.push(current);
            if end >= words.len() {
                break;
            }

            // Step back far enough to carry the overlap budget forward.
            let mut overlap_start = end;
            let mut used = 0usize;
            while overlap_start > start {
                let cost = self.counter.count(words[overlap_start - 1]) + 1;
                if used + cost > self.config.overlap_tokens {
                    break;
                }
                used += cost;
                overlap_start -= 1;
            }
            start = if overlap_start == start { end } else { overlap_start };
        }

        chunks
    }
}

/// Splits text into sentences on `.`, `!`, `?` followed by whitespace.
#[must_use]
pub fn split_into_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let after = i + 1;
            if after < bytes.len() && bytes[after].is_ascii_whitespace() {
                let sentence = text[start..after].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = after;
            }
        }
        i += 1;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0)
        .unwrap_or(now)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
