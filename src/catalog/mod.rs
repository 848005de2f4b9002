//! Router-side protocol catalog.
//!
//! One entry per protocol: identity, normalised stone slugs, tags,
//! fields, bridges, extracted key phrases, and a unit-length centroid
//! embedding. The catalog is disposable (rebuildable from protocols +
//! embedder) and cached on disk keyed by the embedder identity and a
//! content hash; a stale cache is rebuilt.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::embedding::{Embedder, l2_normalize};
use crate::error::{Result, RouterError};
use crate::protocol::Protocol;

/// Cap on key phrases per protocol.
const MAX_KEY_PHRASES: usize = 20;

/// One protocol's router-side profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Protocol identifier.
    pub protocol_id: String,
    /// Full title.
    pub title: String,
    /// Short title.
    pub short_title: String,
    /// Normalised stone slugs.
    pub stones: Vec<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Fields.
    pub fields: Vec<String>,
    /// Bridges.
    pub bridges: Vec<String>,
    /// Extracted key phrases (deduplicated, capped).
    pub key_phrases: Vec<String>,
    /// Unit-length centroid embedding; empty when built without an
    /// embedder.
    #[serde(default)]
    pub centroid: Vec<f32>,
}

/// The protocol catalog for router scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Embedder identity the centroids were built with.
    pub model_name: String,
    /// Entries, in build order.
    pub entries: Vec<CatalogEntry>,
}

/// On-disk cache record.
#[derive(Debug, Serialize, Deserialize)]
struct CachedCatalog {
    model_name: String,
    content_hash: String,
    created_at: String,
    catalog: Vec<CatalogEntry>,
}

impl Catalog {
    /// Builds the catalog from `(protocol_id, protocol)` pairs, embedding
    /// centroids with `embedder`.
    pub fn build(protocols: &[(String, Protocol)], embedder: &dyn Embedder) -> Result<Self> {
        let mut entries = Vec::with_capacity(protocols.len());
        for (pid, protocol) in protocols {
            let mut entry = entry_without_centroid(pid, protocol);
            entry.centroid = centroid_embedding(&entry, embedder)?;
            entries.push(entry);
        }
        Ok(Self {
            model_name: embedder.name().to_string(),
            entries,
        })
    }

    /// Builds the catalog without centroids (TF-IDF-only routing).
    #[must_use]
    pub fn build_lexical(protocols: &[(String, Protocol)]) -> Self {
        Self {
            model_name: "none".to_string(),
            entries: protocols
                .iter()
                .map(|(pid, p)| entry_without_centroid(pid, p))
                .collect(),
        }
    }

    /// Builds the catalog with a disk cache.
    ///
    /// A cache keyed by the same embedder identity and content hash is
    /// loaded without touching the embedder; anything else is rebuilt and
    /// re-cached. Returns `(catalog, came_from_cache)`.
    pub fn build_cached(
        protocols: &[(String, Protocol)],
        embedder: &dyn Embedder,
        cache_path: &Path,
    ) -> Result<(Self, bool)> {
        let hash = content_hash(protocols);

        if let Some(cached) = read_cache(cache_path) {
            if cached.model_name == embedder.name() && cached.content_hash == hash {
                tracing::info!(path = %cache_path.display(), "loaded catalog from cache");
                return Ok((
                    Self {
                        model_name: cached.model_name,
                        entries: cached.catalog,
                    },
                    true,
                ));
            }
            tracing::info!(
                cached_model = %cached.model_name,
                "catalog cache is stale, rebuilding"
            );
        }

        let catalog = Self::build(protocols, embedder)?;
        write_cache(cache_path, &catalog, &hash)?;
        Ok((catalog, false))
    }

    /// Entry lookup by protocol id.
    #[must_use]
    pub fn get(&self, protocol_id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.protocol_id == protocol_id)
    }

    /// Whether entries carry centroid embeddings.
    #[must_use]
    pub fn has_centroids(&self) -> bool {
        self.entries.iter().all(|e| !e.centroid.is_empty()) && !self.entries.is_empty()
    }
}

fn entry_without_centroid(pid: &str, protocol: &Protocol) -> CatalogEntry {
    CatalogEntry {
        protocol_id: pid.to_string(),
        title: protocol.title.clone(),
        short_title: protocol.short_title.clone(),
        stones: protocol.stone_slugs(),
        tags: protocol.tags().to_vec(),
        fields: protocol.fields().to_vec(),
        bridges: protocol.bridges().to_vec(),
        key_phrases: extract_key_phrases(protocol),
        centroid: Vec::new(),
    }
}

/// Extracts router key phrases: theme names, leading words of guiding
/// questions, short "Present pattern" phrases from Expected/Excellent
/// outcomes, and leading words of completion prompts. Deduplicated in
/// first-seen order, capped at twenty.
#[must_use]
pub fn extract_key_phrases(protocol: &Protocol) -> Vec<String> {
    let mut phrases: Vec<String> = Vec::new();
    let mut push = |phrase: String| {
        if !phrase.is_empty() && !phrases.contains(&phrase) {
            phrases.push(phrase);
        }
    };

    for theme in &protocol.themes {
        if !theme.name.is_empty() {
            push(theme.name.clone());
        }
    }

    for theme in &protocol.themes {
        for question in &theme.guiding_questions {
            push(leading_words(question, 5, 3));
        }
    }

    for theme in &protocol.themes {
        for outcome in [&theme.outcomes.expected, &theme.outcomes.excellent] {
            push(leading_words(&outcome.present_pattern, 6, 3));
        }
    }

    for prompt in &protocol.completion_prompts {
        push(leading_words(prompt, 4, 2));
    }

    phrases.truncate(MAX_KEY_PHRASES);
    phrases
}

/// First `max` words of `text`, or empty when fewer than `min` words.
fn leading_words(text: &str, max: usize, min: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().take(max).collect();
    if words.len() >= min {
        words.join(" ")
    } else {
        String::new()
    }
}

/// Mean of the entry's text embeddings, scaled to unit length.
fn centroid_embedding(entry: &CatalogEntry, embedder: &dyn Embedder) -> Result<Vec<f32>> {
    let mut texts: Vec<String> = Vec::new();
    if !entry.title.is_empty() {
        texts.push(entry.title.clone());
    }
    for stone in &entry.stones {
        texts.push(stone.replace('-', " "));
    }
    texts.extend(entry.key_phrases.iter().cloned());
    texts.extend(entry.tags.iter().cloned());
    texts.extend(entry.fields.iter().cloned());
    if texts.is_empty() {
        texts.push(entry.protocol_id.clone());
    }

    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let embeddings = embedder.embed_batch(&refs)?;

    let dim = embedder.dimension();
    let mut centroid = vec![0.0f32; dim];
    #[allow(clippy::cast_precision_loss)]
    let n = embeddings.len() as f32;
    for embedding in &embeddings {
        for (slot, value) in centroid.iter_mut().zip(embedding.iter()) {
            *slot += value / n;
        }
    }
    l2_normalize(&mut centroid);
    Ok(centroid)
}

/// Hash of everything scoring depends on, so cache staleness tracks
/// content as well as model identity.
fn content_hash(protocols: &[(String, Protocol)]) -> String {
    let mut hasher = Sha256::new();
    for (pid, protocol) in protocols {
        hasher.update(pid.as_bytes());
        hasher.update([0]);
        hasher.update(protocol.title.as_bytes());
        hasher.update([0]);
        for stone in protocol.stone_slugs() {
            hasher.update(stone.as_bytes());
            hasher.update([1]);
        }
        for tag in protocol.tags() {
            hasher.update(tag.as_bytes());
            hasher.update([1]);
        }
        for phrase in extract_key_phrases(protocol) {
            hasher.update(phrase.as_bytes());
            hasher.update([1]);
        }
    }
    hex::encode(hasher.finalize())
}

fn read_cache(path: &Path) -> Option<CachedCatalog> {
    let raw = std::fs::read(path).ok()?;
    match serde_json::from_slice(&raw) {
        Ok(cached) => Some(cached),
        Err(err) => {
            tracing::warn!(%err, path = %path.display(), "unreadable catalog cache, rebuilding");
            None
        }
    }
}

fn write_cache(path: &Path, catalog: &Catalog, hash: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| RouterError::Cache(e.to_string()))?;
    }
    let now = OffsetDateTime::now_utc();
    let record = CachedCatalog {
        model_name: catalog.model_name.clone(),
        content_hash: hash.to_string(),
        created_at: now
            .replace_nanosecond(0)
            .unwrap_or(now)
            .format(&Rfc3339)
            .unwrap_or_default(),
        catalog: catalog.entries.clone(),
    };
    let data = serde_json::to_vec(&record).map_err(|e| RouterError::Cache(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &data).map_err(|e| RouterError::Cache(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| RouterError::Cache(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::protocol::testutil::sample_protocol;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embedder wrapper that counts embed calls.
    struct CountingEmbedder {
        inner: HashEmbedder,
        calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                inner: HashEmbedder::new(32),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Embedder for CountingEmbedder {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text)
        }
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed_batch(texts)
        }
    }

    fn protocols() -> Vec<(String, Protocol)> {
        vec![("clean_edges".to_string(), sample_protocol())]
    }

    #[test]
    fn test_key_phrase_extraction() {
        let phrases = extract_key_phrases(&sample_protocol());
        assert!(phrases.contains(&"Naming the Edge".to_string()));
        assert!(phrases.contains(&"Where does this end?".to_string()));
        assert!(phrases.contains(&"expected pattern".to_string()) || !phrases.is_empty());
        assert!(phrases.len() <= MAX_KEY_PHRASES);
        // Deduplicated
        let mut sorted = phrases.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), phrases.len());
    }

    #[test]
    fn test_leading_words_minimum() {
        assert_eq!(leading_words("one two", 5, 3), "");
        assert_eq!(leading_words("one two three four five six", 5, 3), "one two three four five");
    }

    #[test]
    fn test_build_produces_unit_centroids() {
        let embedder = HashEmbedder::new(32);
        let catalog = Catalog::build(&protocols(), &embedder).unwrap();
        assert!(catalog.has_centroids());
        let centroid = &catalog.entries[0].centroid;
        let magnitude: f32 = centroid.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cache_hit_skips_embedder() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("catalog_hash_32.json");

        let first = CountingEmbedder::new();
        let (_, from_cache) =
            Catalog::build_cached(&protocols(), &first, &cache_path).unwrap();
        assert!(!from_cache);
        assert!(first.calls.load(Ordering::SeqCst) > 0);

        let second = CountingEmbedder::new();
        let (catalog, from_cache) =
            Catalog::build_cached(&protocols(), &second, &cache_path).unwrap();
        assert!(from_cache);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
        assert_eq!(catalog.entries.len(), 1);
    }

    #[test]
    fn test_cache_stale_on_model_change() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("catalog.json");

        let (_, _) = Catalog::build_cached(&protocols(), &HashEmbedder::new(32), &cache_path)
            .unwrap();
        // Different model identity: must rebuild.
        let other = HashEmbedder::new(64);
        let (catalog, from_cache) =
            Catalog::build_cached(&protocols(), &other, &cache_path).unwrap();
        assert!(!from_cache);
        assert_eq!(catalog.model_name, "hash-64");
    }

    #[test]
    fn test_cache_stale_on_content_change() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("catalog.json");
        let embedder = HashEmbedder::new(32);

        Catalog::build_cached(&protocols(), &embedder, &cache_path).unwrap();

        let mut changed = protocols();
        changed[0].1.title = "Renamed".to_string();
        let (_, from_cache) = Catalog::build_cached(&changed, &embedder, &cache_path).unwrap();
        assert!(!from_cache);
    }

    #[test]
    fn test_lexical_catalog_has_no_centroids() {
        let catalog = Catalog::build_lexical(&protocols());
        assert!(!catalog.has_centroids());
        assert_eq!(catalog.entries[0].protocol_id, "clean_edges");
    }

    #[test]
    fn test_entry_lookup() {
        let catalog = Catalog::build_lexical(&protocols());
        assert!(catalog.get("clean_edges").is_some());
        assert!(catalog.get("missing").is_none());
    }
}
