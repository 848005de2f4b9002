//! Protocol router.
//!
//! A lightweight classifier that maps a query to 1-3 candidate protocols,
//! used to restrict retrieval scope. Scoring blends centroid similarity,
//! stones overlap, and keyword matching; when no embedder is available it
//! falls back to TF-IDF cosine with its own labelled thresholds. Router
//! failures never abort retrieval - callers degrade to an unscoped
//! ("all") decision.

pub mod tfidf;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogEntry};
use crate::embedding::cosine_similarity;

/// Curated synonym map from query vocabulary to stone slugs.
///
/// Order is fixed so extracted signals are deterministic.
const STONES_SYNONYMS: [(&str, &[&str]); 8] = [
    ("stewardship", &["burnout", "burning", "burden", "weight", "heavy", "carrying", "load"]),
    ("wholeness", &["integrity", "whole", "complete", "aligned"]),
    ("speed", &["rushing", "haste", "urgency", "pace", "rhythm", "fast", "slow"]),
    ("trust", &["trust", "confidence", "reliability", "dependable"]),
    ("presence", &["present", "mindful", "aware", "conscious", "grounded"]),
    ("clarity", &["clarity", "clear", "clearly", "illuminate", "bright", "vision"]),
    ("light", &["light", "brightness", "illumination"]),
    ("form", &["structure", "framework", "system", "process", "method"]),
];

/// Stop words excluded from extracted keywords.
const KEYWORD_STOP_WORDS: [&str; 13] = [
    "what", "when", "where", "why", "how", "this", "that", "with", "from", "they", "have",
    "been", "were",
];

/// A query parsed into routing signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Lower-cased text with non-word characters stripped.
    pub normalized_text: String,
    /// Stone slugs whose synonyms appear in the query.
    pub stones_signals: Vec<String>,
    /// Content keywords (length > 3, stop words removed).
    pub keywords: Vec<String>,
    /// Coarse intents.
    pub intents: Vec<String>,
}

/// One scored protocol candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Protocol identifier.
    pub protocol_id: String,
    /// Protocol title.
    pub title: String,
    /// Blended router score.
    pub score: f32,
}

/// How many candidates the router narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// One confident candidate.
    Single,
    /// Two candidates.
    Double,
    /// Three candidates.
    Triple,
    /// No narrowing; retrieval stays unscoped.
    All,
}

impl Route {
    /// Route name for payloads and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
            Self::Triple => "triple",
            Self::All => "all",
        }
    }
}

/// Router decision for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    /// Selected candidates (empty for `Route::All`).
    pub candidates: Vec<Candidate>,
    /// Top score, in `[0, 1]`.
    pub confidence: f32,
    /// Route kind.
    pub route: Route,
    /// Which scoring mode produced the decision.
    pub scoring: ScoringMode,
}

impl RouteDecision {
    /// The unscoped decision.
    #[must_use]
    pub const fn all(scoring: ScoringMode) -> Self {
        Self {
            candidates: Vec::new(),
            confidence: 0.0,
            route: Route::All,
            scoring,
        }
    }

    /// Whether the decision narrows the candidate set.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.route != Route::All && !self.candidates.is_empty()
    }

    /// Protocol ids of the selected candidates.
    #[must_use]
    pub fn candidate_ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.protocol_id.as_str()).collect()
    }
}

/// Scoring mode labels; the two modes carry different threshold sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// Centroid-embedding scoring.
    Embedding,
    /// TF-IDF lexical fallback.
    Tfidf,
}

/// Blend weights for embedding-mode scoring.
#[derive(Debug, Clone, Copy)]
pub struct RouterWeights {
    /// Centroid cosine weight.
    pub embed: f32,
    /// Stones Jaccard weight.
    pub stones: f32,
    /// Keyword containment weight.
    pub keywords: f32,
}

impl Default for RouterWeights {
    fn default() -> Self {
        Self {
            embed: 0.6,
            stones: 0.2,
            keywords: 0.2,
        }
    }
}

/// Route thresholds: top score at or above `single` routes to one
/// candidate, and so on down to `All`.
#[derive(Debug, Clone, Copy)]
pub struct RouteThresholds {
    /// Single-candidate threshold.
    pub single: f32,
    /// Two-candidate threshold.
    pub double: f32,
    /// Three-candidate threshold.
    pub triple: f32,
}

impl RouteThresholds {
    /// Thresholds for embedding-mode scores.
    pub const EMBEDDING: Self = Self {
        single: 0.45,
        double: 0.30,
        triple: 0.22,
    };

    /// Thresholds for TF-IDF fallback scores.
    pub const TFIDF: Self = Self {
        single: 0.25,
        double: 0.20,
        triple: 0.15,
    };
}

/// Protocol router over a built catalog.
pub struct Router {
    catalog: Catalog,
    weights: RouterWeights,
    embedding_thresholds: RouteThresholds,
    tfidf_thresholds: RouteThresholds,
    /// Per-query decision log directory; `None` disables logging.
    decision_log_dir: Option<PathBuf>,
}

impl Router {
    /// Creates a router over `catalog` with default weights and
    /// thresholds.
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            weights: RouterWeights::default(),
            embedding_thresholds: RouteThresholds::EMBEDDING,
            tfidf_thresholds: RouteThresholds::TFIDF,
            decision_log_dir: None,
        }
    }

    /// Enables per-query JSON decision logs under `dir`.
    #[must_use]
    pub fn with_decision_log(mut self, dir: PathBuf) -> Self {
        self.decision_log_dir = Some(dir);
        self
    }

    /// Overrides the blend weights.
    #[must_use]
    pub const fn with_weights(mut self, weights: RouterWeights) -> Self {
        self.weights = weights;
        self
    }

    /// The catalog the router scores against.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Parses a query into routing signals.
    #[must_use]
    pub fn parse_query(&self, query: &str) -> ParsedQuery {
        let normalized_text: String = query
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let mut stones_signals = Vec::new();
        for (stone, synonyms) in STONES_SYNONYMS {
            if synonyms.iter().any(|s| normalized_text.contains(s)) {
                stones_signals.push(stone.to_string());
            }
        }

        let keywords: Vec<String> = normalized_text
            .split_whitespace()
            .filter(|w| w.len() > 3 && !KEYWORD_STOP_WORDS.contains(w))
            .map(ToString::to_string)
            .collect();

        let mut intents = Vec::new();
        let has_any = |words: &[&str]| words.iter().any(|w| normalized_text.contains(w));
        if has_any(&["help", "support", "guidance", "advice"]) {
            intents.push("support".to_string());
        }
        if has_any(&["how", "what", "when", "where"]) {
            intents.push("information".to_string());
        }
        if has_any(&["problem", "issue", "struggle", "difficult"]) {
            intents.push("problem_solving".to_string());
        }
        if has_any(&["protocol", "process", "method", "approach"]) {
            intents.push("protocol_selection".to_string());
        }

        ParsedQuery {
            normalized_text,
            stones_signals,
            keywords,
            intents,
        }
    }

    /// Routes a parsed query, scoring with the query embedding when one
    /// is available and the catalog carries centroids, falling back to
    /// TF-IDF otherwise.
    #[must_use]
    pub fn route(&self, parsed: &ParsedQuery, query_embedding: Option<&[f32]>) -> RouteDecision {
        if self.catalog.entries.is_empty() {
            tracing::warn!("protocol catalog is empty, routing to all");
            return RouteDecision::all(ScoringMode::Tfidf);
        }

        let decision = match query_embedding {
            Some(embedding) if self.catalog.has_centroids() => {
                let scores = self.score_all_embedding(parsed, embedding);
                Self::decide(scores, self.embedding_thresholds, ScoringMode::Embedding)
            }
            _ => {
                let scores = self.score_all_tfidf(parsed);
                Self::decide(scores, self.tfidf_thresholds, ScoringMode::Tfidf)
            }
        };

        self.log_decision(parsed, &decision);
        decision
    }

    fn score_all_embedding(&self, parsed: &ParsedQuery, embedding: &[f32]) -> Vec<Candidate> {
        self.catalog
            .entries
            .iter()
            .map(|entry| Candidate {
                protocol_id: entry.protocol_id.clone(),
                title: entry.title.clone(),
                score: self.score_embedding(parsed, embedding, entry),
            })
            .collect()
    }

    /// Blended embedding-mode score:
    /// `0.6 * cos + 0.2 * stones Jaccard + 0.2 * keyword containment`.
    fn score_embedding(&self, parsed: &ParsedQuery, embedding: &[f32], entry: &CatalogEntry) -> f32 {
        let embed_sim = cosine_similarity(embedding, &entry.centroid).max(0.0);
        let stones_overlap = jaccard(&parsed.stones_signals, &entry.stones);

        let mut targets: Vec<&str> = Vec::new();
        targets.extend(entry.tags.iter().map(String::as_str));
        targets.extend(entry.key_phrases.iter().map(String::as_str));
        targets.extend(entry.fields.iter().map(String::as_str));
        let keyword_score = keyword_match(&parsed.keywords, &targets);

        let w = self.weights;
        let total = w.embed + w.stones + w.keywords;
        if total <= 0.0 {
            return 0.0;
        }
        (w.embed * embed_sim + w.stones * stones_overlap + w.keywords * keyword_score) / total
    }

    fn score_all_tfidf(&self, parsed: &ParsedQuery) -> Vec<Candidate> {
        let query_tf = tfidf::term_frequencies(&parsed.normalized_text);

        self.catalog
            .entries
            .iter()
            .map(|entry| {
                let profile_text = format!(
                    "{} {} {}",
                    entry.title,
                    entry.key_phrases.join(" "),
                    entry.tags.join(" ")
                );
                let entry_tf = tfidf::term_frequencies(&profile_text);

                let tfidf_sim = tfidf::sparse_cosine(&query_tf, &entry_tf);
                let title_score = keyword_match(&parsed.keywords, &[entry.title.as_str()]);
                let stones_overlap = jaccard(&parsed.stones_signals, &entry.stones);

                let mut targets: Vec<&str> = Vec::new();
                targets.extend(entry.tags.iter().map(String::as_str));
                targets.extend(entry.key_phrases.iter().map(String::as_str));
                let keyword_score = keyword_match(&parsed.keywords, &targets);

                Candidate {
                    protocol_id: entry.protocol_id.clone(),
                    title: entry.title.clone(),
                    score: 0.4 * tfidf_sim
                        + 0.3 * title_score
                        + 0.2 * stones_overlap
                        + 0.1 * keyword_score,
                }
            })
            .collect()
    }

    fn decide(
        mut scores: Vec<Candidate>,
        thresholds: RouteThresholds,
        scoring: ScoringMode,
    ) -> RouteDecision {
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let confidence = scores.first().map_or(0.0, |c| c.score);
        let (route, keep) = if confidence >= thresholds.single {
            (Route::Single, 1)
        } else if confidence >= thresholds.double {
            (Route::Double, 2)
        } else if confidence >= thresholds.triple {
            (Route::Triple, 3)
        } else {
            (Route::All, 0)
        };

        scores.truncate(keep);
        RouteDecision {
            candidates: scores,
            confidence,
            route,
            scoring,
        }
    }

    /// Writes the per-query decision record. Failures are logged and
    /// swallowed - routing must never break the product flow.
    fn log_decision(&self, parsed: &ParsedQuery, decision: &RouteDecision) {
        let Some(dir) = &self.decision_log_dir else {
            return;
        };

        let record = serde_json::json!({
            "query": parsed.normalized_text,
            "stones_signals": parsed.stones_signals,
            "keywords": parsed.keywords,
            "intents": parsed.intents,
            "candidates": decision.candidates,
            "confidence": decision.confidence,
            "route": decision.route.as_str(),
            "scoring": decision.scoring,
        });

        let path = dir.join(format!("router_{}.json", uuid::Uuid::new_v4()));
        let outcome = std::fs::create_dir_all(dir)
            .map_err(crate::error::Error::from)
            .and_then(|()| {
                let data = serde_json::to_vec_pretty(&record)?;
                std::fs::write(&path, data)?;
                Ok(())
            });
        if let Err(err) = outcome {
            tracing::warn!(%err, "router decision log failed (never break the product flow)");
        }
    }
}

/// Jaccard overlap of two slug lists; 0 when either side is empty.
fn jaccard(a: &[String], b: &[String]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: std::collections::HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: std::collections::HashSet<&str> = b.iter().map(String::as_str).collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f32 / union as f32
    }
}

/// Share of keywords contained in (or containing) any target term.
fn keyword_match(keywords: &[String], targets: &[&str]) -> f32 {
    if keywords.is_empty() || targets.is_empty() {
        return 0.0;
    }

    let matches = keywords
        .iter()
        .filter(|keyword| {
            targets.iter().any(|target| {
                let target = target.to_lowercase();
                target.contains(keyword.as_str()) || keyword.contains(&target)
            })
        })
        .count();

    #[allow(clippy::cast_precision_loss)]
    {
        matches as f32 / keywords.len() as f32
    }
}
