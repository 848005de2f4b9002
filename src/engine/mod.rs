//! The retrieval engine.
//!
//! An explicit dependency-injected core owning the two lane indices, the
//! router, the observability logger, and the configuration - no process
//! globals. Exposes lane search, hybrid fusion search, and the guarded
//! answer path (escalation, grounding, refusal), plus a dummy mode that
//! serves pre-recorded retrieval and answers for offline tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::core::{Chunk, ChunkMetadata, Lane, SearchResult, text_hash};
use crate::error::{Result, RouterError};
use crate::guard::{
    self, REFUSAL_TEXT, RefusalReason, Verdict,
};
use crate::index::{SearchFilters, VectorIndex};
use crate::obs::{Citation, StageTimings, TurnFlags, TurnLogger, TurnRecord, WARMUP_QUERIES};
use crate::protocol::{Protocol, derive_protocol_id, normalize_protocol_value};
use crate::router::{ParsedQuery, RouteDecision, Router};
use crate::search::{self, DEFAULT_K_RRF, Hit, LaneParams, Reranker, create_reranker};

/// Default result count for the answer path's fast lane.
const DEFAULT_ANSWER_K: usize = 8;

/// How the two lane outputs are combined in hybrid mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fusion {
    /// Reciprocal Rank Fusion with the given k parameter.
    Rrf {
        /// RRF k parameter (default 60).
        k_rrf: u32,
    },
    /// Weighted score blend.
    Blend {
        /// `(speed, accuracy)` weights, default `(0.35, 0.65)`.
        weights: (f32, f32),
    },
}

impl Default for Fusion {
    fn default() -> Self {
        Self::Rrf { k_rrf: DEFAULT_K_RRF }
    }
}

/// Options for the guarded answer path.
#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    /// Requested lane; `None` uses the configured default and allows
    /// escalation.
    pub lane: Option<Lane>,
    /// Result count for the fast lane (the accurate lane uses its
    /// configured rerank depth).
    pub k: Option<usize>,
    /// Caller-declared intent; high-risk kinds force escalation.
    pub user_intent: Option<String>,
    /// Stones the answer is expected to align with.
    pub expected_stones: Vec<String>,
    /// Metadata filters.
    pub filters: Option<SearchFilters>,
}

/// Retrieval summary attached to successful payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMeta {
    /// Lane that produced the result.
    pub lane: String,
    /// Number of retrieved chunks.
    pub top_k: usize,
    /// De-duplicated source document ids.
    pub used_doc_ids: Vec<String>,
    /// Citations into the answer text.
    pub citations: Vec<Citation>,
}

/// Response metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Lane/profile the response came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Fallback slug on refusals and disabled turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// Normalised grounding score (refusals report it here).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding_score: Option<f32>,
    /// Retrieval summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalMeta>,
    /// Stones alignment of the answer text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stones_alignment: Option<f32>,
    /// Integer grounding score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding_score_1to5: Option<u8>,
    /// Whether support fell below the lane's thresholds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insufficient_support: Option<bool>,
    /// Degradation reason ("flags.disabled").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Escalation reason, when the fast lane escalated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
}

/// The answer-path payload: a grounded extract with citations, or a
/// refusal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    /// Answer text (the grounded extract, or the refusal text).
    pub text: String,
    /// Citations into the text; empty on refusals.
    pub citations: Vec<Citation>,
    /// Metadata.
    pub meta: ResponseMeta,
}

/// One lane pass: retrieval, synthesis, grounding.
struct LanePass {
    lane: Lane,
    hits: Vec<Hit>,
    text: String,
    citations: Vec<Citation>,
    alignment: f32,
    hallucinations: u32,
    score_1to5: u8,
    grounding: f32,
    retrieve_ms: f64,
    synth_ms: f64,
}

/// The dual-lane retrieval engine.
pub struct Engine {
    config: Config,
    fast: VectorIndex,
    accurate: VectorIndex,
    accurate_reranker: Option<Box<dyn Reranker>>,
    router: Option<Router>,
    logger: TurnLogger,
    turn_counter: AtomicUsize,
    dummy: Option<DummyData>,
}

impl Engine {
    /// Opens the engine: both lane indices at their configured paths,
    /// the accurate-lane reranker, and the turn logger. The router stays
    /// empty until [`Engine::build_catalog`] runs.
    pub fn open(config: Config) -> Result<Self> {
        let fast = VectorIndex::open_at(
            config.index_paths(Lane::Fast),
            crate::embedding::create_embedder(config.fast.embed.as_deref(), Lane::Fast),
        )?;
        let accurate = VectorIndex::open_at(
            config.index_paths(Lane::Accurate),
            crate::embedding::create_embedder(config.accurate.embed.as_deref(), Lane::Accurate),
        )?;
        let accurate_reranker = create_reranker(config.accurate.rerank.as_deref());
        let logger = TurnLogger::new(config.obs.clone(), crate::obs::Redactor::from_env());
        let dummy = if config.dummy_mode {
            Some(DummyData::load(&config.dummy_data_dir))
        } else {
            None
        };

        Ok(Self {
            config,
            fast,
            accurate,
            accurate_reranker,
            router: None,
            logger,
            turn_counter: AtomicUsize::new(0),
            dummy,
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The turn logger (latency budgets, p95 queries).
    #[must_use]
    pub const fn logger(&self) -> &TurnLogger {
        &self.logger
    }

    /// The lane index.
    #[must_use]
    pub const fn index(&self, lane: Lane) -> &VectorIndex {
        match lane {
            Lane::Fast => &self.fast,
            Lane::Accurate => &self.accurate,
        }
    }

    /// Builds (or loads from cache) the protocol catalog and installs
    /// the router. Centroids are embedded with the fast lane's backend.
    pub fn build_catalog(&mut self, protocols: &[(String, Protocol)]) -> Result<()> {
        let catalog = if self.config.fast.embed.is_some() {
            let embedder = self.fast.embedder();
            let model_safe = embedder.name().replace(['/', '-'], "_");
            let cache_path = self
                .config
                .index_root
                .join(format!("catalog_{model_safe}.json"));
            let (catalog, from_cache) = Catalog::build_cached(protocols, embedder, &cache_path)?;
            if !from_cache {
                tracing::info!(entries = catalog.entries.len(), "built protocol catalog");
            }
            catalog
        } else {
            Catalog::build_lexical(protocols)
        };

        let mut router = Router::new(catalog);
        if let Some(dir) = &self.config.router_log_dir {
            router = router.with_decision_log(dir.clone());
        }
        self.router = Some(router);
        Ok(())
    }

    /// Parses a query into routing signals.
    pub fn parse_query(&self, query: &str) -> Result<ParsedQuery> {
        let router = self.router.as_ref().ok_or_else(|| RouterError::Unavailable {
            reason: "catalog not built".to_string(),
        })?;
        Ok(router.parse_query(query))
    }

    /// Routes a query to candidate protocols.
    pub fn route(&self, query: &str) -> Result<RouteDecision> {
        let router = self.router.as_ref().ok_or_else(|| RouterError::Unavailable {
            reason: "catalog not built".to_string(),
        })?;
        let parsed = router.parse_query(query);
        let embedding = self.fast.embed_query(query).ok();
        Ok(router.route(&parsed, embedding.as_deref()))
    }

    /// Router decision for internal scoping; router or embedding
    /// failures degrade to an unscoped decision.
    fn route_or_all(&self, query: &str) -> Option<RouteDecision> {
        let router = self.router.as_ref()?;
        let parsed = router.parse_query(query);
        let embedding = self.fast.embed_query(query).ok();
        Some(router.route(&parsed, embedding.as_deref()))
    }

    /// Lane retrieval: `search(query, k, lane, filters, use_router)`.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        lane: Option<Lane>,
        filters: Option<&SearchFilters>,
        use_router: bool,
    ) -> Result<Vec<SearchResult>> {
        let lane = lane.unwrap_or(self.config.default_lane);
        let route = if use_router { self.route_or_all(query) } else { None };
        let hits = self.run_lane(lane, query, k, route.as_ref(), filters)?;
        Ok(hits.iter().map(Hit::to_result).collect())
    }

    /// Hybrid retrieval: both lanes run concurrently and their ranked
    /// lists are fused.
    pub fn hybrid_search(
        &self,
        query: &str,
        k: usize,
        fusion: Fusion,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<SearchResult>> {
        let route = self.route_or_all(query);

        let (fast_hits, accurate_hits) = rayon::join(
            || self.run_lane(Lane::Fast, query, k, route.as_ref(), filters),
            || self.run_lane(Lane::Accurate, query, k, route.as_ref(), filters),
        );

        // A single failed lane degrades to the other; both failing is an
        // error.
        let (fast_hits, accurate_hits) = match (fast_hits, accurate_hits) {
            (Ok(f), Ok(a)) => (f, a),
            (Ok(f), Err(err)) => {
                tracing::warn!(%err, "accurate lane failed during hybrid search");
                (f, Vec::new())
            }
            (Err(err), Ok(a)) => {
                tracing::warn!(%err, "fast lane failed during hybrid search");
                (Vec::new(), a)
            }
            (Err(err), Err(_)) => return Err(err),
        };

        Ok(match fusion {
            Fusion::Rrf { k_rrf } => search::rrf_fuse(&fast_hits, &accurate_hits, k_rrf, k),
            Fusion::Blend { weights } => {
                search::weighted_blend(&fast_hits, &accurate_hits, weights, k)
            }
        })
    }

    /// The guarded answer path: retrieve, synthesise a grounded extract,
    /// score grounding, escalate once when warranted, and refuse when
    /// support is too weak. Every turn is logged.
    pub fn answer(&self, query: &str, opts: &AnswerOptions) -> RagResponse {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let warmup = self.next_turn_is_warmup();

        if !self.config.enabled {
            return self.disabled_response(&request_id, query, opts, warmup);
        }

        let forced = self.config.force_lane;
        let lane = forced.or(opts.lane).unwrap_or(self.config.default_lane);
        let route = self.route_or_all(query);

        let mut pass = match self.lane_pass(lane, query, opts, route.as_ref()) {
            Ok(pass) => pass,
            Err(err) => {
                tracing::warn!(%err, "retrieval failed");
                return self.empty_response(&request_id, query, lane, opts, warmup, started);
            }
        };

        if pass.hits.is_empty() {
            return self.empty_response(&request_id, query, lane, opts, warmup, started);
        }

        // Escalation: at most one fast -> accurate re-run; a forced lane
        // disables it entirely.
        let mut escalation_reason = None;
        let escalation_allowed =
            forced.is_none() && !self.config.disable_escalation && pass.lane == Lane::Fast;
        if escalation_allowed {
            if let Some(reason) = guard::should_escalate(
                query,
                pass.citations.len(),
                pass.grounding,
                opts.user_intent.as_deref(),
                self.config.grounding_threshold,
                self.config.complexity_threshold,
            ) {
                tracing::info!(reason = reason.as_str(), "escalating to accurate lane");
                match self.lane_pass(Lane::Accurate, query, opts, route.as_ref()) {
                    Ok(accurate_pass) => {
                        escalation_reason = Some(reason);
                        pass = accurate_pass;
                    }
                    Err(err) => {
                        tracing::warn!(%err, "escalation failed, keeping fast-lane result");
                    }
                }
            }
        }

        let total_ms = elapsed_ms(started);
        let stages = StageTimings {
            retrieve_ms: pass.retrieve_ms,
            rerank_ms: 0.0,
            synth_ms: pass.synth_ms,
            total_ms,
        };
        self.logger.record_latency(pass.lane.as_str(), total_ms, warmup);

        match guard::evaluate(pass.grounding, pass.citations.len(), self.config.min_grounding) {
            Verdict::Refuse(reason) => {
                self.log_refusal(&request_id, query, &pass, opts, reason, stages, warmup);
                RagResponse {
                    text: REFUSAL_TEXT.to_string(),
                    citations: Vec::new(),
                    meta: ResponseMeta {
                        profile: Some(pass.lane.as_str().to_string()),
                        fallback: Some(reason.as_str().to_string()),
                        grounding_score: Some(pass.grounding),
                        ..ResponseMeta::default()
                    },
                }
            }
            Verdict::Pass => {
                let insufficient =
                    !guard::sufficient_support(pass.lane, pass.alignment, pass.hallucinations);
                let used_doc_ids = used_doc_ids(&pass.hits);

                self.logger.log_turn(&TurnRecord {
                    request_id: request_id.clone(),
                    lane: pass.lane.as_str().to_string(),
                    query: query.to_string(),
                    topk: pass.hits.len(),
                    stones: Some(opts.expected_stones.clone()),
                    grounding_score: Some(pass.grounding),
                    stages,
                    flags: TurnFlags {
                        rag_enabled: true,
                        fallback: None,
                        warmup,
                        refusal: None,
                    },
                    citations: pass.citations.clone(),
                    trace: Some(serde_json::json!({
                        "used_doc_ids": used_doc_ids,
                        "escalation": escalation_reason.map(guard::EscalationReason::as_str),
                    })),
                });

                RagResponse {
                    text: pass.text,
                    citations: pass.citations.clone(),
                    meta: ResponseMeta {
                        retrieval: Some(RetrievalMeta {
                            lane: pass.lane.as_str().to_string(),
                            top_k: pass.hits.len(),
                            used_doc_ids,
                            citations: pass.citations,
                        }),
                        stones_alignment: Some(pass.alignment),
                        grounding_score_1to5: Some(pass.score_1to5),
                        insufficient_support: Some(insufficient),
                        escalation_reason: escalation_reason
                            .map(|r| r.as_str().to_string()),
                        ..ResponseMeta::default()
                    },
                }
            }
        }
    }

    /// One retrieval + synthesis + grounding pass on a lane.
    fn lane_pass(
        &self,
        lane: Lane,
        query: &str,
        opts: &AnswerOptions,
        route: Option<&RouteDecision>,
    ) -> Result<LanePass> {
        let retrieve_started = Instant::now();
        let hits = self.run_lane(
            lane,
            query,
            opts.k.unwrap_or(DEFAULT_ANSWER_K),
            route,
            opts.filters.as_ref(),
        )?;
        let retrieve_ms = elapsed_ms(retrieve_started);

        let synth_started = Instant::now();
        let (mut text, mut citations) = self.synthesize(&hits);
        let mut hallucinations = u32::from(hits.is_empty());

        // Dummy answers may override the synthesised extract.
        if let Some(dummy) = &self.dummy {
            if let Some(override_answer) = dummy.answer_override(query, lane) {
                text = override_answer.text;
                hallucinations = override_answer.hallucinations;
                if let Some(dummy_citations) = override_answer.citations {
                    citations = dummy_citations;
                }
            }
        }
        let synth_ms = elapsed_ms(synth_started);

        let alignment = guard::stones_alignment(&text, &opts.expected_stones);
        let score_1to5 = guard::grounding_score_1to5(citations.len(), alignment, hallucinations);
        let grounding = guard::normalize_grounding(score_1to5);

        Ok(LanePass {
            lane,
            hits,
            text,
            citations,
            alignment,
            hallucinations,
            score_1to5,
            grounding,
            retrieve_ms,
            synth_ms,
        })
    }

    /// Runs one lane's retrieval, honouring dummy mode.
    fn run_lane(
        &self,
        lane: Lane,
        query: &str,
        k: usize,
        route: Option<&RouteDecision>,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<Hit>> {
        if let Some(dummy) = &self.dummy {
            let top_k = match lane {
                Lane::Fast => k,
                Lane::Accurate => self.config.accurate_top_k_rerank,
            };
            return Ok(dummy.retrieve(query, top_k));
        }

        let (index, params, reranker) = match lane {
            Lane::Fast => {
                let mut params = LaneParams::fast(k);
                params.mmr_lambda = self.config.mmr_lambda;
                (&self.fast, params, None)
            }
            Lane::Accurate => (
                &self.accurate,
                LaneParams::accurate(
                    self.config.accurate_top_k_retrieve,
                    self.config.accurate_top_k_rerank,
                ),
                self.accurate_reranker.as_deref(),
            ),
        };

        search::retrieve_lane(index, lane, query, &params, route, filters, reranker)
    }

    /// Builds the minimal grounded extract: top chunk texts clipped to
    /// the context budget, with one citation per contributing chunk.
    fn synthesize(&self, hits: &[Hit]) -> (String, Vec<Citation>) {
        let mut text = String::new();
        let mut citations = Vec::new();
        let budget = self.config.max_context_chars;

        for hit in hits {
            if text.len() >= budget {
                break;
            }
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            let span_start = text.len();
            text.push_str(&hit.chunk.text);
            if text.len() > budget {
                let mut end = budget;
                while end > 0 && !text.is_char_boundary(end) {
                    end -= 1;
                }
                text.truncate(end);
            }
            let span_end = text.len();
            if span_end > span_start {
                citations.push(Citation {
                    source_id: hit.chunk.metadata.protocol_id.clone(),
                    span_start,
                    span_end,
                });
            }
        }

        (text, citations)
    }

    fn next_turn_is_warmup(&self) -> bool {
        self.turn_counter.fetch_add(1, Ordering::SeqCst) < WARMUP_QUERIES
    }

    fn disabled_response(
        &self,
        request_id: &str,
        query: &str,
        opts: &AnswerOptions,
        warmup: bool,
    ) -> RagResponse {
        self.logger.log_turn(&TurnRecord {
            request_id: request_id.to_string(),
            lane: "disabled".to_string(),
            query: query.to_string(),
            topk: 0,
            stones: Some(opts.expected_stones.clone()),
            grounding_score: None,
            stages: StageTimings::default(),
            flags: TurnFlags {
                rag_enabled: false,
                fallback: Some("flags.disabled".to_string()),
                warmup,
                refusal: None,
            },
            citations: Vec::new(),
            trace: None,
        });

        RagResponse {
            text: String::new(),
            citations: Vec::new(),
            meta: ResponseMeta {
                retrieval: Some(RetrievalMeta {
                    lane: "disabled".to_string(),
                    top_k: 0,
                    used_doc_ids: Vec::new(),
                    citations: Vec::new(),
                }),
                stones_alignment: Some(0.0),
                grounding_score_1to5: Some(1),
                insufficient_support: Some(true),
                reason: Some("flags.disabled".to_string()),
                ..ResponseMeta::default()
            },
        }
    }

    fn empty_response(
        &self,
        request_id: &str,
        query: &str,
        lane: Lane,
        opts: &AnswerOptions,
        warmup: bool,
        started: Instant,
    ) -> RagResponse {
        let total_ms = elapsed_ms(started);
        self.logger.log_turn(&TurnRecord {
            request_id: request_id.to_string(),
            lane: lane.as_str().to_string(),
            query: query.to_string(),
            topk: 0,
            stones: Some(opts.expected_stones.clone()),
            grounding_score: None,
            stages: StageTimings {
                retrieve_ms: total_ms,
                rerank_ms: 0.0,
                synth_ms: 0.0,
                total_ms,
            },
            flags: TurnFlags {
                rag_enabled: true,
                fallback: None,
                warmup,
                refusal: None,
            },
            citations: Vec::new(),
            trace: None,
        });

        RagResponse {
            text: String::new(),
            citations: Vec::new(),
            meta: ResponseMeta {
                retrieval: Some(RetrievalMeta {
                    lane: lane.as_str().to_string(),
                    top_k: 0,
                    used_doc_ids: Vec::new(),
                    citations: Vec::new(),
                }),
                stones_alignment: Some(0.0),
                grounding_score_1to5: Some(1),
                insufficient_support: Some(true),
                ..ResponseMeta::default()
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn log_refusal(
        &self,
        request_id: &str,
        query: &str,
        pass: &LanePass,
        opts: &AnswerOptions,
        reason: RefusalReason,
        stages: StageTimings,
        warmup: bool,
    ) {
        self.logger.log_turn(&TurnRecord {
            request_id: request_id.to_string(),
            lane: pass.lane.as_str().to_string(),
            query: query.to_string(),
            topk: pass.hits.len(),
            stones: Some(opts.expected_stones.clone()),
            grounding_score: Some(pass.grounding),
            stages,
            flags: TurnFlags {
                rag_enabled: true,
                fallback: Some(reason.as_str().to_string()),
                warmup,
                refusal: Some(reason.as_str().to_string()),
            },
            citations: Vec::new(),
            trace: None,
        });
    }
}

/// De-duplicated document ids, in first-seen order.
fn used_doc_ids(hits: &[Hit]) -> Vec<String> {
    let mut ids = Vec::new();
    for hit in hits {
        let id = &hit.chunk.metadata.protocol_id;
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    ids
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Loads protocols from a directory of JSON files, deriving ids.
///
/// Unparseable files are skipped with a warning so one bad document
/// never blocks catalog building.
pub fn load_protocols(dir: &Path) -> Result<Vec<(String, Protocol)>> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort();

    let mut protocols = Vec::new();
    for path in entries {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(%err, path = %path.display(), "skipping unreadable protocol");
                continue;
            }
        };
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%err, path = %path.display(), "skipping invalid protocol JSON");
                continue;
            }
        };
        let explicit = value.get("Protocol ID").and_then(|v| v.as_str()).map(ToString::to_string);
        let (pid, _) = derive_protocol_id(&path, explicit.as_deref());
        match serde_json::from_value::<Protocol>(normalize_protocol_value(value)) {
            Ok(protocol) => protocols.push((pid, protocol)),
            Err(err) => {
                tracing::warn!(%err, path = %path.display(), "skipping unparseable protocol");
            }
        }
    }
    Ok(protocols)
}

/// Pre-recorded retrieval and answers for `USE_DUMMY_RAG`.
struct DummyData {
    retrieval: Vec<serde_json::Value>,
    answers: Vec<serde_json::Value>,
}

struct DummyAnswer {
    text: String,
    hallucinations: u32,
    citations: Option<Vec<Citation>>,
}

impl DummyData {
    fn load(dir: &Path) -> Self {
        Self {
            retrieval: read_jsonl(&dir.join("dummy_retrieval.jsonl")),
            answers: read_jsonl(&dir.join("dummy_answers.jsonl")),
        }
    }

    /// Pre-recorded hits for a query (substring match either way).
    fn retrieve(&self, query: &str, top_k: usize) -> Vec<Hit> {
        let query_lower = query.to_lowercase();
        for record in &self.retrieval {
            let recorded = record.get("query").and_then(|q| q.as_str()).unwrap_or_default();
            let recorded_lower = recorded.to_lowercase();
            if recorded_lower.is_empty()
                || !(query_lower.contains(&recorded_lower) || recorded_lower.contains(&query_lower))
            {
                continue;
            }

            let results = record
                .get("results")
                .and_then(|r| r.as_array())
                .cloned()
                .unwrap_or_default();
            return results
                .iter()
                .take(top_k)
                .enumerate()
                .map(|(rank, result)| dummy_hit(result, rank))
                .collect();
        }
        Vec::new()
    }

    fn answer_override(&self, query: &str, lane: Lane) -> Option<DummyAnswer> {
        let query_lower = query.to_lowercase();
        for record in &self.answers {
            let recorded = record.get("query").and_then(|q| q.as_str()).unwrap_or_default();
            let recorded_lower = recorded.to_lowercase();
            let lane_matches = record
                .get("lane")
                .and_then(|l| l.as_str())
                .is_none_or(|l| l == lane.as_str());
            if recorded_lower.is_empty()
                || !lane_matches
                || !(query_lower.contains(&recorded_lower)
                    || recorded_lower.contains(&query_lower))
            {
                continue;
            }

            let text = record
                .get("answer")
                .and_then(|a| a.as_str())
                .unwrap_or_default()
                .to_string();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let hallucinations = record
                .get("hallucinations")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as u32;
            let citations = record.get("citations").and_then(|c| c.as_array()).map(|items| {
                items
                    .iter()
                    .map(|item| Citation {
                        source_id: item
                            .get("source_id")
                            .or_else(|| item.get("doc"))
                            .and_then(|v| v.as_str())
                            .unwrap_or("dummy")
                            .to_string(),
                        span_start: 0,
                        span_end: text.len(),
                    })
                    .collect()
            });

            return Some(DummyAnswer {
                text,
                hallucinations,
                citations,
            });
        }
        None
    }
}

fn dummy_hit(result: &serde_json::Value, rank: usize) -> Hit {
    let doc = result.get("doc").and_then(|v| v.as_str()).unwrap_or("dummy").to_string();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let chunk_idx = result.get("chunk").and_then(serde_json::Value::as_u64).unwrap_or(0) as usize;
    let text = result.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    #[allow(clippy::cast_possible_truncation)]
    let score = result
        .get("score")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(1.0 - rank as f64 * 0.01) as f32;

    Hit {
        row: rank,
        score,
        chunk: Chunk::new(
            text.clone(),
            ChunkMetadata {
                chunk_id: ChunkMetadata::format_id(&doc, 0, chunk_idx),
                protocol_id: doc.clone(),
                title: doc,
                section_name: "dummy".to_string(),
                section_idx: 0,
                chunk_idx,
                n_tokens: text.chars().count().div_ceil(4),
                source_path: "dummy".to_string(),
                stones: Vec::new(),
                created_at: "1970-01-01T00:00:00Z".to_string(),
                hash: text_hash(&text),
                profile: None,
            },
        ),
        source: None,
    }
}

fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}
