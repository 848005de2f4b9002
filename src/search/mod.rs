//! Per-lane retrieval with router scoping, diversification, and fusion.
//!
//! The fast lane diversifies with MMR over candidate embeddings cached in
//! the index; the accurate lane reranks with a cross-encoder. Router
//! candidates restrict scope, with a top-up from the unfiltered pool when
//! the scope is too thin. At most two chunks per document survive into
//! the final ranked list.

pub mod fusion;
pub mod mmr;
pub mod rerank;

pub use fusion::{DEFAULT_BLEND_WEIGHTS, DEFAULT_K_RRF, rrf_fuse, weighted_blend};
pub use mmr::{DEFAULT_MMR_LAMBDA, mmr_select};
pub use rerank::{RERANK_BATCH, Reranker, create_reranker};

use std::collections::HashMap;

use crate::core::{Chunk, Lane, SearchResult};
use crate::error::Result;
use crate::index::{SearchFilters, VectorIndex};
use crate::router::RouteDecision;

/// Preview length for result conversion, in bytes.
const PREVIEW_LEN: usize = 240;

/// Maximum chunks from one document in a final ranked list.
pub const PER_DOC_CAP: usize = 2;

/// An internal retrieval hit carrying the full chunk.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Index row the chunk came from.
    pub row: usize,
    /// Lane score (similarity, or rerank score after reranking).
    pub score: f32,
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Provenance marker ("topup" for items restored past the router
    /// scope).
    pub source: Option<&'static str>,
}

impl Hit {
    /// Converts to the public result shape.
    #[must_use]
    pub fn to_result(&self) -> SearchResult {
        SearchResult {
            score: self.score,
            text_preview: self.chunk.preview(PREVIEW_LEN).to_string(),
            metadata: self.chunk.metadata.clone(),
            fusion_info: None,
            source: self.source.map(ToString::to_string),
        }
    }
}

/// Lane retrieval parameters.
#[derive(Debug, Clone)]
pub struct LaneParams {
    /// Final result count for the fast lane.
    pub top_k: usize,
    /// Candidate pool size (fast lane defaults to `top_k * 4`).
    pub k_retrieve: usize,
    /// MMR balance for the fast lane.
    pub mmr_lambda: f32,
    /// Post-rerank result count for the accurate lane.
    pub top_k_rerank: usize,
}

impl LaneParams {
    /// Fast-lane defaults for a final `top_k`.
    #[must_use]
    pub fn fast(top_k: usize) -> Self {
        Self {
            top_k,
            k_retrieve: top_k.saturating_mul(4).max(1),
            mmr_lambda: DEFAULT_MMR_LAMBDA,
            top_k_rerank: top_k,
        }
    }

    /// Accurate-lane defaults: a configurable candidate pool (default
    /// 50) reranked down to `top_k_rerank` (default 10).
    #[must_use]
    pub fn accurate(k_retrieve: usize, top_k_rerank: usize) -> Self {
        Self {
            top_k: top_k_rerank,
            k_retrieve: k_retrieve.max(1),
            mmr_lambda: DEFAULT_MMR_LAMBDA,
            top_k_rerank: top_k_rerank.max(1),
        }
    }

    /// The size of the final ranked list for `lane`.
    #[must_use]
    pub const fn final_k(&self, lane: Lane) -> usize {
        match lane {
            Lane::Fast => self.top_k,
            Lane::Accurate => self.top_k_rerank,
        }
    }
}

/// Runs one lane's retrieval path.
///
/// Steps: embed the query, pull `k_retrieve` candidates, apply metadata
/// filters, restrict to the router scope (topping up from the unfiltered
/// pool when needed), diversify (MMR or cross-encoder rerank), cap
/// per-document results, and return the final ranked list.
pub fn retrieve_lane(
    index: &VectorIndex,
    lane: Lane,
    query: &str,
    params: &LaneParams,
    route: Option<&RouteDecision>,
    filters: Option<&SearchFilters>,
    reranker: Option<&dyn Reranker>,
) -> Result<Vec<Hit>> {
    if index.is_empty() {
        return Ok(Vec::new());
    }

    let query_vector = index.embed_query(query)?;
    let candidates = index.search_vector(&query_vector, params.k_retrieve)?;

    // Metadata filters apply before scoping; they are hard constraints.
    let filtered: Vec<(usize, f32)> = match filters {
        Some(filters) if !filters.is_empty() => candidates
            .iter()
            .copied()
            .filter(|(row, _)| {
                index
                    .chunk_at(*row)
                    .is_some_and(|c| filters.matches(&c.metadata))
            })
            .collect(),
        _ => candidates.clone(),
    };

    let target = params.final_k(lane);
    let scoped = apply_route_scope(index, &filtered, route, target);

    let selected: Vec<(usize, f32, Option<&'static str>)> = match lane {
        Lane::Fast => {
            let pairs: Vec<(usize, f32)> = scoped.iter().map(|&(row, score, _)| (row, score)).collect();
            let vectors: Vec<&[f32]> = pairs
                .iter()
                .map(|&(row, _)| index.vector_at(row).unwrap_or(&[]))
                .collect();
            let picked = mmr_select(&pairs, &vectors, params.mmr_lambda, params.top_k);
            reattach_sources(&picked, &scoped)
        }
        Lane::Accurate => match reranker {
            Some(reranker) => {
                let texts: Vec<&str> = scoped
                    .iter()
                    .filter_map(|&(row, _, _)| index.chunk_at(row).map(|c| c.text.as_str()))
                    .collect();
                let scores = reranker.score_pairs(query, &texts)?;

                let mut rescored: Vec<(usize, f32, Option<&'static str>)> = scoped
                    .iter()
                    .zip(scores)
                    .map(|(&(row, _, source), score)| (row, score, source))
                    .collect();
                rescored.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
                });
                rescored.truncate(params.top_k_rerank);
                rescored
            }
            None => scoped.into_iter().take(params.top_k_rerank).collect(),
        },
    };

    // Per-document diversity cap, then final ranks follow list order.
    let mut per_doc: HashMap<String, usize> = HashMap::new();
    let mut hits = Vec::with_capacity(selected.len());
    for (row, score, source) in selected {
        let Some(chunk) = index.chunk_at(row) else {
            continue;
        };
        let seen = per_doc
            .entry(chunk.metadata.protocol_id.clone())
            .or_insert(0);
        if *seen >= PER_DOC_CAP {
            continue;
        }
        *seen += 1;
        hits.push(Hit {
            row,
            score,
            chunk: chunk.clone(),
            source,
        });
    }

    Ok(hits)
}

/// Restricts candidates to the router's protocols, topping up from the
/// unfiltered pool (in original score order) when the scoped list falls
/// below `target`. Topped-up items are marked `source = "topup"`.
fn apply_route_scope(
    index: &VectorIndex,
    candidates: &[(usize, f32)],
    route: Option<&RouteDecision>,
    target: usize,
) -> Vec<(usize, f32, Option<&'static str>)> {
    let Some(route) = route.filter(|r| r.is_scoped()) else {
        return candidates.iter().map(|&(row, score)| (row, score, None)).collect();
    };

    let scope: Vec<&str> = route.candidate_ids();
    let in_scope = |row: usize| {
        index
            .chunk_at(row)
            .is_some_and(|c| scope.contains(&c.metadata.protocol_id.as_str()))
    };

    let mut scoped: Vec<(usize, f32, Option<&'static str>)> = candidates
        .iter()
        .copied()
        .filter(|&(row, _)| in_scope(row))
        .map(|(row, score)| (row, score, None))
        .collect();

    if scoped.len() < target {
        for &(row, score) in candidates {
            if scoped.len() >= target {
                break;
            }
            if !in_scope(row) {
                scoped.push((row, score, Some("topup")));
            }
        }
    }

    scoped
}

/// Carries the scope markers through MMR selection.
fn reattach_sources(
    picked: &[(usize, f32)],
    scoped: &[(usize, f32, Option<&'static str>)],
) -> Vec<(usize, f32, Option<&'static str>)> {
    picked
        .iter()
        .map(|&(row, score)| {
            let source = scoped
                .iter()
                .find(|&&(r, _, _)| r == row)
                .and_then(|&(_, _, s)| s);
            (row, score, source)
        })
        .collect()
}
