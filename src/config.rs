//! Environment configuration.
//!
//! One typed struct for every recognised environment key, with the lane
//! model resolution rules (`null|none|""` disables a model) and per-lane
//! artefact path overrides.

use std::path::PathBuf;

use crate::core::Lane;
use crate::guard::{
    DEFAULT_COMPLEXITY_THRESHOLD, DEFAULT_GROUNDING_THRESHOLD, DEFAULT_MIN_GROUNDING,
};
use crate::index::IndexPaths;
use crate::obs::ObsConfig;

/// Default fast-lane embedding model.
pub const DEFAULT_FAST_EMBED: &str = "all-MiniLM-L6-v2";

/// Default accurate-lane embedding model.
pub const DEFAULT_ACCURATE_EMBED: &str = "text-embedding-3-large";

/// Default accurate-lane cross-encoder.
pub const DEFAULT_ACCURATE_RERANK: &str = "bge-reranker-base";

/// Resolved model identifiers for one lane.
#[derive(Debug, Clone, Default)]
pub struct LaneModels {
    /// Embedding model; `None` means the hash fallback.
    pub embed: Option<String>,
    /// Cross-encoder model; `None` disables reranking.
    pub rerank: Option<String>,
}

/// Per-lane artefact path overrides (`VECTOR_PATH_*`, `VECTOR_META_*`,
/// `VECTOR_STATS_*`).
#[derive(Debug, Clone, Default)]
pub struct LanePathOverrides {
    /// Vector artefact override.
    pub index: Option<PathBuf>,
    /// Docstore sidecar override.
    pub meta: Option<PathBuf>,
    /// Stats record override.
    pub stats: Option<PathBuf>,
}

/// The retrieval core's configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Master retrieval switch (`RAG_ENABLED`, default on).
    pub enabled: bool,
    /// Default lane (`RAG_PROFILE`).
    pub default_lane: Lane,
    /// Forced lane (`RAG_FORCE_LANE`); disables escalation entirely.
    pub force_lane: Option<Lane>,
    /// Escalation kill-switch (`RAG_DISABLE_ESCALATION`).
    pub disable_escalation: bool,
    /// Escalation grounding threshold (`RAG_GROUNDING_THRESHOLD`).
    pub grounding_threshold: f32,
    /// Escalation complexity threshold (`RAG_COMPLEXITY_THRESHOLD`).
    pub complexity_threshold: f32,
    /// Refusal grounding threshold (`MIN_GROUNDING`).
    pub min_grounding: f32,
    /// Pre-recorded retrieval/answers for offline tests
    /// (`USE_DUMMY_RAG`).
    pub dummy_mode: bool,
    /// Fast-lane models (`RAG_FAST_EMBED`, `RAG_FAST_RERANK`).
    pub fast: LaneModels,
    /// Accurate-lane models (`RAG_ACCURATE_EMBED`,
    /// `RAG_ACCURATE_RERANK`).
    pub accurate: LaneModels,
    /// Root of the per-lane index directories.
    pub index_root: PathBuf,
    /// Root of the per-lane chunk JSONL output.
    pub data_root: PathBuf,
    /// Directory holding dummy retrieval/answer fixtures.
    pub dummy_data_dir: PathBuf,
    /// Fast-lane path overrides.
    pub fast_paths: LanePathOverrides,
    /// Accurate-lane path overrides.
    pub accurate_paths: LanePathOverrides,
    /// Observability settings (`RAG_OBS_*`).
    pub obs: ObsConfig,
    /// Context clip for the synthesised extract, in characters.
    pub max_context_chars: usize,
    /// Accurate-lane candidate pool size.
    pub accurate_top_k_retrieve: usize,
    /// Accurate-lane post-rerank result count.
    pub accurate_top_k_rerank: usize,
    /// Fast-lane MMR balance.
    pub mmr_lambda: f32,
    /// Ingest worker pool size.
    pub ingest_workers: usize,
    /// Router decision log directory; `None` disables decision logs.
    pub router_log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            default_lane: Lane::Fast,
            force_lane: None,
            disable_escalation: false,
            grounding_threshold: DEFAULT_GROUNDING_THRESHOLD,
            complexity_threshold: DEFAULT_COMPLEXITY_THRESHOLD,
            min_grounding: DEFAULT_MIN_GROUNDING,
            dummy_mode: false,
            fast: LaneModels {
                embed: Some(DEFAULT_FAST_EMBED.to_string()),
                rerank: None,
            },
            accurate: LaneModels {
                embed: Some(DEFAULT_ACCURATE_EMBED.to_string()),
                rerank: Some(DEFAULT_ACCURATE_RERANK.to_string()),
            },
            index_root: PathBuf::from("index"),
            data_root: PathBuf::from("data"),
            dummy_data_dir: PathBuf::from("eval/data"),
            fast_paths: LanePathOverrides::default(),
            accurate_paths: LanePathOverrides::default(),
            obs: ObsConfig::default(),
            max_context_chars: 12_000,
            accurate_top_k_retrieve: 50,
            accurate_top_k_rerank: 10,
            mmr_lambda: crate::search::DEFAULT_MMR_LAMBDA,
            ingest_workers: 8,
            router_log_dir: Some(PathBuf::from("logs")),
        }
    }
}

impl Config {
    /// Builds the configuration from the environment, with defaults for
    /// anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            enabled: env_flag("RAG_ENABLED", true),
            default_lane: std::env::var("RAG_PROFILE")
                .ok()
                .and_then(|v| Lane::parse(&v))
                .unwrap_or(Lane::Fast),
            force_lane: std::env::var("RAG_FORCE_LANE")
                .ok()
                .and_then(|v| Lane::parse(&v)),
            disable_escalation: env_flag("RAG_DISABLE_ESCALATION", false),
            grounding_threshold: env_f32("RAG_GROUNDING_THRESHOLD", defaults.grounding_threshold),
            complexity_threshold: env_f32("RAG_COMPLEXITY_THRESHOLD", defaults.complexity_threshold),
            min_grounding: env_f32("MIN_GROUNDING", defaults.min_grounding),
            dummy_mode: env_flag("USE_DUMMY_RAG", false),
            fast: LaneModels {
                embed: env_model("RAG_FAST_EMBED", Some(DEFAULT_FAST_EMBED)),
                rerank: env_model("RAG_FAST_RERANK", None),
            },
            accurate: LaneModels {
                embed: env_model("RAG_ACCURATE_EMBED", Some(DEFAULT_ACCURATE_EMBED)),
                rerank: env_model("RAG_ACCURATE_RERANK", Some(DEFAULT_ACCURATE_RERANK)),
            },
            fast_paths: lane_path_overrides("FAST"),
            accurate_paths: lane_path_overrides("ACCURATE"),
            obs: ObsConfig::from_env(),
            ..defaults
        }
    }

    /// Artefact paths for a lane: the conventional layout under
    /// `<index-root>/<lane>/`, with any environment overrides applied.
    #[must_use]
    pub fn index_paths(&self, lane: Lane) -> IndexPaths {
        let dir = self.index_root.join(lane.profile_name());
        let mut paths = IndexPaths::in_dir(&dir);

        let overrides = match lane {
            Lane::Fast => &self.fast_paths,
            Lane::Accurate => &self.accurate_paths,
        };
        if let Some(index) = &overrides.index {
            paths.index = index.clone();
        }
        if let Some(meta) = &overrides.meta {
            paths.docstore = meta.clone();
        }
        if let Some(stats) = &overrides.stats {
            paths.stats = stats.clone();
        }
        paths
    }

    /// Model identifiers for a lane.
    #[must_use]
    pub const fn lane_models(&self, lane: Lane) -> &LaneModels {
        match lane {
            Lane::Fast => &self.fast,
            Lane::Accurate => &self.accurate,
        }
    }
}

/// "1"/"0" flag with a default for anything else or unset.
fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) if v == "1" => true,
        Ok(v) if v == "0" => false,
        _ => default,
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Model identifier override: unset keeps the default, `null|none|""`
/// clears it.
fn env_model(key: &str, default: Option<&str>) -> Option<String> {
    match std::env::var(key) {
        Ok(value) => {
            let lowered = value.trim().to_lowercase();
            if lowered.is_empty() || lowered == "null" || lowered == "none" {
                None
            } else {
                Some(value)
            }
        }
        Err(_) => default.map(ToString::to_string),
    }
}

fn lane_path_overrides(lane: &str) -> LanePathOverrides {
    let get = |prefix: &str| {
        std::env::var(format!("{prefix}_{lane}"))
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    };
    LanePathOverrides {
        index: get("VECTOR_PATH"),
        meta: get("VECTOR_META"),
        stats: get("VECTOR_STATS"),
    }
}
