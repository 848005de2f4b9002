//! Integration tests for duolane.
//!
//! Exercise the full ingest and query paths over real disk state, with
//! the deterministic hash embedders so everything runs offline.

#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use duolane::chunking::{ChunkerConfig, SectionChunker, TokenCounter};
use duolane::config::{Config, LaneModels};
use duolane::core::Lane;
use duolane::engine::{AnswerOptions, Engine, Fusion, load_protocols};
use duolane::index::{SearchFilters, VectorIndex};
use duolane::obs::ObsConfig;
use duolane::pipeline::{self, ProfileOverrides};
use duolane::protocol::Protocol;
use duolane::{HashEmbedder, derive_protocol_id};
use tempfile::TempDir;

fn outcome(tag: &str) -> serde_json::Value {
    serde_json::json!({
        "Present pattern": format!("{tag} pattern"),
        "Immediate cost": format!("{tag} cost"),
        "30-90 day system effect": format!("{tag} effect"),
        "Signals": format!("{tag} signals"),
        "Edge condition": format!("{tag} edge"),
        "Example moves": format!("{tag} moves"),
        "Future effect": format!("{tag} future"),
    })
}

fn protocol_json(title: &str, purpose: &str, theme: &str, stones: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "Title": title,
        "Short Title": title,
        "Overall Purpose": purpose,
        "Why This Matters": "It compounds quietly over seasons.",
        "When To Use This Protocol": "When the signal first appears.",
        "Overall Outcomes": {
            "Poor": "The pattern deepens.",
            "Expected": "The pattern loosens.",
            "Excellent": "The pattern resolves.",
            "Transcendent": "The pattern teaches."
        },
        "Themes": [{
            "Name": theme,
            "Purpose of This Theme": "Bring the pattern into view.",
            "Why This Matters": "What stays unseen stays in charge.",
            "Outcomes": {
                "Poor": outcome("poor"),
                "Expected": outcome("expected"),
                "Excellent": outcome("excellent"),
                "Transcendent": outcome("transcendent")
            },
            "Guiding Questions": ["What is actually happening here?", "What would ease look like?"]
        }],
        "Completion Prompts": ["What shifted for you?"],
        "Metadata": {
            "Stones": stones,
            "Tags": ["practice"],
            "Fields": [],
            "Bridges": []
        }
    })
}

fn write_corpus(dir: &Path) -> Vec<PathBuf> {
    let docs = dir.join("docs");
    std::fs::create_dir_all(&docs).expect("create docs dir");
    let specs = [
        (
            "pacing.json",
            protocol_json(
                "The Pace of Trust",
                "Slowing the pace of work until trust can catch up with it.",
                "Finding the Rhythm",
                &["speed", "trust"],
            ),
        ),
        (
            "clean_edges.json",
            protocol_json(
                "Clean Edges",
                "Keeping every boundary clean, named, and explicit.",
                "Naming the Edge",
                &["stewardship", "clarity"],
            ),
        ),
        (
            "carrying_light.json",
            protocol_json(
                "Carrying the Light",
                "Carrying the light through the long winter season.",
                "Holding the Flame",
                &["light", "presence"],
            ),
        ),
    ];

    specs
        .iter()
        .map(|(name, doc)| {
            let path = docs.join(name);
            std::fs::write(&path, serde_json::to_string_pretty(doc).expect("serialize"))
                .expect("write protocol");
            path
        })
        .collect()
}

fn offline_config(root: &Path) -> Config {
    Config {
        index_root: root.join("index"),
        data_root: root.join("data"),
        fast: LaneModels::default(),
        accurate: LaneModels {
            embed: None,
            rerank: Some("overlap:test".to_string()),
        },
        obs: ObsConfig {
            enabled: true,
            dir: root.join("logs"),
            file: Some("turns.jsonl".to_string()),
            sampling: 1.0,
            redact_query: false,
            max_len: 2000,
        },
        router_log_dir: Some(root.join("logs/router")),
        ..Config::default()
    }
}

fn ingest_both(config: &Config, paths: &[PathBuf]) {
    for lane in Lane::both() {
        let results = pipeline::process(config, paths, &config.data_root, None, lane, None)
            .expect("lane ingest");
        assert!(results.iter().all(|r| r.valid), "ingest failures: {results:?}");
    }
}

#[test]
fn test_ingest_persists_both_lanes() {
    let temp = TempDir::new().expect("temp dir");
    let config = offline_config(temp.path());
    let paths = write_corpus(temp.path());

    ingest_both(&config, &paths);

    for lane in Lane::both() {
        let lane_dir = config.index_root.join(lane.profile_name());
        assert!(lane_dir.join("index.bin").exists(), "{lane} index missing");
        assert!(lane_dir.join("docstore.json").exists());
        assert!(lane_dir.join("metadata.jsonl").exists());
    }

    // Accuracy profile also emits per-chunk JSONL.
    let chunks_file = config.data_root.join("accuracy/pacing.chunks.jsonl");
    assert!(chunks_file.exists());
    let raw = std::fs::read_to_string(&chunks_file).expect("read chunks");
    for line in raw.lines() {
        let chunk: serde_json::Value = serde_json::from_str(line).expect("chunk json");
        assert!(chunk["text"].is_string());
        assert_eq!(chunk["metadata"]["protocol_id"], "pacing");
    }
}

#[test]
fn test_reingest_emits_identical_chunk_files() {
    let temp = TempDir::new().expect("temp dir");
    let config = offline_config(temp.path());
    let paths = write_corpus(temp.path());

    pipeline::process(&config, &paths, &config.data_root, None, Lane::Accurate, None)
        .expect("first ingest");
    let first = std::fs::read(config.data_root.join("accuracy/clean_edges.chunks.jsonl"))
        .expect("first chunks");

    // Second run into a fresh index root: chunk identity must not
    // depend on index state.
    let other_root = temp.path().join("other");
    let second_config = Config {
        index_root: other_root.join("index"),
        data_root: other_root.join("data"),
        ..offline_config(temp.path())
    };
    pipeline::process(
        &second_config,
        &paths,
        &second_config.data_root,
        None,
        Lane::Accurate,
        None,
    )
    .expect("second ingest");
    let second = std::fs::read(second_config.data_root.join("accuracy/clean_edges.chunks.jsonl"))
        .expect("second chunks");

    let parse =
        |raw: &[u8]| -> Vec<serde_json::Value> {
            String::from_utf8_lossy(raw)
                .lines()
                .map(|l| serde_json::from_str(l).expect("chunk json"))
                .collect()
        };
    let (first, second) = (parse(&first), parse(&second));
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a["text"], b["text"]);
        assert_eq!(a["metadata"]["chunk_id"], b["metadata"]["chunk_id"]);
        assert_eq!(a["metadata"]["hash"], b["metadata"]["hash"]);
        assert_eq!(a["metadata"]["n_tokens"], b["metadata"]["n_tokens"]);
    }
}

#[test]
fn test_long_section_chunk_identity() {
    // A protocol whose Overall Purpose runs well past the token cap
    // splits into s2 chunks with an overlap prefix.
    let purpose = (0..80)
        .map(|i| format!("Sentence number {i} keeps the practice language steady and concrete."))
        .collect::<Vec<_>>()
        .join(" ");
    let doc = protocol_json("Long Purpose", &purpose, "Theme", &["clarity"]);
    let protocol: Protocol = serde_json::from_value(doc).expect("parse");

    let chunker = SectionChunker::with_counter(
        ChunkerConfig {
            max_tokens: 600,
            overlap_tokens: 60,
            ..ChunkerConfig::default()
        },
        TokenCounter::approximate(),
    )
    .expect("chunker");
    let chunks = chunker.chunk_protocol(
        &protocol,
        Path::new("/tmp/long_purpose.json"),
        Some("long_purpose"),
        None,
    );

    let purpose_chunks: Vec<_> = chunks
        .iter()
        .filter(|c| c.metadata.section_name == "Overall Purpose")
        .collect();
    assert!(purpose_chunks.len() >= 2);
    assert_eq!(purpose_chunks[0].metadata.chunk_id, "long_purpose::s2::c0");
    assert_eq!(purpose_chunks[1].metadata.chunk_id, "long_purpose::s2::c1");
    assert!(purpose_chunks[0].metadata.n_tokens <= 600);

    // The second chunk opens with a literal suffix of the first.
    let c0 = &purpose_chunks[0].text;
    let c1 = &purpose_chunks[1].text;
    let overlap = (1..=c1.len())
        .filter(|&n| c1.is_char_boundary(n) && c0.ends_with(&c1[..n]))
        .max()
        .unwrap_or(0);
    assert!(overlap > 0);
}

#[test]
fn test_id_derivation_scenarios() {
    let (id, changed) =
        derive_protocol_id(Path::new("/tmp/Clean Edges_v2.json"), Some("auto_17"));
    assert_eq!(id, "clean_edges_v2");
    assert!(changed);

    let (id, changed) =
        derive_protocol_id(Path::new("/tmp/Clean Edges_v2.json"), Some("clean_edges"));
    assert_eq!(id, "clean_edges");
    assert!(!changed);
}

#[test]
fn test_search_and_filters_over_loaded_index() {
    let temp = TempDir::new().expect("temp dir");
    let config = offline_config(temp.path());
    let paths = write_corpus(temp.path());
    ingest_both(&config, &paths);

    let engine = Engine::open(config).expect("open engine");
    let results = engine
        .search("keeping the boundary clean", 5, Some(Lane::Fast), None, false)
        .expect("search");
    assert!(!results.is_empty());
    assert!(results.len() <= 5);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let filters = SearchFilters {
        stones: Some(vec!["light".to_string()]),
        ..SearchFilters::default()
    };
    let filtered = engine
        .search("winter", 5, Some(Lane::Fast), Some(&filters), false)
        .expect("filtered search");
    assert!(filtered.iter().all(|r| r.metadata.stones.contains(&"light".to_string())));
}

#[test]
fn test_hybrid_search_fuses_lanes() {
    let temp = TempDir::new().expect("temp dir");
    let config = offline_config(temp.path());
    let paths = write_corpus(temp.path());
    ingest_both(&config, &paths);

    let engine = Engine::open(config).expect("open engine");
    let fused = engine
        .hybrid_search("slowing the pace of trust", 4, Fusion::default(), None)
        .expect("hybrid");
    assert!(!fused.is_empty());
    for result in &fused {
        let info = result.fusion_info.as_ref().expect("fusion info");
        assert!(info.speed_rank.is_some() || info.accuracy_rank.is_some());
        assert!(info.rrf_score.is_some());
    }

    let mut ids = std::collections::HashSet::new();
    for result in &fused {
        assert!(ids.insert(result.metadata.chunk_id.clone()));
    }
}

#[test]
fn test_routed_answer_with_catalog() {
    let temp = TempDir::new().expect("temp dir");
    let config = offline_config(temp.path());
    let paths = write_corpus(temp.path());
    ingest_both(&config, &paths);

    let mut engine = Engine::open(config).expect("open engine");
    let protocols = load_protocols(paths[0].parent().expect("docs dir")).expect("load protocols");
    engine.build_catalog(&protocols).expect("build catalog");

    let response = engine.answer(
        "how do I keep a clean boundary",
        &AnswerOptions::default(),
    );
    assert!(!response.text.is_empty());
    assert!(!response.citations.is_empty());
    let retrieval = response.meta.retrieval.as_ref().expect("retrieval meta");
    assert!(retrieval.top_k > 0);

    // Router decision logs were written.
    let router_logs: Vec<_> = std::fs::read_dir(temp.path().join("logs/router"))
        .map(|entries| entries.collect())
        .unwrap_or_default();
    assert!(!router_logs.is_empty());
}

#[test]
fn test_escalated_answer_lands_on_accurate_lane() {
    let temp = TempDir::new().expect("temp dir");
    let config = offline_config(temp.path());
    let paths = write_corpus(temp.path());
    ingest_both(&config, &paths);

    let engine = Engine::open(config).expect("open engine");
    let response = engine.answer(
        "keeping the boundary clean",
        &AnswerOptions {
            expected_stones: vec!["absent-stone".to_string()],
            ..AnswerOptions::default()
        },
    );

    let retrieval = response.meta.retrieval.as_ref().expect("retrieval meta");
    assert_eq!(retrieval.lane, "accurate");

    // The turn landed in the observability log with the accurate lane.
    let raw = std::fs::read_to_string(temp.path().join("logs/turns.jsonl")).expect("turn log");
    let last: serde_json::Value =
        serde_json::from_str(raw.lines().last().expect("events")).expect("event json");
    assert_eq!(last["lane"], "accurate");
    assert_eq!(last["flags"]["rag_enabled"], true);
    assert!(last["request_id"].as_str().expect("request id").len() >= 32);
}

#[test]
fn test_corrupt_lane_index_recovers_empty() {
    let temp = TempDir::new().expect("temp dir");
    let config = offline_config(temp.path());
    let paths = write_corpus(temp.path());
    ingest_both(&config, &paths);

    // Damage the fast lane's vector artefact.
    let index_path = config.index_root.join("speed/index.bin");
    let raw = std::fs::read(&index_path).expect("read index");
    std::fs::write(&index_path, &raw[..8]).expect("truncate index");

    let index = VectorIndex::open_at(
        config.index_paths(Lane::Fast),
        Box::new(HashEmbedder::new(384)),
    )
    .expect("open index");
    assert!(index.is_empty());

    // The accuracy lane is untouched.
    let accurate = VectorIndex::open_at(
        config.index_paths(Lane::Accurate),
        Box::new(HashEmbedder::new(3072)),
    )
    .expect("open accurate index");
    assert!(!accurate.is_empty());
}

#[test]
fn test_profile_overrides_flow_through_ingest() {
    let temp = TempDir::new().expect("temp dir");
    let config = offline_config(temp.path());
    let paths = write_corpus(temp.path());

    let overrides = ProfileOverrides {
        save_chunks: Some(true),
        max_tokens: Some(400),
        ..ProfileOverrides::default()
    };
    let results = pipeline::process(
        &config,
        &paths,
        &config.data_root,
        None,
        Lane::Fast,
        Some(&overrides),
    )
    .expect("ingest with overrides");
    assert!(results.iter().all(|r| r.valid));
    // The speed profile normally skips chunk files; the override turns
    // them on.
    assert!(config.data_root.join("speed/pacing.chunks.jsonl").exists());
}
