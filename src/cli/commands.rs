//! CLI command execution.

use std::path::PathBuf;

use crate::cli::parser::{Cli, Commands};
use crate::config::Config;
use crate::core::Lane;
use crate::engine::{AnswerOptions, Engine, Fusion, load_protocols};
use crate::error::{Error, Result};
use crate::index::SearchFilters;
use crate::pipeline::{self, ProfileOverrides};

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name, defaulting to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Executes a parsed CLI invocation, returning the rendered output.
pub fn execute(cli: &Cli) -> Result<String> {
    let mut config = Config::from_env();
    if let Some(index_root) = &cli.index_root {
        config.index_root.clone_from(index_root);
    }
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Ingest {
            paths,
            profile,
            both,
            output_dir,
            schema,
            max_tokens,
            overlap_tokens,
            persist_ids,
        } => {
            if paths.is_empty() {
                return Err(Error::Config {
                    message: "no input files given".to_string(),
                });
            }
            let overrides = ProfileOverrides {
                max_tokens: *max_tokens,
                overlap_tokens: *overlap_tokens,
                persist_corrected_id: Some(*persist_ids),
                ..ProfileOverrides::default()
            };

            let results = if *both {
                let report = pipeline::process_both(&config, paths, output_dir, schema.as_deref());
                let mut all = report.speed;
                all.extend(report.accuracy);
                all
            } else {
                let lane = parse_lane(profile)?;
                pipeline::process(
                    &config,
                    paths,
                    output_dir,
                    schema.as_deref(),
                    lane,
                    Some(&overrides),
                )?
            };

            match format {
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&results)?),
                OutputFormat::Text => {
                    let mut out = String::new();
                    for result in &results {
                        if result.valid {
                            out.push_str(&format!(
                                "ok   {} ({} chunks)\n",
                                result.protocol_id, result.chunks_created
                            ));
                        } else {
                            out.push_str(&format!(
                                "FAIL {}: {}\n",
                                result.file_path,
                                result.error_message.as_deref().unwrap_or("unknown error")
                            ));
                        }
                    }
                    Ok(out)
                }
            }
        }

        Commands::Search {
            query,
            k,
            lane,
            no_router,
            protocol,
            section,
            stone,
        } => {
            let engine = open_engine(&config, cli.protocols.as_ref(), !*no_router)?;
            let lane = lane.as_deref().map(parse_lane).transpose()?;
            let filters = build_filters(protocol, section, stone);
            let results = engine.search(query, *k, lane, filters.as_ref(), !*no_router)?;
            render_results(&results, format)
        }

        Commands::Hybrid { query, k, k_rrf, blend } => {
            let engine = open_engine(&config, cli.protocols.as_ref(), true)?;
            let fusion = match blend {
                Some(spec) => Fusion::Blend {
                    weights: parse_blend(spec)?,
                },
                None => Fusion::Rrf { k_rrf: *k_rrf },
            };
            let results = engine.hybrid_search(query, *k, fusion, None)?;
            render_results(&results, format)
        }

        Commands::Route { query } => {
            let engine = open_engine(&config, cli.protocols.as_ref(), true)?;
            let decision = engine.route(query)?;
            match format {
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&decision)?),
                OutputFormat::Text => {
                    let mut out = format!(
                        "route: {} (confidence {:.3})\n",
                        decision.route.as_str(),
                        decision.confidence
                    );
                    for candidate in &decision.candidates {
                        out.push_str(&format!(
                            "  {} {:.3} {}\n",
                            candidate.protocol_id, candidate.score, candidate.title
                        ));
                    }
                    Ok(out)
                }
            }
        }

        Commands::Answer { query, lane, intent, stone } => {
            let engine = open_engine(&config, cli.protocols.as_ref(), true)?;
            let opts = AnswerOptions {
                lane: lane.as_deref().map(parse_lane).transpose()?,
                user_intent: intent.clone(),
                expected_stones: stone.clone(),
                ..AnswerOptions::default()
            };
            let response = engine.answer(query, &opts);
            match format {
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&response)?),
                OutputFormat::Text => {
                    let mut out = response.text.clone();
                    out.push('\n');
                    if let Some(retrieval) = &response.meta.retrieval {
                        out.push_str(&format!(
                            "[lane={} top_k={} docs={}]\n",
                            retrieval.lane,
                            retrieval.top_k,
                            retrieval.used_doc_ids.join(",")
                        ));
                    }
                    if let Some(fallback) = &response.meta.fallback {
                        out.push_str(&format!("[fallback={fallback}]\n"));
                    }
                    Ok(out)
                }
            }
        }

        Commands::Stats => {
            let engine = open_engine(&config, None, false)?;
            let stats = serde_json::json!({
                "fast": engine.index(Lane::Fast).stats(),
                "accurate": engine.index(Lane::Accurate).stats(),
            });
            Ok(serde_json::to_string_pretty(&stats)?)
        }

        Commands::Clear { lane, yes } => {
            if !*yes {
                return Err(Error::Config {
                    message: "pass --yes to confirm clearing the index".to_string(),
                });
            }
            let lane = parse_lane(lane)?;
            let paths = config.index_paths(lane);
            let embedder = crate::embedding::create_embedder(
                config.lane_models(lane).embed.as_deref(),
                lane,
            );
            let mut index = crate::index::VectorIndex::open_at(paths, embedder)?;
            index.clear();
            index.save()?;
            Ok(format!("cleared {lane} lane\n"))
        }
    }
}

fn open_engine(
    config: &Config,
    protocols_dir: Option<&PathBuf>,
    build_catalog: bool,
) -> Result<Engine> {
    let mut engine = Engine::open(config.clone())?;
    if build_catalog {
        if let Some(dir) = protocols_dir {
            let protocols = load_protocols(dir)?;
            engine.build_catalog(&protocols)?;
        }
    }
    Ok(engine)
}

fn parse_lane(name: &str) -> Result<Lane> {
    Lane::parse(name).ok_or_else(|| Error::Config {
        message: format!("unknown lane: {name} (expected fast/speed or accurate/accuracy)"),
    })
}

fn build_filters(
    protocol: &Option<String>,
    section: &Option<String>,
    stones: &[String],
) -> Option<SearchFilters> {
    let filters = SearchFilters {
        protocol_id: protocol.clone(),
        section_name: section.clone(),
        stones: if stones.is_empty() {
            None
        } else {
            Some(stones.to_vec())
        },
    };
    if filters.is_empty() { None } else { Some(filters) }
}

fn parse_blend(spec: &str) -> Result<(f32, f32)> {
    let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
    if parts.len() != 2 {
        return Err(Error::Config {
            message: format!("blend must be \"speed,accuracy\" weights, got: {spec}"),
        });
    }
    let speed = parts[0].parse().map_err(|_| Error::Config {
        message: format!("invalid blend weight: {}", parts[0]),
    })?;
    let accuracy = parts[1].parse().map_err(|_| Error::Config {
        message: format!("invalid blend weight: {}", parts[1]),
    })?;
    Ok((speed, accuracy))
}

fn render_results(
    results: &[crate::core::SearchResult],
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(results)?),
        OutputFormat::Text => {
            let mut out = String::new();
            for (rank, result) in results.iter().enumerate() {
                out.push_str(&format!(
                    "{:2}. {:.4} {} [{}] {}\n",
                    rank + 1,
                    result.score,
                    result.metadata.chunk_id,
                    result.metadata.section_name,
                    result.text_preview.replace('\n', " "),
                ));
            }
            if out.is_empty() {
                out.push_str("no results\n");
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("anything"), OutputFormat::Text);
    }

    #[test]
    fn test_parse_blend() {
        assert_eq!(parse_blend("0.35,0.65").unwrap(), (0.35, 0.65));
        assert_eq!(parse_blend("0.4, 0.6").unwrap(), (0.4, 0.6));
        assert!(parse_blend("0.35").is_err());
        assert!(parse_blend("a,b").is_err());
    }

    #[test]
    fn test_parse_lane_names() {
        assert_eq!(parse_lane("fast").unwrap(), Lane::Fast);
        assert_eq!(parse_lane("accuracy").unwrap(), Lane::Accurate);
        assert!(parse_lane("warp").is_err());
    }

    #[test]
    fn test_build_filters_empty() {
        assert!(build_filters(&None, &None, &[]).is_none());
        let filters = build_filters(&Some("p".to_string()), &None, &[]).unwrap();
        assert_eq!(filters.protocol_id.as_deref(), Some("p"));
    }
}
