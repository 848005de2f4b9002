//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// duolane: dual-lane retrieval over structured protocol documents.
///
/// Ingests protocol JSON into per-lane vector indices and serves routed,
/// reranked, and fused retrieval over them.
#[derive(Parser, Debug)]
#[command(name = "duolane")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory of the per-lane indices.
    #[arg(long, env = "DUOLANE_INDEX_ROOT")]
    pub index_root: Option<PathBuf>,

    /// Directory of protocol JSON files, used to build the router
    /// catalog for routed queries.
    #[arg(long, env = "DUOLANE_PROTOCOLS")]
    pub protocols: Option<PathBuf>,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest protocol files into a lane index.
    Ingest {
        /// Protocol JSON files to process.
        paths: Vec<PathBuf>,

        /// Ingest profile (speed, accuracy).
        #[arg(short, long, default_value = "accuracy")]
        profile: String,

        /// Run both profiles over the same files.
        #[arg(long)]
        both: bool,

        /// Directory for per-chunk JSONL output.
        #[arg(short, long, default_value = "data")]
        output_dir: PathBuf,

        /// JSON schema for validation.
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Override the chunk token cap.
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Override the overlap token budget.
        #[arg(long)]
        overlap_tokens: Option<usize>,

        /// Persist corrected protocol ids back to the source files.
        #[arg(long)]
        persist_ids: bool,
    },

    /// Search one lane.
    Search {
        /// The query.
        query: String,

        /// Number of results.
        #[arg(short, default_value = "5")]
        k: usize,

        /// Lane to search (fast, accurate).
        #[arg(short, long)]
        lane: Option<String>,

        /// Skip router scoping.
        #[arg(long)]
        no_router: bool,

        /// Restrict to one protocol.
        #[arg(long)]
        protocol: Option<String>,

        /// Restrict to one section name.
        #[arg(long)]
        section: Option<String>,

        /// Restrict to chunks tagged with any of these stones.
        #[arg(long)]
        stone: Vec<String>,
    },

    /// Search both lanes and fuse the results.
    Hybrid {
        /// The query.
        query: String,

        /// Number of results.
        #[arg(short, default_value = "5")]
        k: usize,

        /// RRF k parameter.
        #[arg(long, default_value = "60")]
        k_rrf: u32,

        /// Weighted blend instead of RRF, as "speed,accuracy" weights
        /// (e.g. "0.35,0.65").
        #[arg(long)]
        blend: Option<String>,
    },

    /// Route a query to candidate protocols.
    Route {
        /// The query.
        query: String,
    },

    /// Run the guarded answer path.
    Answer {
        /// The query.
        query: String,

        /// Lane to answer from (fast, accurate).
        #[arg(short, long)]
        lane: Option<String>,

        /// Caller-declared intent (e.g. "decision").
        #[arg(long)]
        intent: Option<String>,

        /// Stones the answer should align with.
        #[arg(long)]
        stone: Vec<String>,
    },

    /// Show index statistics for both lanes.
    Stats,

    /// Clear a lane index.
    Clear {
        /// Lane to clear (fast, accurate).
        #[arg(short, long)]
        lane: String,

        /// Skip confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
}
