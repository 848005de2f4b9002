//! Binary entry point for duolane.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::Context as _;
use clap::Parser;
use duolane::cli::{Cli, OutputFormat, execute};
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let format = OutputFormat::parse(&cli.format);

    match run(&cli) {
        Ok(output) => {
            if !output.is_empty() {
                // Handle broken pipe gracefully (e.g. when piped to `head`)
                if let Err(e) = write!(io::stdout(), "{output}")
                    && e.kind() != io::ErrorKind::BrokenPipe
                {
                    eprintln!("Error writing to stdout: {e}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
                }
                OutputFormat::Text => {
                    eprintln!("Error: {e:#}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

/// Top-level fallible path. Library errors stay typed
/// ([`duolane::Error`]); the binary wraps them in `anyhow` for chained
/// display.
fn run(cli: &Cli) -> anyhow::Result<String> {
    execute(cli).with_context(|| format!("duolane {} failed", command_name(cli)))
}

fn command_name(cli: &Cli) -> &'static str {
    use duolane::cli::Commands;
    match cli.command {
        Commands::Ingest { .. } => "ingest",
        Commands::Search { .. } => "search",
        Commands::Hybrid { .. } => "hybrid",
        Commands::Route { .. } => "route",
        Commands::Answer { .. } => "answer",
        Commands::Stats => "stats",
        Commands::Clear { .. } => "clear",
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
