use anyhow::{Context, Result};
use clap::Parser;
use opmem::cli::{Cli, Command};
use opmem::config::ProfilerConfig;
use opmem::input::ProfileDocument;
use opmem::json_output::JsonOutput;
use opmem::profile::MemoryProfiler;
use opmem::recommendation::generate_recommendations;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<ProfilerConfig> {
    match path {
        Some(path) => ProfilerConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(ProfilerConfig::default()),
    }
}

/// Run attribution over a profile document and print the JSON report
fn run_analyze(
    profile_path: &Path,
    config: ProfilerConfig,
    compact: bool,
    include_records: bool,
) -> Result<()> {
    let document = ProfileDocument::from_path(profile_path)
        .with_context(|| format!("Failed to load profile: {}", profile_path.display()))?;

    let trees = document.call_trees()?;
    let calls = document.call_counts();
    tracing::debug!(
        "loaded {} call trees and {} memory events",
        trees.len(),
        document.memory_events.len()
    );

    let profiler = MemoryProfiler::new(config);
    let profile = profiler.analyze(trees, document.memory_events, &calls)?;

    let recommendations = document
        .summary
        .as_ref()
        .map(|summary| generate_recommendations(summary, &profiler.config().recommendation))
        .unwrap_or_default();

    let mut output = JsonOutput::new(&profile, recommendations);
    if include_records {
        output = output.with_records(&profile);
    }

    println!("{}", output.to_json(!compact)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    match args.command {
        Command::Analyze {
            profile,
            config,
            compact,
            records,
            sequential,
        } => {
            let mut config = load_config(config.as_deref())?;
            if sequential {
                config.parallel = false;
            }
            run_analyze(&profile, config, compact, records)
        }
    }
}
