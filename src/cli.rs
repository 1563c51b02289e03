//! CLI argument parsing for opmem

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "opmem")]
#[command(version)]
#[command(about = "Per-operator memory attribution for training-run profiles", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Attribute memory events to operators and print the per-operator report
    Analyze {
        /// Profile document (call trees, memory events, operator call counts)
        #[arg(value_name = "PROFILE_JSON")]
        profile: PathBuf,

        /// Profiler configuration file (TOML)
        #[arg(short = 'c', long = "config", value_name = "TOML")]
        config: Option<PathBuf>,

        /// Emit single-line JSON instead of pretty-printed
        #[arg(long = "compact")]
        compact: bool,

        /// Include every memory record with its attributed operator
        #[arg(long = "records")]
        records: bool,

        /// Process threads one after another instead of in parallel
        #[arg(long = "sequential")]
        sequential: bool,
    },
}
