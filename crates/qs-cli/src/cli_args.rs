use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "qs")]
#[command(about = "QuestScript runner")]
pub(crate) struct Cli {
    /// Runtime configuration file (TOML).
    #[arg(long = "config", global = true)]
    pub(crate) config: Option<PathBuf>,
    /// Debug-level logging unless RUST_LOG says otherwise.
    #[arg(long = "verbose", short = 'v', global = true)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Parse every script in a directory.
    Check(CheckArgs),
    /// Print a script in canonical form.
    Fmt(FmtArgs),
    /// Load a directory and fire events at it.
    Run(RunArgs),
    /// Load a directory and hot-reload it on change.
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    pub(crate) scripts_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub(crate) struct FmtArgs {
    pub(crate) file: PathBuf,
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    pub(crate) scripts_dir: Option<PathBuf>,
    #[arg(long = "event")]
    pub(crate) events: Vec<String>,
    /// `key=value` added to every fired event. Values are read as JSON
    /// when they parse, as plain strings otherwise.
    #[arg(long = "data")]
    pub(crate) data: Vec<String>,
    #[arg(long = "actor")]
    pub(crate) actor: Option<String>,
    /// How long to keep ticking for scheduled events.
    #[arg(long = "wait-ms", default_value_t = 5000)]
    pub(crate) wait_ms: u64,
}

#[derive(Debug, Args)]
pub(crate) struct WatchArgs {
    pub(crate) scripts_dir: Option<PathBuf>,
    #[arg(long = "monitor")]
    pub(crate) monitor: bool,
    /// Stop after this many ticks instead of running until interrupted.
    #[arg(long = "ticks")]
    pub(crate) ticks: Option<u64>,
}
