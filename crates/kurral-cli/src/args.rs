use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "kurral")]
#[command(about = "Capture, replay, and regression-test agent execution traces", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Artifact store root (defaults to ~/.kurral/artifacts or KURRAL_STORAGE_PATH)
    #[arg(long, global = true)]
    pub storage_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a stored artifact without re-invoking the model
    Replay(ReplayArgs),

    /// List stored artifacts, newest first
    List(ListArgs),

    /// Compare agent versions over a baseline artifact directory
    Ab {
        #[command(subcommand)]
        command: AbCommands,
    },

    /// Run the MCP record/replay proxy
    Proxy(ProxyArgs),

    /// Inspect or clear the persistent tool-stub cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Path to a .kurral artifact file
    pub artifact: Option<PathBuf>,

    /// Replay the most recently captured artifact
    #[arg(long)]
    pub latest: bool,

    /// Replay the artifact recorded for this run id
    #[arg(long)]
    pub run_id: Option<String>,

    /// Print the full replay result as JSON
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Maximum number of artifacts to show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Only show artifacts tagged with this semantic bucket
    #[arg(long)]
    pub bucket: Option<String>,
}

#[derive(Subcommand)]
pub enum AbCommands {
    /// Replay a baseline suite under two model labels and compare with ARS
    ModelMigration {
        /// Directory of baseline .kurral artifacts
        #[arg(long)]
        baseline: PathBuf,

        #[arg(long)]
        model_a: String,

        #[arg(long)]
        model_b: String,

        /// Minimum mean ARS for the candidate to pass
        #[arg(long, default_value_t = 0.90)]
        threshold: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Record,
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SpeedArg {
    Realtime,
    FastForward,
}

#[derive(Args)]
pub struct ProxyArgs {
    #[arg(long, value_enum)]
    pub mode: ModeArg,

    /// Upstream MCP server URL (required in record mode)
    #[arg(long)]
    pub upstream: Option<String>,

    #[arg(long, default_value_t = 3100)]
    pub port: u16,

    /// Artifact file answering replay-mode requests
    #[arg(long)]
    pub artifact: Option<PathBuf>,

    /// In replay mode, forward cache misses to the upstream
    #[arg(long)]
    pub fall_through: bool,

    /// Pacing of replayed SSE streams
    #[arg(long, value_enum, default_value = "fast-forward")]
    pub speed: SpeedArg,

    /// Tenant recorded on the sealed capture artifact
    #[arg(long, default_value = "local")]
    pub tenant: String,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show entry counts
    Stats,
    /// Drop every cached tool stub
    Clear,
}
