mod args;
mod handlers;
mod output;

pub use args::{AbCommands, CacheCommands, Cli, Commands, ListArgs, ProxyArgs, ReplayArgs};

use std::path::PathBuf;

use anyhow::Result;

/// Resolve the store root: flag, then environment, then the default under
/// the home directory.
fn storage_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| {
            std::env::var(kurral_runtime::config::ENV_STORAGE_PATH)
                .ok()
                .map(PathBuf::from)
        })
        .unwrap_or_else(kurral_store::LocalStore::default_root)
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let default_level = if std::env::var(kurral_runtime::config::ENV_DEBUG)
        .map(|raw| matches!(raw.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
    {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Logs go to stderr; stdout is reserved for results.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    init_logging();
    let store_root = storage_path(cli.storage_path);

    match cli.command {
        Commands::Replay(args) => handlers::replay::handle(args, &store_root),
        Commands::List(args) => handlers::list::handle(args, &store_root),
        Commands::Ab { command } => handlers::ab::handle(command),
        Commands::Proxy(args) => handlers::proxy::handle(args, &store_root),
        Commands::Cache { command } => handlers::cache::handle(command, &store_root),
    }
}
