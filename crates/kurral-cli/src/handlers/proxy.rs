use std::path::Path;

use anyhow::{bail, Context, Result};

use kurral_proxy::{serve, ProxyConfig, ProxyMode, ReplaySpeed};
use kurral_store::{ArtifactStore, LocalStore};
use kurral_types::Artifact;

use crate::args::{ModeArg, ProxyArgs, SpeedArg};

pub fn handle(args: ProxyArgs, store_root: &Path) -> Result<()> {
    let artifact = match &args.artifact {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading artifact {}", path.display()))?;
            Some(Artifact::from_json(&bytes)?)
        }
        None => None,
    };

    let mut config = match args.mode {
        ModeArg::Record => {
            let upstream = args
                .upstream
                .clone()
                .context("record mode requires --upstream")?;
            ProxyConfig::record(upstream)
        }
        ModeArg::Replay => {
            if artifact.is_none() && !args.fall_through {
                bail!("replay mode requires --artifact (or --fall-through with --upstream)");
            }
            let mut config = ProxyConfig::replay();
            config.upstream = args.upstream.clone();
            config.fall_through = args.fall_through;
            config
        }
    };
    config.replay_speed = match args.speed {
        SpeedArg::Realtime => ReplaySpeed::Realtime,
        SpeedArg::FastForward => ReplaySpeed::FastForward,
    };
    let mode = config.mode;

    let runtime = tokio::runtime::Runtime::new()?;
    let state = runtime.block_on(serve(config, args.port, artifact.as_ref()))?;

    // After shutdown, a recording session seals what it saw.
    if mode == ProxyMode::Record && state.captured_count() > 0 {
        let run_id = format!("proxy-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"));
        let sealed = state.seal_captured(&run_id, &args.tenant)?;
        let store = LocalStore::open(store_root)?;
        let uri = store.save(&sealed)?;
        println!(
            "Captured {} tool calls into {}",
            sealed.mcp_tool_calls.len(),
            uri
        );
    }
    Ok(())
}
