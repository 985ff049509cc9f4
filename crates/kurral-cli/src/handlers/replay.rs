use std::path::Path;

use anyhow::{bail, Context, Result};

use kurral_engine::{final_answer, ReplayEngine, ReplayOverrides};
use kurral_sdk::Client;
use kurral_types::Artifact;

use crate::args::ReplayArgs;
use crate::output;

pub fn handle(args: ReplayArgs, store_root: &Path) -> Result<()> {
    let artifact = resolve_artifact(&args, store_root)?;
    let engine = ReplayEngine::new();
    let result = engine
        .replay(&artifact, &ReplayOverrides::default())
        .context("replay failed")?;

    println!("Replay type: canonical");
    println!("Duration: {} ms", result.duration_ms);
    println!(
        "Cache: {} hits, {} misses",
        result.cache_hits, result.cache_misses
    );
    println!("Hash match: {}", output::flag(result.validation.hash_match));
    println!(
        "{}",
        output::dim(&format!(
            "Confidence: {} (does not affect replay behavior)",
            result.replay_metadata.confidence.as_str()
        ))
    );
    println!("Answer: {}", final_answer(&result.outputs));

    if args.verbose {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

fn resolve_artifact(args: &ReplayArgs, store_root: &Path) -> Result<Artifact> {
    if let Some(path) = &args.artifact {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading artifact {}", path.display()))?;
        return Ok(Artifact::from_json(&bytes)?);
    }

    let client = Client::connect(store_root)?;
    let handle = if let Some(run_id) = &args.run_id {
        client.find_run(run_id)?
    } else if args.latest {
        client.latest()?
    } else {
        bail!("pass an artifact path, --latest, or --run-id");
    };
    Ok(handle.load()?)
}
