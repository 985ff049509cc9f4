//! Background enrichment from the external trace service.
//!
//! After a capture is sealed and persisted, a worker thread waits for the
//! service to index the run, fetches its view, merges it into the local
//! artifact in memory, and rewrites the file once, atomically. Readers see
//! either the pre- or post-enrichment artifact, never a torn state. Worker
//! failures are logged and never propagate to the agent's caller.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use uuid::Uuid;

use kurral_store::{ArtifactStore, LocalStore};
use kurral_types::Artifact;

/// Fixed delay before the first fetch, giving the service time to index.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Hard deadline for the whole enrichment attempt.
pub const HARD_DEADLINE: Duration = Duration::from_secs(30);

const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Spawn the enrichment worker. Returns the join handle for tests; callers
/// in the capture path drop it and let the thread finish on its own.
pub fn spawn_enrichment(
    service: Arc<dyn ArtifactStore>,
    local: Arc<LocalStore>,
    artifact_id: Uuid,
    run_id: String,
    settle: Duration,
    deadline: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let started = Instant::now();
        thread::sleep(settle);

        loop {
            match try_enrich(service.as_ref(), &local, &artifact_id, &run_id) {
                Ok(true) => {
                    tracing::info!(%artifact_id, %run_id, "artifact enriched from trace service");
                    return;
                }
                Ok(false) => {
                    if started.elapsed() >= deadline {
                        tracing::warn!(%artifact_id, %run_id, "enrichment deadline passed, trace service never indexed the run");
                        return;
                    }
                    thread::sleep(RETRY_INTERVAL.min(deadline));
                }
                Err(err) => {
                    tracing::warn!(%artifact_id, %run_id, error = %err, "enrichment failed");
                    return;
                }
            }
        }
    })
}

fn try_enrich(
    service: &dyn ArtifactStore,
    local: &LocalStore,
    artifact_id: &Uuid,
    run_id: &str,
) -> kurral_store::Result<bool> {
    let Some(record) = service.find_by_run_id(run_id)? else {
        return Ok(false);
    };
    let remote = service.load(&record.kurral_id)?;
    let local_artifact = local.load(artifact_id)?;
    let merged = merge_artifacts(local_artifact, &remote);
    local.save(&merged)?;
    Ok(true)
}

/// Fill gaps in the locally captured artifact from the service's view.
/// Local observations always win; the remote only supplies what capture
/// could not see. Identity fields (`kurral_id`, `created_at`, `run_id`)
/// never change.
pub fn merge_artifacts(mut local: Artifact, remote: &Artifact) -> Artifact {
    if local.token_usage == Default::default() {
        local.token_usage = remote.token_usage.clone();
    }
    if local.cost_usd.is_none() {
        local.cost_usd = remote.cost_usd;
    }
    if local.llm_config.model_name == "unknown" && remote.llm_config.model_name != "unknown" {
        local.llm_config = remote.llm_config.clone();
    }
    if local.graph_version.is_none() {
        local.graph_version = remote.graph_version.clone();
    }

    let known: std::collections::BTreeSet<&str> = local
        .tool_calls
        .iter()
        .map(|call| call.cache_key.as_str())
        .collect();
    let mut extra: Vec<_> = remote
        .tool_calls
        .iter()
        .filter(|call| !known.contains(call.cache_key.as_str()))
        .cloned()
        .collect();
    if !extra.is_empty() {
        local.tool_calls.append(&mut extra);
        local
            .tool_calls
            .sort_by(|a, b| a.started_at.cmp(&b.started_at));
    }

    for (key, value) in &remote.tags {
        local
            .tags
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    local
}
