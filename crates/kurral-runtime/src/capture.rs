//! The capture pipeline.
//!
//! Wraps a user-supplied agent callable, records everything it does through
//! a [`CaptureHandle`], and seals the run into an artifact. Synchronous,
//! async, and streaming agents share identical semantics. If the agent
//! fails, a best-effort artifact with `error` set is still sealed and
//! persisted before the failure is handed back.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use kurral_core::cancel::CancelToken;
use kurral_core::sanitize::{sanitize_value, DEFAULT_SANITIZE_DEPTH};
use kurral_store::{ApiStore, ArtifactStore, LocalStore};
use kurral_types::{Artifact, GraphVersion, ModelConfig, OpenArtifact, ResolvedPrompt, ToolSpec};

use crate::config::Config;
use crate::enrich;
use crate::error::Result;
use crate::events::CaptureHandle;

/// Per-run capture options
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Originating run identifier; a fresh UUID string when absent.
    pub run_id: Option<String>,
    pub tenant_id: String,
    pub environment: String,
    pub semantic_buckets: Vec<String>,
    pub created_by: Option<String>,
    pub tags: BTreeMap<String, String>,
    /// Inputs snapshot, sanitized before storage.
    pub inputs: Value,
    /// Model config when known up front; the handle can override it later.
    pub model_config: Option<ModelConfig>,
    pub prompt: Option<ResolvedPrompt>,
    /// Agent graph shape for fingerprinting.
    pub graph_nodes: Vec<String>,
    pub graph_edges: Vec<(String, String)>,
    pub tools: Vec<ToolSpec>,
    /// Environment variable names to snapshot into the time environment.
    pub env_var_names: Vec<String>,
    pub cancel: CancelToken,
}

impl CaptureOptions {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            run_id: None,
            tenant_id: tenant_id.into(),
            environment: "production".to_string(),
            semantic_buckets: Vec::new(),
            created_by: None,
            tags: BTreeMap::new(),
            inputs: Value::Object(serde_json::Map::new()),
            model_config: None,
            prompt: None,
            graph_nodes: Vec::new(),
            graph_edges: Vec::new(),
            tools: Vec::new(),
            env_var_names: Vec::new(),
            cancel: CancelToken::new(),
        }
    }
}

/// What one capture produced
pub struct CaptureOutcome {
    pub artifact: Artifact,
    pub outputs: Value,
    /// The agent's failure, when it had one. The artifact is sealed and
    /// persisted either way.
    pub agent_error: Option<anyhow::Error>,
    pub storage_uri: Option<String>,
}

impl CaptureOutcome {
    /// Surface the agent's own result: its error propagates unchanged, after
    /// the artifact was already sealed and persisted.
    pub fn into_result(self) -> anyhow::Result<(Value, Artifact)> {
        match self.agent_error {
            Some(err) => Err(err),
            None => Ok((self.outputs, self.artifact)),
        }
    }
}

pub struct CapturePipeline {
    config: Config,
    local: Arc<LocalStore>,
    api: Option<Arc<ApiStore>>,
}

impl CapturePipeline {
    pub fn new(config: Config) -> Result<Self> {
        let local = Arc::new(LocalStore::open(config.storage_path.clone())?);
        let api = match (&config.api_key, config.trace_service
            || matches!(
                config.storage,
                crate::config::StorageChoice::Api | crate::config::StorageChoice::CustomBucket
            )) {
            (Some(key), true) => Some(Arc::new(ApiStore::new(config.api_url.clone(), key.clone())?)),
            _ => None,
        };
        Ok(Self { config, local, api })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }

    pub fn local_store(&self) -> Arc<LocalStore> {
        self.local.clone()
    }

    /// Capture a synchronous agent callable.
    pub fn capture<F>(&self, opts: CaptureOptions, agent: F) -> Result<CaptureOutcome>
    where
        F: FnOnce(&CaptureHandle) -> anyhow::Result<Value>,
    {
        let handle = CaptureHandle::new(opts.cancel.clone());
        let started = Instant::now();
        let result = agent(&handle);
        self.finish(opts, handle, started.elapsed().as_millis() as u64, result)
    }

    /// Capture an async agent with the same semantics as [`capture`](Self::capture).
    pub async fn capture_async<F, Fut>(&self, opts: CaptureOptions, agent: F) -> Result<CaptureOutcome>
    where
        F: FnOnce(CaptureHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        let handle = CaptureHandle::new(opts.cancel.clone());
        let started = Instant::now();
        let result = agent(handle.clone()).await;
        self.finish(opts, handle, started.elapsed().as_millis() as u64, result)
    }

    /// Capture a streaming agent: a finite, non-restartable sequence of
    /// fragments. The pipeline polls the stream, so consumer back-pressure
    /// reaches the producer naturally; outputs are assembled from the
    /// recorded fragments at seal time.
    pub async fn capture_stream<F, S>(&self, opts: CaptureOptions, agent: F) -> Result<CaptureOutcome>
    where
        F: FnOnce(CaptureHandle) -> S,
        S: Stream<Item = anyhow::Result<String>>,
    {
        let handle = CaptureHandle::new(opts.cancel.clone());
        let started = Instant::now();
        let cancel = opts.cancel.clone();

        let mut agent_error = None;
        {
            let stream = agent(handle.clone());
            futures::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                if cancel.is_cancelled() {
                    break;
                }
                match item {
                    Ok(fragment) => handle.record_fragment(&fragment),
                    Err(err) => {
                        agent_error = Some(err);
                        break;
                    }
                }
            }
        }

        let result = match agent_error {
            Some(err) => Err(err),
            None => Ok(Value::Object(serde_json::Map::new())),
        };
        self.finish(opts, handle, started.elapsed().as_millis() as u64, result)
    }

    fn finish(
        &self,
        opts: CaptureOptions,
        handle: CaptureHandle,
        duration_ms: u64,
        result: std::result::Result<Value, anyhow::Error>,
    ) -> Result<CaptureOutcome> {
        let state = handle.take_state();
        let cancelled = opts.cancel.is_cancelled();

        let mut open = OpenArtifact::new(
            opts.run_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            opts.tenant_id,
        );
        open.environment = opts.environment;
        open.semantic_buckets = opts.semantic_buckets;
        open.created_by = opts.created_by;
        open.tags = opts.tags;
        open.inputs = sanitize_value(&opts.inputs, DEFAULT_SANITIZE_DEPTH);
        open.duration_ms = duration_ms;

        open.llm_config = state
            .model_config
            .or(opts.model_config)
            .unwrap_or_else(ModelConfig::unknown);
        open.resolved_prompt = state
            .prompt
            .or(opts.prompt)
            .unwrap_or_else(|| ResolvedPrompt::from_text(""));

        if !opts.graph_nodes.is_empty() || !opts.graph_edges.is_empty() || !opts.tools.is_empty() {
            open.graph_version = Some(GraphVersion::compute(
                &opts.graph_nodes,
                &opts.graph_edges,
                &opts.tools,
            ));
        }

        open.tool_calls = state.tool_calls;
        for (fragment, ts_ms) in &state.fragments {
            open.record_stream_fragment(fragment, *ts_ms);
        }
        open.token_usage = state.token_usage.unwrap_or_default();
        open.cost_usd = state.cost_usd;

        for name in &opts.env_var_names {
            if let Ok(value) = std::env::var(name) {
                open.environment_vars.insert(name.clone(), value);
            }
        }

        let mut outputs = Value::Object(serde_json::Map::new());
        match &result {
            Ok(agent_outputs) => {
                open.outputs = agent_outputs.clone();
                outputs = agent_outputs.clone();
            }
            Err(err) => {
                open.error = Some(err.to_string());
            }
        }
        if cancelled {
            let reason = opts
                .cancel
                .reason()
                .unwrap_or_else(|| "cancelled".to_string());
            open.error = Some(reason);
        }

        let artifact = kurral_core::seal_scored(open)?;
        if let Value::Object(_) = &artifact.outputs {
            // Streaming keys merged at seal must reach the caller too.
            outputs = artifact.outputs.clone();
        }

        let storage_uri = self.persist(&artifact);

        // Enrichment only runs for clean completions; failures inside the
        // worker are logged and never surface here.
        if !cancelled && result.is_ok() {
            if let Some(api) = &self.api {
                if self.config.trace_service {
                    enrich::spawn_enrichment(
                        api.clone(),
                        self.local.clone(),
                        artifact.kurral_id,
                        artifact.run_id.clone(),
                        enrich::SETTLE_DELAY,
                        enrich::HARD_DEADLINE,
                    );
                }
            }
        }

        Ok(CaptureOutcome {
            artifact,
            outputs,
            agent_error: result.err(),
            storage_uri,
        })
    }

    /// Local save first (the durable fallback), then best-effort upload when
    /// the metadata service is configured. Upload failure is logged, never
    /// surfaced: the local copy already exists.
    fn persist(&self, artifact: &Artifact) -> Option<String> {
        let local_uri = match self.local.save(artifact) {
            Ok(uri) => Some(uri),
            Err(err) => {
                tracing::error!(error = %err, kurral_id = %artifact.kurral_id, "local artifact save failed");
                None
            }
        };

        if let Some(api) = &self.api {
            match api.save(artifact) {
                Ok(uri) => return Some(uri),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        kurral_id = %artifact.kurral_id,
                        "metadata service unreachable, keeping local copy"
                    );
                }
            }
        }
        local_uri
    }
}
