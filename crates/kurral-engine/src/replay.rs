//! Replay of sealed artifacts.
//!
//! Replay never re-invokes the model: tool calls are served from the stub
//! cache, outputs are reconstructed from the artifact, and the result is
//! validated hash-for-hash against the original. Output divergence is a
//! reported condition, never an error. The replay level gates nothing here.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use kurral_core::cache::{CacheBackend, MemoryCache, ToolStub};
use kurral_core::cancel::CancelToken;
use kurral_types::{
    canonical, reconstruct_stream, Artifact, GraphVersion, OutputStream, ReplayLevel, ToolCall,
};

use crate::answer;
use crate::diff::{compute_diff, structural_match, OutputDiff};
use crate::error::{Error, Result};

/// Requested deviations from the recorded run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ReplayOverrides {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_none()
            && self.prompt.is_none()
            && self.temperature.is_none()
            && self.model_name.is_none()
            && self.max_tokens.is_none()
    }

    /// Whether the override set invalidates the recorded answer. Sampling
    /// knobs alone do not: the recorded output stays the best available
    /// estimate and is reflected in the LLM state snapshot instead.
    fn invalidates_outputs(&self) -> bool {
        self.prompt.is_some() || self.inputs.is_some()
    }
}

/// Sampling state the replayed run would execute under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayLlmState {
    pub model_name: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl ReplayLlmState {
    fn from_artifact(artifact: &Artifact, overrides: &ReplayOverrides) -> Self {
        let config = &artifact.llm_config;
        let params = &config.parameters;
        Self {
            model_name: overrides
                .model_name
                .clone()
                .unwrap_or_else(|| config.model_name.clone()),
            provider: config.provider.clone(),
            model_version: config.model_version.clone(),
            temperature: overrides.temperature.unwrap_or(params.temperature),
            top_p: params.top_p,
            top_k: params.top_k,
            max_tokens: overrides.max_tokens.or(params.max_tokens),
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            seed: params.seed,
        }
    }
}

/// Hash and structure comparison of original vs. replayed outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayValidation {
    pub original_hash: String,
    pub replay_hash: String,
    pub hash_match: bool,
    pub structural_match: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<OutputDiff>,
}

/// Provenance of one replay execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMetadata {
    pub replay_id: Uuid,
    pub record_ref: String,
    /// Reproducibility confidence carried over from the artifact. Replay
    /// behavior is identical for every value.
    pub confidence: ReplayLevel,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

/// Everything a replay produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayResult {
    pub kurral_id: Uuid,
    #[serde(with = "kurral_types::timestamp")]
    pub replay_timestamp: DateTime<Utc>,
    pub outputs: Value,
    #[serde(rename = "match")]
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<OutputDiff>,
    pub tool_calls: Vec<ToolCall>,
    pub duration_ms: u64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<OutputStream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_version: Option<GraphVersion>,
    pub llm_state: ReplayLlmState,
    pub validation: ReplayValidation,
    pub replay_metadata: ReplayMetadata,
}

pub struct ReplayEngine {
    cache: Arc<dyn CacheBackend>,
}

impl Default for ReplayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(MemoryCache::default()),
        }
    }

    pub fn with_cache(cache: Arc<dyn CacheBackend>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &dyn CacheBackend {
        self.cache.as_ref()
    }

    pub fn replay(&self, artifact: &Artifact, overrides: &ReplayOverrides) -> Result<ReplayResult> {
        self.replay_with_cancel(artifact, overrides, &CancelToken::new())
    }

    /// Replay with a cooperative cancellation token. On cancel the engine
    /// returns a partial result: `match=false` and a diff covering whatever
    /// the original holds beyond the consumed prefix.
    pub fn replay_with_cancel(
        &self,
        artifact: &Artifact,
        overrides: &ReplayOverrides,
        cancel: &CancelToken,
    ) -> Result<ReplayResult> {
        let started = Instant::now();
        let replay_timestamp = Utc::now();

        artifact
            .validate_integrity()
            .map_err(|err| Error::ArtifactInvalid(err.to_string()))?;

        let mut cache_hits = 0;
        let mut cache_misses = 0;
        let mut tool_calls = Vec::with_capacity(artifact.tool_calls.len());
        let mut cancelled = false;

        for call in &artifact.tool_calls {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match ToolStub::from_tool_call(call) {
                Some(stub) => {
                    self.cache.prime(&call.cache_key, stub)?;
                    cache_hits += 1;
                    tool_calls.push(call.stubbed_copy());
                }
                None => {
                    cache_misses += 1;
                    tool_calls.push(call.clone());
                }
            }
        }

        let outputs = if cancelled {
            // Nothing beyond the consumed prefix is reproduced.
            Value::Object(serde_json::Map::new())
        } else if overrides.invalidates_outputs() {
            rewrite_overridden_outputs(&artifact.outputs, overrides)
        } else {
            artifact.outputs.clone()
        };

        let original_hash = canonical::canonical_hash(&artifact.outputs);
        let replay_hash = canonical::canonical_hash(&outputs);
        let hash_match = original_hash == replay_hash;
        let matched = hash_match && !cancelled;
        let diff = if matched {
            None
        } else {
            Some(compute_diff(&artifact.outputs, &outputs))
        };

        let validation = ReplayValidation {
            original_hash,
            replay_hash,
            hash_match,
            structural_match: structural_match(&artifact.outputs, &outputs),
            diff: diff.clone(),
        };

        let stream = reconstruct_stream(&outputs);

        Ok(ReplayResult {
            kurral_id: artifact.kurral_id,
            replay_timestamp,
            outputs,
            matched,
            diff,
            tool_calls,
            duration_ms: started.elapsed().as_millis() as u64,
            cache_hits,
            cache_misses,
            stream,
            graph_version: artifact.graph_version.clone(),
            llm_state: ReplayLlmState::from_artifact(artifact, overrides),
            validation,
            replay_metadata: ReplayMetadata {
                replay_id: Uuid::new_v4(),
                record_ref: artifact.run_id.clone(),
                confidence: artifact.replay_level,
                cancelled,
                cancel_reason: if cancelled { cancel.reason() } else { None },
            },
        })
    }
}

/// Outputs under a prompt or input override. The recorded answer no longer
/// applies, so the answer field becomes a deterministic unresolved marker
/// derived from the override content.
fn rewrite_overridden_outputs(original: &Value, overrides: &ReplayOverrides) -> Value {
    let override_digest = canonical::canonical_hash(&serde_json::json!({
        "prompt": overrides.prompt,
        "inputs": overrides.inputs,
    }));
    let marker = Value::String(format!("<unresolved:{}>", &override_digest[..8]));

    let key = answer::answer_key(original).unwrap_or_else(|| "result".to_string());
    let mut replayed = original.clone();
    match &mut replayed {
        Value::Object(map) => {
            map.insert(key, marker);
        }
        other => {
            *other = marker;
        }
    }
    replayed
}

/// Replay many artifacts with bounded concurrency, or one artifact
/// repeatedly to observe variance.
pub struct BatchReplayEngine {
    engine: ReplayEngine,
}

impl Default for BatchReplayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReplayEngine {
    pub fn new() -> Self {
        Self {
            engine: ReplayEngine::new(),
        }
    }

    pub fn engine(&self) -> &ReplayEngine {
        &self.engine
    }

    pub async fn replay_batch(
        &self,
        artifacts: &[Artifact],
        overrides: &ReplayOverrides,
        max_concurrent: usize,
    ) -> Vec<Result<ReplayResult>> {
        use futures::StreamExt;
        futures::stream::iter(artifacts)
            .map(|artifact| async move { self.engine.replay(artifact, overrides) })
            .buffered(max_concurrent.max(1))
            .collect()
            .await
    }

    pub async fn replay_with_sampling(
        &self,
        artifact: &Artifact,
        samples: usize,
        overrides: &ReplayOverrides,
    ) -> Vec<Result<ReplayResult>> {
        (0..samples)
            .map(|_| self.engine.replay(artifact, overrides))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurral_types::{
        DeterminismReport, EffectType, LlmParameters, ModelConfig, OpenArtifact, ResolvedPrompt,
        ToolStatus,
    };
    use serde_json::json;

    fn sealed_with_tool_call() -> Artifact {
        let now = Utc::now();
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.inputs = json!({"q": "2+3"});
        open.outputs = json!({"full_text": "5"});
        open.llm_config = ModelConfig::new("m-1", "test");
        open.llm_config.parameters = LlmParameters::deterministic(42);
        open.resolved_prompt = ResolvedPrompt::from_text("add the numbers");
        open.record_tool_call(ToolCall::new(
            "calculator",
            json!({"op": "add", "a": 2, "b": 3}),
            json!({"result": 5}),
            EffectType::Other,
            ToolStatus::Ok,
            now,
            now,
        ));
        open.seal(DeterminismReport {
            overall_score: 0.95,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_canonical_replay_matches() {
        let artifact = sealed_with_tool_call();
        let engine = ReplayEngine::new();
        let result = engine.replay(&artifact, &ReplayOverrides::default()).unwrap();

        assert!(result.matched);
        assert!(result.validation.hash_match);
        assert!(result.validation.structural_match);
        assert!(result.diff.is_none());
        assert_eq!(result.outputs, artifact.outputs);
        assert_eq!(
            canonical::canonical_json(&result.outputs),
            canonical::canonical_json(&artifact.outputs)
        );
    }

    #[test]
    fn test_tool_stubbing_counts_hits() {
        let artifact = sealed_with_tool_call();
        let engine = ReplayEngine::new();
        let result = engine.replay(&artifact, &ReplayOverrides::default()).unwrap();

        assert_eq!(result.cache_hits, 1);
        assert_eq!(result.cache_misses, 0);
        assert!(result.tool_calls[0].stubbed_in_replay);
        let cached = engine
            .cache()
            .get(&artifact.tool_calls[0].cache_key)
            .unwrap()
            .unwrap();
        assert_eq!(cached.output, json!({"result": 5}));
    }

    #[test]
    fn test_unreplayable_tool_call_is_a_miss() {
        let now = Utc::now();
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.outputs = json!({"full_text": "done"});
        open.record_tool_call(ToolCall::new(
            "ping",
            Value::Null,
            Value::Null,
            EffectType::Http,
            ToolStatus::Ok,
            now,
            now,
        ));
        let artifact = open.seal(DeterminismReport::default()).unwrap();

        let result = ReplayEngine::new()
            .replay(&artifact, &ReplayOverrides::default())
            .unwrap();
        assert_eq!(result.cache_hits, 0);
        assert_eq!(result.cache_misses, 1);
        assert!(result.matched, "a cache miss must not abort replay");
    }

    #[test]
    fn test_prompt_override_diverges() {
        let artifact = sealed_with_tool_call();
        let overrides = ReplayOverrides {
            prompt: Some("different".to_string()),
            ..Default::default()
        };
        let result = ReplayEngine::new().replay(&artifact, &overrides).unwrap();

        assert!(!result.matched);
        assert!(!result.validation.hash_match);
        let diff = result.diff.unwrap();
        assert!(!diff.modified.is_empty());
        assert!(diff.modified.contains_key("full_text"));
    }

    #[test]
    fn test_prompt_override_is_deterministic() {
        let artifact = sealed_with_tool_call();
        let overrides = ReplayOverrides {
            prompt: Some("different".to_string()),
            ..Default::default()
        };
        let engine = ReplayEngine::new();
        let a = engine.replay(&artifact, &overrides).unwrap();
        let b = engine.replay(&artifact, &overrides).unwrap();
        assert_eq!(a.outputs, b.outputs);
    }

    #[test]
    fn test_sampling_overrides_keep_outputs() {
        let artifact = sealed_with_tool_call();
        let overrides = ReplayOverrides {
            temperature: Some(0.9),
            model_name: Some("m-2".to_string()),
            ..Default::default()
        };
        let result = ReplayEngine::new().replay(&artifact, &overrides).unwrap();
        assert!(result.matched);
        assert_eq!(result.llm_state.temperature, 0.9);
        assert_eq!(result.llm_state.model_name, "m-2");
    }

    #[test]
    fn test_stream_reconstruction_from_fragments() {
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.record_stream_fragment("Hel", 1);
        open.record_stream_fragment("lo ", 2);
        open.record_stream_fragment("World", 3);
        let artifact = open.seal(DeterminismReport::default()).unwrap();

        let result = ReplayEngine::new()
            .replay(&artifact, &ReplayOverrides::default())
            .unwrap();
        let stream = result.stream.unwrap();
        assert_eq!(stream.full_text, "Hello World");
        assert_eq!(stream.stream_map.len(), 3);
        assert_eq!(
            stream.stream_map.iter().map(|e| e.offset).collect::<Vec<_>>(),
            vec![0, 3, 6]
        );
        assert_eq!(
            stream.stream_map.iter().map(|e| e.length).collect::<Vec<_>>(),
            vec![3, 3, 5]
        );
    }

    #[test]
    fn test_tampered_artifact_fails_fast() {
        let mut artifact = sealed_with_tool_call();
        artifact.tool_calls[0].input = json!({"op": "mul"});
        let result = ReplayEngine::new().replay(&artifact, &ReplayOverrides::default());
        assert!(matches!(result, Err(Error::ArtifactInvalid(_))));
    }

    #[test]
    fn test_cancelled_replay_is_partial() {
        let artifact = sealed_with_tool_call();
        let cancel = CancelToken::new();
        cancel.cancel("shutdown");
        let result = ReplayEngine::new()
            .replay_with_cancel(&artifact, &ReplayOverrides::default(), &cancel)
            .unwrap();

        assert!(!result.matched);
        assert!(result.replay_metadata.cancelled);
        assert_eq!(result.replay_metadata.cancel_reason.as_deref(), Some("shutdown"));
        let diff = result.diff.unwrap();
        assert!(diff.removed.contains_key("full_text"));
    }

    #[test]
    fn test_confidence_carried_not_gating() {
        // A class-C artifact replays exactly like a class-A one.
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.outputs = json!({"full_text": "hi"});
        let artifact = open
            .seal(DeterminismReport {
                overall_score: 0.1,
                ..Default::default()
            })
            .unwrap();
        let result = ReplayEngine::new()
            .replay(&artifact, &ReplayOverrides::default())
            .unwrap();
        assert_eq!(result.replay_metadata.confidence, ReplayLevel::C);
        assert!(result.matched);
    }

    #[tokio::test]
    async fn test_batch_replay_preserves_order() {
        let artifacts: Vec<Artifact> = (0..5)
            .map(|i| {
                let mut open = OpenArtifact::new(format!("run-{}", i), "tenant-1");
                open.outputs = json!({"full_text": format!("answer {}", i)});
                open.seal(DeterminismReport::default()).unwrap()
            })
            .collect();

        let batch = BatchReplayEngine::new();
        let results = batch
            .replay_batch(&artifacts, &ReplayOverrides::default(), 3)
            .await;
        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            let result = result.as_ref().unwrap();
            assert_eq!(result.kurral_id, artifacts[i].kurral_id);
            assert!(result.matched);
        }
    }
}
