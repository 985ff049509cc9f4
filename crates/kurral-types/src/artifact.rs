use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::canonical;
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::graph::GraphVersion;
use crate::mcp::CapturedMcpCall;
use crate::prompt::ResolvedPrompt;
use crate::report::{DeterminismReport, ReplayLevel};
use crate::stream;
use crate::tool::ToolCall;
use crate::usage::TokenUsage;

/// Current artifact schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Highest schema major this reader accepts.
pub const SCHEMA_MAJOR: u64 = 1;

/// Wall-clock context captured alongside the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEnvironment {
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Utc>,
    pub timezone: String,
    pub wall_clock_time: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_vars: BTreeMap<String, String>,
}

impl TimeEnvironment {
    pub fn capture(at: DateTime<Utc>, environment_vars: BTreeMap<String, String>) -> Self {
        Self {
            timestamp: at,
            timezone: "UTC".to_string(),
            wall_clock_time: at.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            environment_vars,
        }
    }
}

/// Immutable record of one agent execution, sufficient to replay it.
///
/// Produced by sealing an [`OpenArtifact`]; read-only from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kurral_id: Uuid,
    pub run_id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub semantic_buckets: Vec<String>,
    pub environment: String,
    pub schema_version: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub deterministic: bool,
    #[serde(default, skip_serializing_if = "ReplayLevel::is_unset")]
    pub replay_level: ReplayLevel,
    pub determinism_report: DeterminismReport,
    pub inputs: Value,
    pub outputs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub llm_config: ModelConfig,
    pub resolved_prompt: ResolvedPrompt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_version: Option<GraphVersion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp_tool_calls: Vec<CapturedMcpCall>,
    pub time_env: TimeEnvironment,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Parse the major component out of a `MAJOR.MINOR.PATCH` version string.
pub fn schema_major(version: &str) -> Option<u64> {
    version.split('.').next()?.parse().ok()
}

impl Artifact {
    /// Canonical serialization: the form that is hashed and stored on disk.
    pub fn to_canonical_json(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(canonical::canonical_json(&value))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Strict deserialization. Refuses artifacts whose schema major is newer
    /// than [`SCHEMA_MAJOR`]; unknown fields from a newer minor are ignored.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|err| Error::ArtifactInvalid(format!("not valid JSON: {}", err)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let version = value
            .get("schema_version")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ArtifactInvalid("missing schema_version".to_string()))?;
        let major = schema_major(version).ok_or_else(|| {
            Error::ArtifactInvalid(format!("malformed schema_version {:?}", version))
        })?;
        if major > SCHEMA_MAJOR {
            return Err(Error::UnsupportedSchema {
                found: version.to_string(),
                supported: SCHEMA_MAJOR,
            });
        }
        serde_json::from_value(value).map_err(|err| Error::ArtifactInvalid(err.to_string()))
    }

    /// SHA-256 over the canonical JSON of the outputs payload.
    pub fn outputs_hash(&self) -> String {
        canonical::canonical_hash(&self.outputs)
    }

    /// Re-check the content-addressed invariants of a stored artifact:
    /// cache keys derive from `(tool_name, input)`, output hashes match the
    /// recorded outputs, the stream map covers the full text, and the
    /// determinism score is in range.
    pub fn validate_integrity(&self) -> Result<()> {
        for call in &self.tool_calls {
            let expected_key = ToolCall::cache_key_for(&call.tool_name, &call.input);
            if call.cache_key != expected_key {
                return Err(Error::ArtifactInvalid(format!(
                    "tool call {:?} cache_key does not derive from its input",
                    call.tool_name
                )));
            }
            if !call.output.is_null() {
                let expected_hash = canonical::canonical_hash(&call.output);
                if let Some(stored) = &call.output_hash {
                    if *stored != expected_hash {
                        return Err(Error::ArtifactInvalid(format!(
                            "tool call {:?} output_hash does not match its output",
                            call.tool_name
                        )));
                    }
                }
            }
        }
        stream::validate_stream_map(&self.outputs)
            .map_err(|err| Error::ArtifactInvalid(err.to_string()))?;
        let score = self.determinism_report.overall_score;
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::ArtifactInvalid(format!(
                "determinism score {} out of range",
                score
            )));
        }
        Ok(())
    }
}

/// Artifact under construction during capture. Mutable until sealed.
#[derive(Debug, Clone)]
pub struct OpenArtifact {
    pub run_id: String,
    pub tenant_id: String,
    pub semantic_buckets: Vec<String>,
    pub environment: String,
    pub created_by: Option<String>,
    pub inputs: Value,
    pub outputs: Value,
    pub error: Option<String>,
    pub llm_config: ModelConfig,
    pub resolved_prompt: ResolvedPrompt,
    pub graph_version: Option<GraphVersion>,
    pub tool_calls: Vec<ToolCall>,
    pub mcp_tool_calls: Vec<CapturedMcpCall>,
    pub environment_vars: BTreeMap<String, String>,
    pub duration_ms: u64,
    pub cost_usd: Option<f64>,
    pub token_usage: TokenUsage,
    pub tags: BTreeMap<String, String>,
    fragments: Vec<(String, u64)>,
}

impl OpenArtifact {
    pub fn new(run_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            tenant_id: tenant_id.into(),
            semantic_buckets: Vec::new(),
            environment: "production".to_string(),
            created_by: None,
            inputs: Value::Object(Map::new()),
            outputs: Value::Object(Map::new()),
            error: None,
            llm_config: ModelConfig::unknown(),
            resolved_prompt: ResolvedPrompt::from_text(""),
            graph_version: None,
            tool_calls: Vec::new(),
            mcp_tool_calls: Vec::new(),
            environment_vars: BTreeMap::new(),
            duration_ms: 0,
            cost_usd: None,
            token_usage: TokenUsage::default(),
            tags: BTreeMap::new(),
            fragments: Vec::new(),
        }
    }

    /// Append a tool call in observation order.
    pub fn record_tool_call(&mut self, call: ToolCall) {
        self.tool_calls.push(call);
    }

    /// Append a streamed output fragment with its relative timestamp.
    /// Empty fragments are dropped: the stream map requires strictly
    /// increasing offsets.
    pub fn record_stream_fragment(&mut self, fragment: &str, ts_ms: u64) {
        if fragment.is_empty() {
            return;
        }
        self.fragments.push((fragment.to_string(), ts_ms));
    }

    pub fn has_stream_fragments(&self) -> bool {
        !self.fragments.is_empty()
    }

    /// Seal into an immutable [`Artifact`].
    ///
    /// Computes derived hashes, merges the stream map into outputs, orders
    /// tool calls by start timestamp (stable), applies the determinism
    /// report, and checks the sealing invariants.
    pub fn seal(mut self, report: DeterminismReport) -> Result<Artifact> {
        let score = report.overall_score;
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::InvariantViolation(format!(
                "determinism score {} out of range",
                score
            )));
        }

        if !self.fragments.is_empty() {
            let stream_outputs = stream::build_stream_outputs(&self.fragments);
            match &mut self.outputs {
                Value::Object(map) => {
                    if let Value::Object(stream_map) = stream_outputs {
                        for (key, value) in stream_map {
                            map.insert(key, value);
                        }
                    }
                }
                other => {
                    // Non-object agent output moves under "result" so the
                    // streaming keys have somewhere to live.
                    let mut map = Map::new();
                    if !other.is_null() {
                        map.insert("result".to_string(), other.clone());
                    }
                    if let Value::Object(stream_map) = stream_outputs {
                        for (key, value) in stream_map {
                            map.insert(key, value);
                        }
                    }
                    self.outputs = Value::Object(map);
                }
            }
        }

        self.resolved_prompt.compute_hashes();

        self.tool_calls
            .sort_by(|a, b| a.started_at.cmp(&b.started_at));
        for call in &mut self.tool_calls {
            let expected_key = ToolCall::cache_key_for(&call.tool_name, &call.input);
            if call.cache_key.is_empty() {
                call.cache_key = expected_key;
            } else if call.cache_key != expected_key {
                return Err(Error::InvariantViolation(format!(
                    "tool call {:?} cache_key does not derive from its input",
                    call.tool_name
                )));
            }
            if !call.output.is_null() {
                let expected_hash = canonical::canonical_hash(&call.output);
                match &call.output_hash {
                    None => call.output_hash = Some(expected_hash),
                    Some(stored) if *stored != expected_hash => {
                        return Err(Error::InvariantViolation(format!(
                            "tool call {:?} output_hash does not match its output",
                            call.tool_name
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        stream::validate_stream_map(&self.outputs)?;

        let created_at = Utc::now();
        Ok(Artifact {
            kurral_id: Uuid::new_v4(),
            run_id: self.run_id,
            tenant_id: self.tenant_id,
            semantic_buckets: self.semantic_buckets,
            environment: self.environment,
            schema_version: SCHEMA_VERSION.to_string(),
            created_at,
            created_by: self.created_by,
            deterministic: score >= 0.90,
            replay_level: ReplayLevel::from_score(score),
            determinism_report: report,
            inputs: self.inputs,
            outputs: self.outputs,
            error: self.error,
            llm_config: self.llm_config,
            resolved_prompt: self.resolved_prompt,
            graph_version: self.graph_version,
            tool_calls: self.tool_calls,
            mcp_tool_calls: self.mcp_tool_calls,
            time_env: TimeEnvironment::capture(created_at, self.environment_vars),
            duration_ms: self.duration_ms,
            cost_usd: self.cost_usd,
            token_usage: self.token_usage,
            tags: self.tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sealed_minimal() -> Artifact {
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.inputs = json!({"q": "hello"});
        open.outputs = json!({"full_text": "hi"});
        open.seal(DeterminismReport {
            overall_score: 0.95,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_seal_assigns_level_and_flag() {
        let artifact = sealed_minimal();
        assert_eq!(artifact.replay_level, ReplayLevel::A);
        assert!(artifact.deterministic);
        assert_eq!(artifact.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_seal_rejects_out_of_range_score() {
        let open = OpenArtifact::new("run-1", "tenant-1");
        let result = open.seal(DeterminismReport {
            overall_score: 1.2,
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_seal_computes_prompt_hashes() {
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.resolved_prompt = ResolvedPrompt::from_text("what is 2+2?");
        let artifact = open.seal(DeterminismReport::default()).unwrap();
        assert!(artifact.resolved_prompt.template_hash.is_some());
        assert!(artifact.resolved_prompt.final_text_hash.is_some());
        assert!(artifact.resolved_prompt.variables_hash.is_some());
    }

    #[test]
    fn test_seal_merges_stream_fragments_into_outputs() {
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.record_stream_fragment("Hel", 5);
        open.record_stream_fragment("lo ", 12);
        open.record_stream_fragment("World", 30);
        let artifact = open.seal(DeterminismReport::default()).unwrap();
        assert_eq!(artifact.outputs["full_text"], "Hello World");
        let map = artifact.outputs["stream_map"].as_array().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map[1]["offset"], 3);
        assert_eq!(map[2]["length"], 5);
    }

    #[test]
    fn test_seal_orders_tool_calls_by_start() {
        use crate::tool::{EffectType, ToolStatus};
        use chrono::TimeZone;

        let early = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 5).unwrap();
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.record_tool_call(ToolCall::new(
            "second",
            json!({}),
            json!(2),
            EffectType::Other,
            ToolStatus::Ok,
            late,
            late,
        ));
        open.record_tool_call(ToolCall::new(
            "first",
            json!({}),
            json!(1),
            EffectType::Other,
            ToolStatus::Ok,
            early,
            early,
        ));
        let artifact = open.seal(DeterminismReport::default()).unwrap();
        assert_eq!(artifact.tool_calls[0].tool_name, "first");
        assert_eq!(artifact.tool_calls[1].tool_name, "second");
    }

    #[test]
    fn test_seal_rejects_tampered_cache_key() {
        use crate::tool::{EffectType, ToolStatus};

        let now = Utc::now();
        let mut call = ToolCall::new(
            "calculator",
            json!({"op": "add"}),
            json!(5),
            EffectType::Other,
            ToolStatus::Ok,
            now,
            now,
        );
        call.cache_key = "not-a-derived-key".to_string();
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.record_tool_call(call);
        assert!(matches!(
            open.seal(DeterminismReport::default()),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_roundtrip_canonical_json() {
        let artifact = sealed_minimal();
        let json = artifact.to_canonical_json().unwrap();
        let back = Artifact::from_json(json.as_bytes()).unwrap();
        assert_eq!(back, artifact);
    }

    #[test]
    fn test_refuses_newer_major() {
        let artifact = sealed_minimal();
        let mut value = serde_json::to_value(&artifact).unwrap();
        value["schema_version"] = json!("2.0.0");
        let result = Artifact::from_value(value);
        assert!(matches!(result, Err(Error::UnsupportedSchema { .. })));
    }

    #[test]
    fn test_tolerates_unknown_fields_same_major() {
        let artifact = sealed_minimal();
        let mut value = serde_json::to_value(&artifact).unwrap();
        value["schema_version"] = json!("1.4.0");
        value["future_field"] = json!({"x": 1});
        assert!(Artifact::from_value(value).is_ok());
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let artifact = sealed_minimal();
        let mut value = serde_json::to_value(&artifact).unwrap();
        value.as_object_mut().unwrap().remove("run_id");
        assert!(matches!(
            Artifact::from_value(value),
            Err(Error::ArtifactInvalid(_))
        ));
    }

    #[test]
    fn test_canonical_serialization_is_sorted_and_compact() {
        let artifact = sealed_minimal();
        let json = artifact.to_canonical_json().unwrap();
        assert!(!json.contains('\n'));
        assert!(!json.contains(": "));
        let created_pos = json.find("\"created_at\"").unwrap();
        let run_pos = json.find("\"run_id\"").unwrap();
        assert!(created_pos < run_pos);
    }
}
