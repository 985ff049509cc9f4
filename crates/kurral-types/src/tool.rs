use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;

/// Effect class of a recorded tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectType {
    Http,
    DbWrite,
    Email,
    Fs,
    Mcp,
    Other,
}

/// Terminal status of a recorded tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// One tool invocation observed during capture.
///
/// `cache_key` is the sole means by which a replayed call finds its cached
/// output; it is derived from `(tool_name, input)` alone, so two calls with
/// equal inputs share a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    pub effect_type: EffectType,
    pub latency_ms: u64,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub cache_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stubbed_in_replay: bool,
    #[serde(with = "crate::timestamp")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp")]
    pub ended_at: DateTime<Utc>,
}

impl ToolCall {
    pub fn new(
        tool_name: impl Into<String>,
        input: Value,
        output: Value,
        effect_type: EffectType,
        status: ToolStatus,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let tool_name = tool_name.into();
        let cache_key = Self::cache_key_for(&tool_name, &input);
        let output_hash = if output.is_null() {
            None
        } else {
            Some(canonical::canonical_hash(&output))
        };
        let latency_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            tool_name,
            namespace: None,
            input,
            output,
            effect_type,
            latency_ms,
            status,
            error_text: None,
            summary: None,
            cache_key,
            output_hash,
            stubbed_in_replay: false,
            started_at,
            ended_at,
        }
    }

    /// Content-addressed key for a `(tool_name, input)` pair.
    pub fn cache_key_for(tool_name: &str, input: &Value) -> String {
        canonical::cache_key(tool_name, input)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }

    /// Copy of this call marked as served from the stub cache.
    pub fn stubbed_copy(&self) -> Self {
        Self {
            stubbed_in_replay: true,
            ..self.clone()
        }
    }
}
