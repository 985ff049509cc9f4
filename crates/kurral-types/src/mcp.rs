use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;

/// One parsed server-sent event from an MCP tool stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpEvent {
    pub event_type: String,
    pub data: Value,
    #[serde(with = "crate::timestamp")]
    pub ts: DateTime<Utc>,
}

/// Name of the terminal event that closes an MCP event stream.
pub const MCP_TERMINAL_EVENT: &str = "complete";

/// One tool call captured at the protocol proxy.
///
/// Unary calls carry `result` directly; streaming calls carry the ordered
/// event list and the final result lives in the terminal event's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedMcpCall {
    pub server: String,
    pub method: String,
    pub tool_name: String,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub was_sse: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<McpEvent>,
    pub cache_key: String,
}

impl CapturedMcpCall {
    pub fn unary(
        server: impl Into<String>,
        method: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
        result: Value,
    ) -> Self {
        let tool_name = tool_name.into();
        let cache_key = canonical::cache_key(&tool_name, &arguments);
        Self {
            server: server.into(),
            method: method.into(),
            tool_name,
            arguments,
            result: Some(result),
            was_sse: false,
            events: Vec::new(),
            cache_key,
        }
    }

    pub fn streamed(
        server: impl Into<String>,
        method: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
        events: Vec<McpEvent>,
    ) -> Self {
        let tool_name = tool_name.into();
        let cache_key = canonical::cache_key(&tool_name, &arguments);
        Self {
            server: server.into(),
            method: method.into(),
            tool_name,
            arguments,
            result: None,
            was_sse: true,
            events,
            cache_key,
        }
    }

    /// Final result: the unary result, or the `result` field of the terminal
    /// event for streamed calls.
    pub fn final_result(&self) -> Option<Value> {
        if let Some(result) = &self.result {
            return Some(result.clone());
        }
        self.events
            .iter()
            .rev()
            .find(|event| event.event_type == MCP_TERMINAL_EVENT)
            .map(|event| {
                event
                    .data
                    .get("result")
                    .cloned()
                    .unwrap_or_else(|| event.data.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_unary_final_result() {
        let call = CapturedMcpCall::unary(
            "tools",
            "tools/call",
            "calculator",
            json!({"op": "add"}),
            json!({"content": [{"type": "text", "text": "Result: 5"}]}),
        );
        assert_eq!(
            call.final_result(),
            Some(json!({"content": [{"type": "text", "text": "Result: 5"}]}))
        );
    }

    #[test]
    fn test_streamed_final_result_from_terminal_event() {
        let call = CapturedMcpCall::streamed(
            "tools",
            "tools/call",
            "analyze_image",
            json!({"url": "cat.jpg"}),
            vec![
                McpEvent {
                    event_type: "progress".to_string(),
                    data: json!({"percent": 50}),
                    ts: ts(),
                },
                McpEvent {
                    event_type: "complete".to_string(),
                    data: json!({"result": {"objects": ["cat", "dog"]}}),
                    ts: ts(),
                },
            ],
        );
        assert_eq!(call.final_result(), Some(json!({"objects": ["cat", "dog"]})));
    }

    #[test]
    fn test_cache_key_matches_tool_call_derivation() {
        let arguments = json!({"url": "cat.jpg"});
        let call = CapturedMcpCall::unary("s", "tools/call", "analyze_image", arguments.clone(), json!({}));
        assert_eq!(
            call.cache_key,
            crate::ToolCall::cache_key_for("analyze_image", &arguments)
        );
    }
}
