//! JSON-RPC 2.0 envelope types.
//!
//! The proxy always answers with a valid envelope: protocol-layer failures
//! become error objects, never bare HTTP errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Replay-mode request with no cached call.
pub const CODE_REPLAY_MISS: i64 = -32001;
/// Upstream exceeded the per-request deadline.
pub const CODE_UPSTREAM_TIMEOUT: i64 = -32002;
/// Malformed JSON-RPC request.
pub const CODE_INVALID_REQUEST: i64 = -32600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn is_well_formed(&self) -> bool {
        self.jsonrpc == "2.0" && !self.method.is_empty()
    }

    /// Tool name for a `tools/call` request; other methods use the method
    /// name itself as the lookup identity.
    pub fn tool_name(&self) -> String {
        if self.method == "tools/call" {
            if let Some(name) = self.params.get("name").and_then(Value::as_str) {
                return name.to_string();
            }
        }
        self.method.clone()
    }

    /// Arguments participating in the cache key.
    pub fn arguments(&self) -> Value {
        if self.method == "tools/call" {
            self.params
                .get("arguments")
                .cloned()
                .unwrap_or(Value::Object(serde_json::Map::new()))
        } else {
            self.params.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn replay_miss(id: Value, tool_name: &str) -> Self {
        Self::error(
            id,
            CODE_REPLAY_MISS,
            format!("Replay miss: no cached call for {}", tool_name),
        )
    }

    pub fn upstream_timeout(id: Value, upstream: &str) -> Self {
        Self::error(
            id,
            CODE_UPSTREAM_TIMEOUT,
            format!("Upstream {} timed out", upstream),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::error(Value::Null, CODE_INVALID_REQUEST, message)
    }
}
