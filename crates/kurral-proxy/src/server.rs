//! The record/replay proxy server.
//!
//! One axum service sits between an agent and its upstream tool servers.
//! RECORD forwards traffic and captures it; REPLAY answers from a sealed
//! artifact without touching the network (optionally falling through to the
//! upstream on a miss). SSE bodies are relayed through a bounded channel so
//! a slow client pauses upstream reads instead of growing memory.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event as SseWireEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use kurral_core::cancel::CancelToken;
use kurral_types::{Artifact, CapturedMcpCall, McpEvent, OpenArtifact, ToolCall};

use crate::rpc::{JsonRpcRequest, JsonRpcResponse};
use crate::sse::SseParser;

/// Default bounded window for in-flight SSE events.
pub const DEFAULT_EVENT_WINDOW: usize = 64;

/// Default per-request upstream deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default idle gap allowed between SSE events.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    Record,
    Replay,
}

impl ProxyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMode::Record => "record",
            ProxyMode::Replay => "replay",
        }
    }
}

/// Pacing of replayed SSE streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaySpeed {
    /// Honor the recorded inter-event gaps.
    Realtime,
    /// Emit events as fast as the client consumes them.
    #[default]
    FastForward,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub mode: ProxyMode,
    pub upstream: Option<String>,
    pub replay_speed: ReplaySpeed,
    pub event_window: usize,
    pub request_timeout: Duration,
    pub idle_timeout: Duration,
    /// In replay mode, forward cache misses to the upstream instead of
    /// answering with a replay-miss error.
    pub fall_through: bool,
}

impl ProxyConfig {
    pub fn record(upstream: impl Into<String>) -> Self {
        Self {
            mode: ProxyMode::Record,
            upstream: Some(upstream.into()),
            replay_speed: ReplaySpeed::default(),
            event_window: DEFAULT_EVENT_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            fall_through: false,
        }
    }

    pub fn replay() -> Self {
        Self {
            mode: ProxyMode::Replay,
            upstream: None,
            replay_speed: ReplaySpeed::default(),
            event_window: DEFAULT_EVENT_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            fall_through: false,
        }
    }
}

pub struct ProxyState {
    config: ProxyConfig,
    client: reqwest::Client,
    captured: Mutex<Vec<CapturedMcpCall>>,
    replay_calls: HashMap<String, CapturedMcpCall>,
    cancel: CancelToken,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_replay_source(config, None)
    }

    /// Build a replay state answering from a sealed artifact's captured
    /// calls. Plain tool calls replay as unary responses; captured MCP calls
    /// keep their unary/SSE shape.
    pub fn with_replay_source(config: ProxyConfig, artifact: Option<&Artifact>) -> Self {
        let mut replay_calls = HashMap::new();
        if let Some(artifact) = artifact {
            for call in &artifact.tool_calls {
                replay_calls.insert(call.cache_key.clone(), unary_from_tool_call(call));
            }
            // MCP captures win over plain tool calls on key collision.
            for call in &artifact.mcp_tool_calls {
                replay_calls.insert(call.cache_key.clone(), call.clone());
            }
        }
        Self {
            config,
            client: reqwest::Client::new(),
            captured: Mutex::new(Vec::new()),
            replay_calls,
            cancel: CancelToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn captured_calls(&self) -> Vec<CapturedMcpCall> {
        self.captured.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn captured_count(&self) -> usize {
        self.captured.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn record_call(&self, call: CapturedMcpCall) {
        let mut captured = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        captured.push(call);
    }

    /// Seal everything captured so far into an artifact.
    pub fn seal_captured(
        &self,
        run_id: &str,
        tenant_id: &str,
    ) -> kurral_core::Result<Artifact> {
        let mut open = OpenArtifact::new(run_id, tenant_id);
        open.mcp_tool_calls = self.captured_calls();
        open.environment = "proxy".to_string();
        kurral_core::seal_scored(open)
    }
}

fn unary_from_tool_call(call: &ToolCall) -> CapturedMcpCall {
    CapturedMcpCall::unary(
        "artifact",
        "tools/call",
        call.tool_name.clone(),
        call.input.clone(),
        call.output.clone(),
    )
}

/// Build the proxy router.
pub fn build_app(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/mcp", post(handle_rpc))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

async fn handle_stats(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    Json(json!({
        "mode": state.config.mode.as_str(),
        "captured_calls": state.captured_count(),
    }))
}

async fn handle_rpc(State(state): State<Arc<ProxyState>>, body: Bytes) -> Response {
    let request: Option<JsonRpcRequest> = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|value| serde_json::from_value(value).ok());
    let request = match request {
        Some(request) if request.is_well_formed() => request,
        _ => {
            return match state.config.mode {
                // RECORD forwards malformed traffic untouched; the upstream
                // owns the verdict.
                ProxyMode::Record => forward_raw(&state, body).await,
                ProxyMode::Replay => {
                    Json(JsonRpcResponse::invalid_request("malformed JSON-RPC request"))
                        .into_response()
                }
            };
        }
    };

    match state.config.mode {
        ProxyMode::Record => forward_and_capture(state, request, true).await,
        ProxyMode::Replay => replay_request(state, request).await,
    }
}

async fn forward_raw(state: &ProxyState, body: Bytes) -> Response {
    let Some(upstream) = state.config.upstream.clone() else {
        return Json(JsonRpcResponse::invalid_request("no upstream configured")).into_response();
    };
    let sent = tokio::time::timeout(
        state.config.request_timeout,
        state
            .client
            .post(&upstream)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send(),
    )
    .await;
    match sent {
        Err(_) => Json(JsonRpcResponse::upstream_timeout(Value::Null, &upstream)).into_response(),
        Ok(Err(err)) => Json(JsonRpcResponse::error(
            Value::Null,
            crate::rpc::CODE_UPSTREAM_TIMEOUT,
            format!("Upstream {} unreachable: {}", upstream, err),
        ))
        .into_response(),
        Ok(Ok(response)) => {
            let status = StatusCode::from_u16(response.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let bytes = response.bytes().await.unwrap_or_default();
            (status, [(header::CONTENT_TYPE, "application/json")], bytes).into_response()
        }
    }
}

async fn forward_and_capture(
    state: Arc<ProxyState>,
    request: JsonRpcRequest,
    capture: bool,
) -> Response {
    let Some(upstream) = state.config.upstream.clone() else {
        return Json(JsonRpcResponse::invalid_request("no upstream configured")).into_response();
    };

    let sent = tokio::time::timeout(
        state.config.request_timeout,
        state.client.post(&upstream).json(&request).send(),
    )
    .await;
    let response = match sent {
        Err(_) => {
            warn!(%upstream, method = %request.method, "upstream request timed out");
            return Json(JsonRpcResponse::upstream_timeout(request.id, &upstream)).into_response();
        }
        Ok(Err(err)) => {
            return Json(JsonRpcResponse::error(
                request.id,
                crate::rpc::CODE_UPSTREAM_TIMEOUT,
                format!("Upstream {} unreachable: {}", upstream, err),
            ))
            .into_response();
        }
        Ok(Ok(response)) => response,
    };

    let is_sse = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"));

    if is_sse {
        relay_sse(state, request, upstream, response, capture).await
    } else {
        let body: Value = match tokio::time::timeout(state.config.request_timeout, response.json())
            .await
        {
            Ok(Ok(body)) => body,
            _ => {
                return Json(JsonRpcResponse::upstream_timeout(request.id, &upstream))
                    .into_response();
            }
        };
        if capture {
            if let Some(result) = body.get("result") {
                state.record_call(CapturedMcpCall::unary(
                    upstream,
                    request.method.clone(),
                    request.tool_name(),
                    request.arguments(),
                    result.clone(),
                ));
            }
        }
        Json(body).into_response()
    }
}

/// Relay an upstream SSE body to the client while capturing each event.
///
/// The producer reads upstream chunks and pushes parsed events into a
/// bounded channel the client response drains. A full channel suspends the
/// producer, which in turn stops reading from the upstream socket.
async fn relay_sse(
    state: Arc<ProxyState>,
    request: JsonRpcRequest,
    upstream: String,
    response: reqwest::Response,
    capture: bool,
) -> Response {
    let (tx, rx) = mpsc::channel::<Result<SseWireEvent, Infallible>>(state.config.event_window);
    let idle_timeout = state.config.idle_timeout;
    let cancel = state.cancel.clone();

    tokio::spawn(async move {
        let mut upstream_body = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut events: Vec<McpEvent> = Vec::new();

        'read: loop {
            if cancel.is_cancelled() {
                let _ = tx
                    .send(Ok(SseWireEvent::default()
                        .event("error")
                        .data(r#"{"message":"proxy shutting down"}"#)))
                    .await;
                break 'read;
            }
            let chunk = match tokio::time::timeout(idle_timeout, upstream_body.next()).await {
                Err(_) => {
                    warn!(%upstream, "SSE idle timeout, closing stream");
                    let _ = tx
                        .send(Ok(SseWireEvent::default()
                            .event("error")
                            .data(r#"{"message":"upstream idle timeout"}"#)))
                        .await;
                    break 'read;
                }
                Ok(None) => break 'read,
                Ok(Some(Err(err))) => {
                    let _ = tx
                        .send(Ok(SseWireEvent::default().event("error").data(
                            serde_json::to_string(&json!({"message": err.to_string()}))
                                .unwrap_or_default(),
                        )))
                        .await;
                    break 'read;
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            let text = String::from_utf8_lossy(&chunk);
            for raw in parser.feed(&text) {
                events.push(McpEvent {
                    event_type: raw.event.clone(),
                    data: raw.data.clone(),
                    ts: Utc::now(),
                });
                let wire = SseWireEvent::default().event(raw.event).data(
                    serde_json::to_string(&raw.data).unwrap_or_else(|_| "null".to_string()),
                );
                // A closed receiver means the client went away; stop reading
                // upstream rather than buffering.
                if tx.send(Ok(wire)).await.is_err() {
                    break 'read;
                }
            }
        }

        if capture && !events.is_empty() {
            info!(
                tool = %request.tool_name(),
                events = events.len(),
                "captured SSE tool call"
            );
            state.record_call(CapturedMcpCall::streamed(
                upstream,
                request.method.clone(),
                request.tool_name(),
                request.arguments(),
                events,
            ));
        }
    });

    Sse::new(ReceiverStream::new(rx)).into_response()
}

async fn replay_request(state: Arc<ProxyState>, request: JsonRpcRequest) -> Response {
    let tool_name = request.tool_name();
    let key = ToolCall::cache_key_for(&tool_name, &request.arguments());
    let Some(cached) = state.replay_calls.get(&key).cloned() else {
        if state.config.fall_through && state.config.upstream.is_some() {
            return forward_and_capture(state, request, false).await;
        }
        return Json(JsonRpcResponse::replay_miss(request.id, &tool_name)).into_response();
    };

    if !cached.was_sse {
        let result = cached.result.clone().unwrap_or(Value::Null);
        return Json(JsonRpcResponse::result(request.id, result)).into_response();
    }

    // Replay the recorded event order, pacing by the recorded gaps when the
    // speed is realtime.
    let speed = state.config.replay_speed;
    let mut paced: Vec<(Duration, String, Value)> = Vec::with_capacity(cached.events.len());
    let mut previous_ts: Option<chrono::DateTime<chrono::Utc>> = None;
    for event in &cached.events {
        let delay = match (speed, previous_ts) {
            (ReplaySpeed::Realtime, Some(prev)) => (event.ts - prev)
                .to_std()
                .unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        };
        previous_ts = Some(event.ts);
        paced.push((delay, event.event_type.clone(), event.data.clone()));
    }

    let stream = futures::stream::iter(paced).then(|(delay, event, data)| async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok::<_, Infallible>(
            SseWireEvent::default()
                .event(event)
                .data(serde_json::to_string(&data).unwrap_or_else(|_| "null".to_string())),
        )
    });

    Sse::new(stream).into_response()
}

/// Bind and serve until ctrl-c. The replay source, when given, answers
/// replay-mode lookups.
pub async fn serve(
    config: ProxyConfig,
    port: u16,
    artifact: Option<&Artifact>,
) -> anyhow::Result<Arc<ProxyState>> {
    let state = Arc::new(ProxyState::with_replay_source(config, artifact));
    let app = build_app(state.clone());
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!(
        mode = state.config.mode.as_str(),
        addr = %listener.local_addr()?,
        "MCP proxy listening"
    );

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_state.cancel_token().cancel("ctrl-c");
        })
        .await?;
    Ok(state)
}
