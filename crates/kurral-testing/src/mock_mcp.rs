//! Mock MCP upstream server.
//!
//! Speaks just enough of the JSON-RPC + SSE wire contract to exercise the
//! proxy: a unary calculator and weather tool, and a streaming
//! `analyze_image` tool that emits start/progress/complete events.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Handle to a running mock upstream
pub struct MockMcpServer {
    addr: SocketAddr,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockMcpServer {
    /// Bind on an ephemeral port and serve until dropped.
    pub async fn start() -> anyhow::Result<Self> {
        let app = Router::new()
            .route("/", post(handle_rpc))
            .route("/mcp", post(handle_rpc))
            .route("/health", get(|| async { Json(json!({"status": "healthy"})) }));
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });
        Ok(Self {
            addr,
            shutdown: Some(tx),
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockMcpServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle_rpc(Json(body): Json<Value>) -> Response {
    let id = body.get("id").cloned().unwrap_or(Value::Null);
    let method = body.get("method").and_then(Value::as_str).unwrap_or("");
    let params = body.get("params").cloned().unwrap_or(Value::Null);

    match method {
        "tools/list" => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": [
                {"name": "calculator", "description": "Perform basic arithmetic operations"},
                {"name": "weather", "description": "Get weather information for a location"},
                {"name": "analyze_image", "description": "Analyze an image (streams via SSE)", "streaming": true},
            ]}
        }))
        .into_response(),
        "tools/call" => {
            let tool = params.get("name").and_then(Value::as_str).unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            match tool {
                "calculator" => Json(calculator_response(id, &arguments)).into_response(),
                "weather" => {
                    let location = arguments
                        .get("location")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    Json(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {"content": [{"type": "text", "text": format!("The weather in {} is sunny", location)}]}
                    }))
                    .into_response()
                }
                "analyze_image" => analyze_image_stream(&arguments).into_response(),
                other => Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32601, "message": format!("Tool not found: {}", other)}
                }))
                .into_response(),
            }
        }
        other => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": format!("Method not found: {}", other)}
        }))
        .into_response(),
    }
}

fn calculator_response(id: Value, arguments: &Value) -> Value {
    let a = arguments.get("a").and_then(Value::as_f64).unwrap_or(0.0);
    let b = arguments.get("b").and_then(Value::as_f64).unwrap_or(0.0);
    let op = arguments
        .get("operation")
        .or_else(|| arguments.get("op"))
        .and_then(Value::as_str)
        .unwrap_or("add");
    let result = match op {
        "subtract" => a - b,
        "multiply" => a * b,
        "divide" if b != 0.0 => a / b,
        "divide" => f64::NAN,
        _ => a + b,
    };
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {"content": [{"type": "text", "text": format!("Result: {}", result)}]}
    })
}

fn analyze_image_stream(arguments: &Value) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>> + use<>> {
    let url = arguments
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or("unknown.jpg")
        .to_string();
    let events = vec![
        ("start", json!({"status": "started", "url": url})),
        ("progress", json!({"status": "downloading", "percent": 25})),
        ("progress", json!({"status": "processing", "percent": 50})),
        ("progress", json!({"status": "analyzing", "percent": 75})),
        (
            "complete",
            json!({"result": {"objects": ["cat", "dog"], "confidence": 0.95}}),
        ),
    ];
    let stream = futures::stream::iter(events.into_iter().map(|(name, data)| {
        Ok(Event::default()
            .event(name)
            .data(serde_json::to_string(&data).unwrap_or_default()))
    }));
    Sse::new(stream)
}
