//! Capture event flow.
//!
//! Every observation channel converges on [`EventSink`]: the in-process
//! [`CaptureHandle`] given to the agent emits into it directly, and the
//! enrichment worker merges external-service data into the same schema
//! after the fact. The artifact never depends on which channel spoke.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;

use kurral_core::cancel::CancelToken;
use kurral_types::{
    EffectType, ModelConfig, ResolvedPrompt, TokenUsage, ToolCall, ToolStatus,
};

use crate::adapters;

/// Receiver side of capture observations
pub trait EventSink: Send + Sync {
    fn on_tool_call(&self, call: ToolCall);
    fn on_stream_fragment(&self, fragment: &str, ts_ms: u64);
    fn on_model_config(&self, config: ModelConfig);
    fn on_token_usage(&self, usage: TokenUsage);
}

/// Accumulated observations for one run
#[derive(Debug, Default)]
pub struct CaptureState {
    pub tool_calls: Vec<ToolCall>,
    pub fragments: Vec<(String, u64)>,
    pub model_config: Option<ModelConfig>,
    pub token_usage: Option<TokenUsage>,
    pub prompt: Option<ResolvedPrompt>,
    pub cost_usd: Option<f64>,
}

/// In-flight tool span returned by [`CaptureHandle::tool_start`]
#[derive(Debug)]
pub struct ToolToken {
    pub tool_name: String,
    pub input: Value,
    pub effect_type: EffectType,
    pub started_at: DateTime<Utc>,
}

impl ToolToken {
    pub fn with_effect(mut self, effect_type: EffectType) -> Self {
        self.effect_type = effect_type;
        self
    }
}

/// Handle the agent callable uses to report events during capture.
///
/// Cloneable; all clones feed the same run. Relative fragment timestamps are
/// measured against the moment the handle was created.
#[derive(Clone)]
pub struct CaptureHandle {
    state: Arc<Mutex<CaptureState>>,
    started: Instant,
    cancel: CancelToken,
}

impl CaptureHandle {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState::default())),
            started: Instant::now(),
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Open a tool span. Pair with [`tool_end`](Self::tool_end) or
    /// [`tool_error`](Self::tool_error).
    pub fn tool_start(&self, tool_name: impl Into<String>, input: Value) -> ToolToken {
        ToolToken {
            tool_name: tool_name.into(),
            input,
            effect_type: EffectType::Other,
            started_at: Utc::now(),
        }
    }

    pub fn tool_end(&self, token: ToolToken, output: Value) {
        let call = ToolCall::new(
            token.tool_name,
            token.input,
            output,
            token.effect_type,
            ToolStatus::Ok,
            token.started_at,
            Utc::now(),
        );
        self.on_tool_call(call);
    }

    pub fn tool_error(&self, token: ToolToken, error: impl Into<String>) {
        let mut call = ToolCall::new(
            token.tool_name,
            token.input,
            Value::Null,
            token.effect_type,
            ToolStatus::Error,
            token.started_at,
            Utc::now(),
        );
        call.error_text = Some(error.into());
        self.on_tool_call(call);
    }

    /// Run a tool closure under a span, recording outcome and latency.
    pub fn observe_tool<F>(
        &self,
        tool_name: &str,
        input: Value,
        effect_type: EffectType,
        tool: F,
    ) -> anyhow::Result<Value>
    where
        F: FnOnce(&Value) -> anyhow::Result<Value>,
    {
        let token = self.tool_start(tool_name, input).with_effect(effect_type);
        let input_ref = token.input.clone();
        match tool(&input_ref) {
            Ok(output) => {
                self.tool_end(token, output.clone());
                Ok(output)
            }
            Err(err) => {
                self.tool_error(token, err.to_string());
                Err(err)
            }
        }
    }

    /// Record one streamed output fragment at the current relative time.
    pub fn record_fragment(&self, fragment: &str) {
        let ts_ms = self.elapsed_ms();
        self.on_stream_fragment(fragment, ts_ms);
    }

    /// Pull model config and token usage out of a provider response via the
    /// adapter registry.
    pub fn record_model_response(&self, response: &Value) {
        let adapter = adapters::adapter_for(response);
        self.on_model_config(adapter.extract_config(response));
        self.on_token_usage(adapter.extract_tokens(response));
    }

    pub fn set_model_config(&self, config: ModelConfig) {
        self.on_model_config(config);
    }

    pub fn set_token_usage(&self, usage: TokenUsage) {
        self.on_token_usage(usage);
    }

    pub fn set_prompt(&self, prompt: ResolvedPrompt) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.prompt = Some(prompt);
    }

    pub fn set_cost_usd(&self, cost: f64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cost_usd = Some(cost);
    }

    /// Drain the accumulated state. Later events on other clones are lost;
    /// the pipeline calls this exactly once, after the agent returns.
    pub(crate) fn take_state(&self) -> CaptureState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut state)
    }
}

impl EventSink for CaptureHandle {
    fn on_tool_call(&self, call: ToolCall) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.tool_calls.push(call);
    }

    fn on_stream_fragment(&self, fragment: &str, ts_ms: u64) {
        if fragment.is_empty() {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.fragments.push((fragment.to_string(), ts_ms));
    }

    fn on_model_config(&self, config: ModelConfig) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.model_config = Some(config);
    }

    fn on_token_usage(&self, usage: TokenUsage) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.token_usage = Some(usage);
    }
}
