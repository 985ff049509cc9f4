//! Provider response adapters.
//!
//! Model metadata arrives in heterogeneous response shapes. Each adapter
//! knows one provider's layout; unknown responses route to the permissive
//! default adapter, which records only what is presented.

use serde_json::Value;

use kurral_types::{ModelConfig, TokenUsage};

pub trait ModelAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, response: &Value) -> bool;
    fn extract_config(&self, response: &Value) -> ModelConfig;
    fn extract_tokens(&self, response: &Value) -> TokenUsage;
}

fn model_name(response: &Value) -> Option<String> {
    response
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn u64_at(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

/// OpenAI-shaped responses: `usage.prompt_tokens` / `completion_tokens`.
pub struct OpenAiAdapter;

impl ModelAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn matches(&self, response: &Value) -> bool {
        response
            .get("usage")
            .is_some_and(|usage| usage.get("prompt_tokens").is_some())
    }

    fn extract_config(&self, response: &Value) -> ModelConfig {
        ModelConfig::new(
            model_name(response).unwrap_or_else(|| "unknown".to_string()),
            "openai",
        )
    }

    fn extract_tokens(&self, response: &Value) -> TokenUsage {
        let usage = response.get("usage").cloned().unwrap_or(Value::Null);
        let prompt = u64_at(&usage, "prompt_tokens").unwrap_or(0);
        let completion = u64_at(&usage, "completion_tokens").unwrap_or(0);
        let mut tokens = TokenUsage::new(prompt, completion);
        if let Some(total) = u64_at(&usage, "total_tokens") {
            tokens.total_tokens = total;
        }
        if let Some(cached) = usage
            .get("prompt_tokens_details")
            .and_then(|details| u64_at(details, "cached_tokens"))
        {
            tokens = tokens.with_cached(cached);
        }
        if let Some(reasoning) = usage
            .get("completion_tokens_details")
            .and_then(|details| u64_at(details, "reasoning_tokens"))
        {
            tokens.reasoning_tokens = Some(reasoning);
        }
        tokens
    }
}

/// Anthropic-shaped responses: `usage.input_tokens` / `output_tokens`.
pub struct AnthropicAdapter;

impl ModelAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn matches(&self, response: &Value) -> bool {
        response
            .get("usage")
            .is_some_and(|usage| usage.get("input_tokens").is_some())
    }

    fn extract_config(&self, response: &Value) -> ModelConfig {
        ModelConfig::new(
            model_name(response).unwrap_or_else(|| "unknown".to_string()),
            "anthropic",
        )
    }

    fn extract_tokens(&self, response: &Value) -> TokenUsage {
        let usage = response.get("usage").cloned().unwrap_or(Value::Null);
        let prompt = u64_at(&usage, "input_tokens").unwrap_or(0);
        let completion = u64_at(&usage, "output_tokens").unwrap_or(0);
        let mut tokens = TokenUsage::new(prompt, completion);
        if let Some(cached) = u64_at(&usage, "cache_read_input_tokens") {
            tokens = tokens.with_cached(cached);
        }
        if let Some(created) = u64_at(&usage, "cache_creation_input_tokens") {
            tokens.cache_creation_tokens = Some(created);
        }
        tokens
    }
}

/// Fallback for unknown response shapes
pub struct DefaultAdapter;

impl ModelAdapter for DefaultAdapter {
    fn name(&self) -> &'static str {
        "default"
    }

    fn matches(&self, _response: &Value) -> bool {
        true
    }

    fn extract_config(&self, response: &Value) -> ModelConfig {
        match model_name(response) {
            Some(name) => ModelConfig::new(name, "unknown"),
            None => ModelConfig::unknown(),
        }
    }

    fn extract_tokens(&self, response: &Value) -> TokenUsage {
        let Some(usage) = response.get("usage") else {
            return TokenUsage::default();
        };
        let prompt = u64_at(usage, "prompt_tokens")
            .or_else(|| u64_at(usage, "input_tokens"))
            .unwrap_or(0);
        let completion = u64_at(usage, "completion_tokens")
            .or_else(|| u64_at(usage, "output_tokens"))
            .unwrap_or(0);
        TokenUsage::new(prompt, completion)
    }
}

static OPENAI: OpenAiAdapter = OpenAiAdapter;
static ANTHROPIC: AnthropicAdapter = AnthropicAdapter;
static DEFAULT: DefaultAdapter = DefaultAdapter;

/// Pick the adapter for a response shape.
pub fn adapter_for(response: &Value) -> &'static dyn ModelAdapter {
    for adapter in [&OPENAI as &dyn ModelAdapter, &ANTHROPIC] {
        if adapter.matches(response) {
            return adapter;
        }
    }
    &DEFAULT
}
