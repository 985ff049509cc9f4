use serde::{Deserialize, Serialize};

/// Token accounting for one recorded model invocation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hit_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            ..Self::default()
        }
    }

    /// Derive the cache hit rate from cached vs. prompt tokens when both are known.
    pub fn with_cached(mut self, cached_tokens: u64) -> Self {
        self.cached_tokens = Some(cached_tokens);
        self.cache_read_tokens = Some(cached_tokens);
        if self.prompt_tokens > 0 {
            self.cache_hit_rate = Some(cached_tokens as f64 / self.prompt_tokens as f64);
        }
        self
    }
}
