use serde::{Deserialize, Serialize};

/// Sampling parameters of the recorded model invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmParameters {
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
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
}

impl Default for LlmParameters {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            seed: None,
            top_p: None,
            top_k: None,
            max_tokens: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

impl LlmParameters {
    /// Fully deterministic sampling: temperature 0 with a fixed seed.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            temperature: 0.0,
            seed: Some(seed),
            ..Self::default()
        }
    }
}

/// Model identity and sampling configuration for one recorded run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub provider: String,
    pub parameters: LlmParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl ModelConfig {
    pub fn new(model_name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_version: None,
            provider: provider.into(),
            parameters: LlmParameters::default(),
            stop_sequences: None,
        }
    }

    /// Placeholder config for runs where no model metadata was observed.
    pub fn unknown() -> Self {
        Self::new("unknown", "unknown")
    }
}
