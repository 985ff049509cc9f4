use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;

/// One chat message of a resolved prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

/// Prompt with template, resolved variables, and final rendered text.
///
/// The three derived hashes are computed at seal time, each SHA-256 over the
/// canonical JSON of the corresponding field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPrompt {
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, Value>,
    pub final_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<PromptMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_text_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables_hash: Option<String>,
}

impl ResolvedPrompt {
    /// Prompt where the literal text is both template and final rendering.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            template: text.clone(),
            template_id: None,
            variables: BTreeMap::new(),
            final_text: text,
            system_prompt: None,
            messages: None,
            template_hash: None,
            final_text_hash: None,
            variables_hash: None,
        }
    }

    /// Prompt assembled from an ordered chat transcript.
    pub fn from_messages(messages: Vec<PromptMessage>) -> Self {
        let final_text = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            messages: Some(messages),
            ..Self::from_text(final_text)
        }
    }

    pub(crate) fn compute_hashes(&mut self) {
        self.template_hash = Some(canonical::canonical_hash(&Value::String(
            self.template.clone(),
        )));
        self.final_text_hash = Some(canonical::canonical_hash(&Value::String(
            self.final_text.clone(),
        )));
        let variables = Value::Object(
            self.variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        self.variables_hash = Some(canonical::canonical_hash(&variables));
    }
}
