//! Deterministic artifact fixtures.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use kurral_core::seal_scored;
use kurral_store::{ArtifactStore, LocalStore};
use kurral_types::{
    Artifact, EffectType, LlmParameters, ModelConfig, OpenArtifact, ResolvedPrompt, ToolCall,
    ToolStatus,
};

/// Builder for sealed artifacts with a frozen, class-A configuration.
pub struct ArtifactFixture {
    open: OpenArtifact,
}

impl Default for ArtifactFixture {
    fn default() -> Self {
        Self::new("run-fixture")
    }
}

impl ArtifactFixture {
    pub fn new(run_id: &str) -> Self {
        let mut open = OpenArtifact::new(run_id, "tenant-test");
        let mut config = ModelConfig::new("m-1", "test");
        config.parameters = LlmParameters::deterministic(42);
        open.llm_config = config;
        let mut prompt = ResolvedPrompt::from_text("answer {q}");
        prompt
            .variables
            .insert("q".to_string(), json!("hello"));
        open.resolved_prompt = prompt;
        open.inputs = json!({"q": "hello"});
        open.outputs = json!({"full_text": "hi"});
        Self { open }
    }

    pub fn outputs(mut self, outputs: Value) -> Self {
        self.open.outputs = outputs;
        self
    }

    pub fn inputs(mut self, inputs: Value) -> Self {
        self.open.inputs = inputs;
        self
    }

    pub fn error(mut self, error: &str) -> Self {
        self.open.error = Some(error.to_string());
        self
    }

    pub fn bucket(mut self, bucket: &str) -> Self {
        self.open.semantic_buckets.push(bucket.to_string());
        self
    }

    pub fn tool_call(mut self, name: &str, input: Value, output: Value) -> Self {
        let base = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
            + chrono::Duration::seconds(self.open.tool_calls.len() as i64);
        self.open.record_tool_call(ToolCall::new(
            name,
            input,
            output,
            EffectType::Other,
            ToolStatus::Ok,
            base,
            base + chrono::Duration::milliseconds(250),
        ));
        self
    }

    pub fn fragments(mut self, fragments: &[&str]) -> Self {
        for (index, fragment) in fragments.iter().enumerate() {
            self.open
                .record_stream_fragment(fragment, (index as u64 + 1) * 10);
        }
        self
    }

    /// Score and seal.
    pub fn seal(self) -> Artifact {
        seal_scored(self.open).expect("fixture artifact must seal")
    }
}

/// Seed a local store with `count` sealed artifacts, oldest first.
pub fn seed_store(store: &LocalStore, count: usize) -> anyhow::Result<Vec<Artifact>> {
    let mut artifacts = Vec::with_capacity(count);
    for index in 0..count {
        let artifact = ArtifactFixture::new(&format!("run-{}", index))
            .outputs(json!({"full_text": format!("answer {}", index)}))
            .seal();
        store.save(&artifact)?;
        artifacts.push(artifact);
    }
    Ok(artifacts)
}
