//! Determinism scoring.
//!
//! Six weighted component scores rate how reproducible a captured run is.
//! The resulting replay level (A/B/C) is metadata only and never gates
//! replay execution.

use std::collections::BTreeMap;

use regex::Regex;

use kurral_types::{
    Artifact, DeterminismReport, ModelConfig, OpenArtifact, ResolvedPrompt, ToolCall,
};

use crate::error::{Error, Result};

/// Component weights; must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub model_version: f64,
    pub random_seed: f64,
    pub prompt: f64,
    pub tool_cache: f64,
    pub environment: f64,
    pub parameters: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            model_version: 0.25,
            random_seed: 0.20,
            prompt: 0.20,
            tool_cache: 0.15,
            environment: 0.10,
            parameters: 0.10,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.model_version
            + self.random_seed
            + self.prompt
            + self.tool_cache
            + self.environment
            + self.parameters
    }

    fn validate(&self) -> Result<()> {
        let total = self.total();
        if !(0.99..=1.01).contains(&total) {
            return Err(Error::InvalidWeights(total));
        }
        Ok(())
    }
}

struct ScoreContext<'a> {
    config: &'a ModelConfig,
    prompt: &'a ResolvedPrompt,
    tool_calls: &'a [ToolCall],
    environment_label: &'a str,
    time_env_captured: bool,
    env_vars_captured: bool,
}

pub struct DeterminismScorer {
    weights: ScoreWeights,
    versioned_name: Regex,
}

impl Default for DeterminismScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl DeterminismScorer {
    pub fn new() -> Self {
        // Default weights sum to 1.0 by construction.
        Self::with_weights(ScoreWeights::default()).expect("default scorer weights")
    }

    pub fn with_weights(weights: ScoreWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self {
            weights,
            // Hyphenated numeric tail, e.g. "gpt-4-0613" or "m-1".
            versioned_name: Regex::new(r"-v?\d[\d.]*$").expect("versioned-name pattern"),
        })
    }

    /// Score an artifact under construction (time env will be captured at seal).
    pub fn score_open(&self, open: &OpenArtifact) -> DeterminismReport {
        self.score(ScoreContext {
            config: &open.llm_config,
            prompt: &open.resolved_prompt,
            tool_calls: &open.tool_calls,
            environment_label: &open.environment,
            time_env_captured: true,
            env_vars_captured: !open.environment_vars.is_empty(),
        })
    }

    /// Re-score a sealed artifact from its stored fields.
    pub fn score_artifact(&self, artifact: &Artifact) -> DeterminismReport {
        self.score(ScoreContext {
            config: &artifact.llm_config,
            prompt: &artifact.resolved_prompt,
            tool_calls: &artifact.tool_calls,
            environment_label: &artifact.environment,
            time_env_captured: true,
            env_vars_captured: !artifact.time_env.environment_vars.is_empty(),
        })
    }

    fn score(&self, ctx: ScoreContext<'_>) -> DeterminismReport {
        let mut breakdown = BTreeMap::new();
        breakdown.insert(
            "model_version".to_string(),
            self.score_model_version(ctx.config),
        );
        breakdown.insert("random_seed".to_string(), self.score_random_seed(ctx.config));
        breakdown.insert("prompt".to_string(), self.score_prompt(ctx.prompt));
        breakdown.insert("tool_cache".to_string(), self.score_tool_cache(ctx.tool_calls));
        breakdown.insert(
            "environment".to_string(),
            self.score_environment(
                ctx.environment_label,
                ctx.time_env_captured,
                ctx.env_vars_captured,
            ),
        );
        breakdown.insert("parameters".to_string(), self.score_parameters(ctx.config));

        // Clamp: component sums can drift past 1.0 by an ulp.
        let overall = (breakdown["model_version"] * self.weights.model_version
            + breakdown["random_seed"] * self.weights.random_seed
            + breakdown["prompt"] * self.weights.prompt
            + breakdown["tool_cache"] * self.weights.tool_cache
            + breakdown["environment"] * self.weights.environment
            + breakdown["parameters"] * self.weights.parameters)
            .clamp(0.0, 1.0);

        let mut missing_fields = Vec::new();
        let mut warnings = Vec::new();

        if breakdown["model_version"] < 0.8 {
            missing_fields.push("model_version".to_string());
        }
        if breakdown["random_seed"] == 0.0 {
            missing_fields.push("random_seed".to_string());
            warnings.push("No random seed set - outputs may vary".to_string());
        }
        if breakdown["parameters"] < 0.5 {
            warnings.push("Temperature > 0 reduces determinism".to_string());
        }
        if breakdown["tool_cache"] < 1.0 {
            let failed = ctx.tool_calls.iter().filter(|call| !call.is_ok()).count();
            if failed > 0 {
                warnings.push(format!("{} tool calls failed", failed));
            }
        }
        if breakdown["environment"] < 0.5 {
            warnings.push("Environment not fully captured".to_string());
        }

        DeterminismReport {
            overall_score: overall,
            breakdown,
            missing_fields,
            warnings,
        }
    }

    fn score_model_version(&self, config: &ModelConfig) -> f64 {
        if config.model_version.is_some() {
            return 1.0;
        }
        if config.model_name.is_empty() || config.model_name == "unknown" {
            return 0.0;
        }
        if self.versioned_name.is_match(&config.model_name) {
            // Version embedded in the name, e.g. "gpt-4-0613".
            return 0.8;
        }
        0.3
    }

    fn score_random_seed(&self, config: &ModelConfig) -> f64 {
        if config.parameters.seed.is_some() {
            1.0
        } else {
            0.0
        }
    }

    fn score_prompt(&self, prompt: &ResolvedPrompt) -> f64 {
        let mut score: f64 = 0.0;
        if !prompt.template.is_empty() {
            score += 0.3;
        }
        if !prompt.variables.is_empty() && !prompt.final_text.is_empty() {
            score += 0.4;
        }
        if !prompt.final_text.is_empty() {
            score += 0.3;
        }
        score.min(1.0)
    }

    fn score_tool_cache(&self, tool_calls: &[ToolCall]) -> f64 {
        if tool_calls.is_empty() {
            return 1.0;
        }
        let cacheable = tool_calls
            .iter()
            .filter(|call| !call.cache_key.is_empty() && call.is_ok())
            .count();
        cacheable as f64 / tool_calls.len() as f64
    }

    fn score_environment(
        &self,
        environment_label: &str,
        time_env_captured: bool,
        env_vars_captured: bool,
    ) -> f64 {
        let mut score: f64 = 0.0;
        if time_env_captured {
            score += 0.5;
        }
        if !environment_label.is_empty() {
            score += 0.3;
        }
        if env_vars_captured {
            score += 0.2;
        }
        score.min(1.0)
    }

    fn score_parameters(&self, config: &ModelConfig) -> f64 {
        let params = &config.parameters;
        let mut score: f64 = 0.0;

        if params.temperature == 0.0 {
            score += 0.5;
        } else if params.temperature < 0.3 {
            score += 0.3;
        } else if params.temperature < 0.7 {
            score += 0.1;
        }

        match params.top_p {
            None => score += 0.3,
            Some(top_p) if top_p == 1.0 => score += 0.3,
            Some(top_p) if top_p > 0.9 => score += 0.2,
            Some(_) => {}
        }

        if params.presence_penalty.unwrap_or(0.0) == 0.0 {
            score += 0.1;
        }
        if params.frequency_penalty.unwrap_or(0.0) == 0.0 {
            score += 0.1;
        }

        score.min(1.0)
    }
}
