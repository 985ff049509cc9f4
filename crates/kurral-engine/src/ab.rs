//! A/B comparison of two agent version configurations over a baseline suite.
//!
//! Each baseline artifact is replayed under both version configurations and
//! the replayed outputs are scored against the baseline with ARS. The result
//! carries aggregate scores and a deploy / reject / needs-review call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kurral_types::Artifact;

use crate::ars::{ArsCalculator, DEFAULT_ARS_THRESHOLD};
use crate::error::{Error, Result};
use crate::replay::{ReplayEngine, ReplayOverrides};

/// One agent version under test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl VersionConfig {
    /// Version that differs from baseline only by model.
    pub fn model(name: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_name: Some(model_name.into()),
            ..Self::default()
        }
    }

    fn overrides(&self) -> ReplayOverrides {
        ReplayOverrides {
            inputs: None,
            prompt: self.prompt.clone(),
            temperature: self.temperature,
            model_name: self.model_name.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Deploy,
    Reject,
    NeedsReview,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Deploy => "deploy",
            Recommendation::Reject => "reject",
            Recommendation::NeedsReview => "needs_review",
        }
    }
}

/// Per-artifact comparison entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbPairScore {
    pub artifact_id: Uuid,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub semantic_buckets: Vec<String>,
    pub a_ars: f64,
    pub b_ars: f64,
    pub b_improvement: f64,
}

/// Artifact where version B regressed below both A and the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbFailure {
    pub artifact_id: Uuid,
    pub a_ars: f64,
    pub b_ars: f64,
    pub regression: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTestResult {
    pub test_id: Uuid,
    #[serde(with = "kurral_types::timestamp")]
    pub timestamp: DateTime<Utc>,
    pub version_a: VersionConfig,
    pub version_b: VersionConfig,
    pub test_suite_size: usize,
    pub replays_executed: usize,
    pub a_mean_ars: f64,
    pub b_mean_ars: f64,
    pub a_min_ars: f64,
    pub b_min_ars: f64,
    pub a_max_ars: f64,
    pub b_max_ars: f64,
    pub b_improvement: f64,
    pub recommendation: Recommendation,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_artifact_scores: Vec<AbPairScore>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<AbFailure>,
}

#[derive(Default)]
pub struct AbTestEngine {
    replay: ReplayEngine,
    ars: ArsCalculator,
}

impl AbTestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the comparison over a baseline suite.
    pub fn run(
        &self,
        suite: &[Artifact],
        version_a: &VersionConfig,
        version_b: &VersionConfig,
        threshold: f64,
    ) -> Result<AbTestResult> {
        if suite.is_empty() {
            return Err(Error::InvalidComparison(
                "A/B test requires at least one baseline artifact".to_string(),
            ));
        }

        let overrides_a = version_a.overrides();
        let overrides_b = version_b.overrides();

        let mut a_scores = Vec::with_capacity(suite.len());
        let mut b_scores = Vec::with_capacity(suite.len());
        let mut per_artifact_scores = Vec::with_capacity(suite.len());
        let mut failures = Vec::new();

        for baseline in suite {
            let a_result = self.replay.replay(baseline, &overrides_a)?;
            let b_result = self.replay.replay(baseline, &overrides_b)?;

            let a_artifact = replayed_artifact(baseline, a_result.outputs);
            let b_artifact = replayed_artifact(baseline, b_result.outputs);

            let a_ars = self.ars.calculate(baseline, &a_artifact);
            let b_ars = self.ars.calculate(baseline, &b_artifact);
            a_scores.push(a_ars);
            b_scores.push(b_ars);

            per_artifact_scores.push(AbPairScore {
                artifact_id: baseline.kurral_id,
                semantic_buckets: baseline.semantic_buckets.clone(),
                a_ars,
                b_ars,
                b_improvement: b_ars - a_ars,
            });

            if b_ars < a_ars && b_ars < threshold {
                failures.push(AbFailure {
                    artifact_id: baseline.kurral_id,
                    a_ars,
                    b_ars,
                    regression: a_ars - b_ars,
                });
            }
        }

        let mean = |scores: &[f64]| scores.iter().sum::<f64>() / scores.len() as f64;
        let min = |scores: &[f64]| scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = |scores: &[f64]| scores.iter().copied().fold(0.0, f64::max);

        let a_mean_ars = mean(&a_scores);
        let b_mean_ars = mean(&b_scores);
        let b_improvement = b_mean_ars - a_mean_ars;
        let recommendation =
            recommend(b_mean_ars, b_improvement, failures.len(), threshold);

        Ok(AbTestResult {
            test_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            version_a: version_a.clone(),
            version_b: version_b.clone(),
            test_suite_size: suite.len(),
            replays_executed: suite.len() * 2,
            a_mean_ars,
            b_mean_ars,
            a_min_ars: min(&a_scores),
            b_min_ars: min(&b_scores),
            a_max_ars: max(&a_scores),
            b_max_ars: max(&b_scores),
            b_improvement,
            recommendation,
            threshold,
            per_artifact_scores,
            failures,
        })
    }
}

fn replayed_artifact(baseline: &Artifact, outputs: serde_json::Value) -> Artifact {
    Artifact {
        outputs,
        ..baseline.clone()
    }
}

fn recommend(
    b_mean_ars: f64,
    b_improvement: f64,
    failures: usize,
    threshold: f64,
) -> Recommendation {
    if b_mean_ars >= threshold && b_improvement >= 0.0 && failures == 0 {
        Recommendation::Deploy
    } else if b_mean_ars < threshold || b_improvement < -0.05 {
        Recommendation::Reject
    } else {
        Recommendation::NeedsReview
    }
}

/// Convenience wrapper for the model-migration shape of the test.
pub fn model_migration(
    suite: &[Artifact],
    model_a: &str,
    model_b: &str,
    threshold: Option<f64>,
) -> Result<AbTestResult> {
    AbTestEngine::new().run(
        suite,
        &VersionConfig::model("baseline", model_a),
        &VersionConfig::model("candidate", model_b),
        threshold.unwrap_or(DEFAULT_ARS_THRESHOLD),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurral_types::{DeterminismReport, OpenArtifact};
    use serde_json::json;

    fn suite(n: usize) -> Vec<Artifact> {
        (0..n)
            .map(|i| {
                let mut open = OpenArtifact::new(format!("run-{}", i), "tenant-1");
                open.outputs = json!({"full_text": format!("answer {}", i)});
                open.seal(DeterminismReport::default()).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_model_migration_without_prompt_change_deploys() {
        // Model-only overrides keep recorded outputs, so both versions score
        // 1.0 against baseline and B shows no regression.
        let result = model_migration(&suite(3), "m-1", "m-2", None).unwrap();
        assert_eq!(result.replays_executed, 6);
        assert_eq!(result.a_mean_ars, 1.0);
        assert_eq!(result.b_mean_ars, 1.0);
        assert_eq!(result.recommendation, Recommendation::Deploy);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_prompt_change_rejected_when_drift_exceeds_threshold() {
        let version_a = VersionConfig {
            name: "baseline".to_string(),
            ..Default::default()
        };
        let version_b = VersionConfig {
            name: "candidate".to_string(),
            prompt: Some("entirely new prompt".to_string()),
            ..Default::default()
        };
        let result = AbTestEngine::new()
            .run(&suite(2), &version_a, &version_b, 0.99)
            .unwrap();

        assert!(result.b_mean_ars < result.a_mean_ars);
        assert_eq!(result.recommendation, Recommendation::Reject);
        assert_eq!(result.failures.len(), 2);
    }

    #[test]
    fn test_empty_suite_rejected() {
        assert!(matches!(
            model_migration(&[], "m-1", "m-2", None),
            Err(Error::InvalidComparison(_))
        ));
    }
}
