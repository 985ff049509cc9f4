//! Agent Regression Score.
//!
//! Weighted similarity in [0,1] between a baseline and a candidate artifact.
//! Structural difference never raises; a component that cannot be compared
//! scores zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use kurral_types::{canonical, Artifact};

use crate::error::{Error, Result};

/// Default pass threshold for regression checks.
pub const DEFAULT_ARS_THRESHOLD: f64 = 0.90;

/// Component weights of the score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArsWeights {
    pub output_similarity: f64,
    pub tool_match_rate: f64,
    pub side_effect_divergence: f64,
    pub error_delta: f64,
}

impl Default for ArsWeights {
    fn default() -> Self {
        Self {
            output_similarity: 0.40,
            tool_match_rate: 0.30,
            side_effect_divergence: 0.20,
            error_delta: 0.10,
        }
    }
}

/// Score with its component breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArsBreakdown {
    pub ars_score: f64,
    pub breakdown: BTreeMap<String, f64>,
    pub passed: bool,
}

/// Tool-name substrings that mark a call as side-effecting.
const SIDE_EFFECT_PATTERNS: [&str; 8] = [
    "write", "delete", "update", "create", "send", "post", "put", "patch",
];

pub fn is_side_effect_tool(tool_name: &str) -> bool {
    let lowered = tool_name.to_lowercase();
    SIDE_EFFECT_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

/// Longest-common-subsequence ratio: `2·LCS / (len_a + len_b)`, 1.0 for two
/// empty inputs. Operates on bytes of the canonical strings.
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    // Two-row DP keeps memory at O(min-side).
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];
    for &long_byte in long {
        for (i, &short_byte) in short.iter().enumerate() {
            curr[i + 1] = if long_byte == short_byte {
                prev[i] + 1
            } else {
                prev[i + 1].max(curr[i])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[short.len()];
    (2.0 * lcs as f64) / (a.len() + b.len()) as f64
}

#[derive(Default)]
pub struct ArsCalculator {
    weights: ArsWeights,
}

impl ArsCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Weighted similarity between baseline and candidate.
    pub fn calculate(&self, baseline: &Artifact, candidate: &Artifact) -> f64 {
        self.calculate_with_breakdown(baseline, candidate, DEFAULT_ARS_THRESHOLD)
            .ars_score
    }

    pub fn calculate_with_breakdown(
        &self,
        baseline: &Artifact,
        candidate: &Artifact,
        threshold: f64,
    ) -> ArsBreakdown {
        let mut breakdown = BTreeMap::new();
        breakdown.insert(
            "output_similarity".to_string(),
            self.output_similarity(baseline, candidate),
        );
        breakdown.insert(
            "tool_match_rate".to_string(),
            self.tool_match_rate(baseline, candidate),
        );
        breakdown.insert(
            "side_effect_divergence".to_string(),
            self.side_effect_divergence(baseline, candidate),
        );
        breakdown.insert("error_delta".to_string(), self.error_delta(baseline, candidate));

        let score = (breakdown["output_similarity"] * self.weights.output_similarity
            + breakdown["tool_match_rate"] * self.weights.tool_match_rate
            + breakdown["side_effect_divergence"] * self.weights.side_effect_divergence
            + breakdown["error_delta"] * self.weights.error_delta)
            .clamp(0.0, 1.0);

        ArsBreakdown {
            ars_score: score,
            breakdown,
            passed: score >= threshold,
        }
    }

    fn output_similarity(&self, baseline: &Artifact, candidate: &Artifact) -> f64 {
        let baseline_json = canonical::canonical_json(&baseline.outputs);
        let candidate_json = canonical::canonical_json(&candidate.outputs);
        if baseline_json == candidate_json {
            return 1.0;
        }
        lcs_ratio(&baseline_json, &candidate_json)
    }

    fn tool_match_rate(&self, baseline: &Artifact, candidate: &Artifact) -> f64 {
        if baseline.tool_calls.is_empty() && candidate.tool_calls.is_empty() {
            return 1.0;
        }
        if baseline.tool_calls.is_empty() || candidate.tool_calls.is_empty() {
            return 0.0;
        }

        let signature = |artifact: &Artifact| -> Vec<(String, String)> {
            artifact
                .tool_calls
                .iter()
                .map(|call| {
                    (
                        call.tool_name.clone(),
                        canonical::canonical_json(&call.input),
                    )
                })
                .collect()
        };
        let baseline_calls = signature(baseline);
        let candidate_calls = signature(candidate);
        if baseline_calls == candidate_calls {
            return 1.0;
        }

        // Jaccard over the call sets.
        let baseline_set: std::collections::BTreeSet<_> = baseline_calls.into_iter().collect();
        let candidate_set: std::collections::BTreeSet<_> = candidate_calls.into_iter().collect();
        let intersection = baseline_set.intersection(&candidate_set).count();
        let union = baseline_set.union(&candidate_set).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }

    fn side_effect_divergence(&self, baseline: &Artifact, candidate: &Artifact) -> f64 {
        let extract = |artifact: &Artifact| -> Vec<Value> {
            artifact
                .tool_calls
                .iter()
                .filter(|call| is_side_effect_tool(&call.tool_name))
                .map(|call| {
                    json!({
                        "tool": call.tool_name,
                        "inputs": call.input,
                        "outputs": call.output,
                    })
                })
                .collect()
        };
        let baseline_effects = extract(baseline);
        let candidate_effects = extract(candidate);

        if baseline_effects == candidate_effects {
            return 1.0;
        }
        if baseline_effects.is_empty() || candidate_effects.is_empty() {
            return 0.0;
        }
        lcs_ratio(
            &canonical::canonical_json(&Value::Array(baseline_effects)),
            &canonical::canonical_json(&Value::Array(candidate_effects)),
        )
    }

    fn error_delta(&self, baseline: &Artifact, candidate: &Artifact) -> f64 {
        match (&baseline.error, &candidate.error) {
            (None, None) => 1.0,
            (Some(a), Some(b)) if a == b => 1.0,
            (Some(a), Some(b)) => lcs_ratio(a, b) * 0.5,
            _ => 0.0,
        }
    }
}

/// One scored pair in a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArsPairResult {
    pub baseline_id: Uuid,
    pub candidate_id: Uuid,
    pub ars_score: f64,
    pub breakdown: ArsBreakdown,
}

/// Aggregate of a batch comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchArsResult {
    pub total_pairs: usize,
    pub average_ars: f64,
    pub min_ars: f64,
    pub max_ars: f64,
    pub failures: usize,
    pub passed: bool,
    pub results: Vec<ArsPairResult>,
}

#[derive(Default)]
pub struct BatchArsCalculator {
    calculator: ArsCalculator,
}

impl BatchArsCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score equal-length baseline/candidate lists pairwise.
    pub fn calculate_batch(
        &self,
        baselines: &[Artifact],
        candidates: &[Artifact],
        threshold: f64,
    ) -> Result<BatchArsResult> {
        if baselines.len() != candidates.len() {
            return Err(Error::InvalidComparison(format!(
                "baseline and candidate lists must have the same length ({} vs {})",
                baselines.len(),
                candidates.len()
            )));
        }

        let mut results = Vec::with_capacity(baselines.len());
        for (baseline, candidate) in baselines.iter().zip(candidates.iter()) {
            let breakdown = self
                .calculator
                .calculate_with_breakdown(baseline, candidate, threshold);
            results.push(ArsPairResult {
                baseline_id: baseline.kurral_id,
                candidate_id: candidate.kurral_id,
                ars_score: breakdown.ars_score,
                breakdown,
            });
        }

        let scores: Vec<f64> = results.iter().map(|r| r.ars_score).collect();
        let (average, min, max) = if scores.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                scores.iter().sum::<f64>() / scores.len() as f64,
                scores.iter().copied().fold(f64::INFINITY, f64::min),
                scores.iter().copied().fold(0.0, f64::max),
            )
        };
        let failures = scores.iter().filter(|score| **score < threshold).count();

        Ok(BatchArsResult {
            total_pairs: results.len(),
            average_ars: average,
            min_ars: min,
            max_ars: max,
            failures,
            passed: average >= threshold,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kurral_types::{
        DeterminismReport, EffectType, OpenArtifact, ToolCall, ToolStatus,
    };

    fn sealed(outputs: Value, error: Option<String>, tools: Vec<ToolCall>) -> Artifact {
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.outputs = outputs;
        open.error = error;
        open.tool_calls = tools;
        open.seal(DeterminismReport::default()).unwrap()
    }

    fn tool(name: &str, input: Value, output: Value) -> ToolCall {
        let now = Utc::now();
        ToolCall::new(
            name,
            input,
            output,
            EffectType::Other,
            ToolStatus::Ok,
            now,
            now,
        )
    }

    #[test]
    fn test_identity_scores_one() {
        let artifact = sealed(
            json!({"full_text": "yes"}),
            None,
            vec![tool("search", json!({"q": "x"}), json!({"hits": 1}))],
        );
        let ars = ArsCalculator::new().calculate(&artifact, &artifact);
        assert_eq!(ars, 1.0);
    }

    #[test]
    fn test_symmetry() {
        let a = sealed(json!({"full_text": "yes"}), None, vec![]);
        let b = sealed(json!({"full_text": "yeah, that works"}), None, vec![]);
        let calc = ArsCalculator::new();
        let forward = calc.calculate(&a, &b);
        let backward = calc.calculate(&b, &a);
        assert!((forward - backward).abs() < 1e-12);
    }

    #[test]
    fn test_lcs_ratio_known_value() {
        // LCS("yes", "yeah") = "ye", ratio = 2*2/(3+4).
        let ratio = lcs_ratio("yes", "yeah");
        assert!((ratio - 4.0 / 7.0).abs() < 1e-12);
        assert_eq!(lcs_ratio("", ""), 1.0);
        assert_eq!(lcs_ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_output_drift_weights() {
        // Outputs differ, tool calls / side effects / errors all agree:
        // score = 0.40 * lcs + 0.30 + 0.20 + 0.10.
        let a = sealed(json!({"full_text": "yes"}), None, vec![]);
        let b = sealed(json!({"full_text": "yeah"}), None, vec![]);
        let calc = ArsCalculator::new();
        let result = calc.calculate_with_breakdown(&a, &b, DEFAULT_ARS_THRESHOLD);

        let expected_output = lcs_ratio(
            &canonical::canonical_json(&a.outputs),
            &canonical::canonical_json(&b.outputs),
        );
        let expected = 0.40 * expected_output + 0.30 + 0.20 + 0.10;
        assert!((result.ars_score - expected).abs() < 1e-12);
        assert!(result.ars_score > 0.8 && result.ars_score < 1.0);
        assert!(!result.passed);
    }

    #[test]
    fn test_tool_match_jaccard() {
        let shared = tool("search", json!({"q": "x"}), json!({}));
        let a = sealed(
            json!({}),
            None,
            vec![shared.clone(), tool("fetch", json!({"url": "a"}), json!({}))],
        );
        let b = sealed(
            json!({}),
            None,
            vec![shared.clone(), tool("fetch", json!({"url": "b"}), json!({}))],
        );
        let calc = ArsCalculator::new();
        // Intersection 1 (search), union 3.
        assert!((calc.tool_match_rate(&a, &b) - 1.0 / 3.0).abs() < 1e-12);

        let empty = sealed(json!({}), None, vec![]);
        assert_eq!(calc.tool_match_rate(&empty, &empty), 1.0);
        assert_eq!(calc.tool_match_rate(&a, &empty), 0.0);
    }

    #[test]
    fn test_side_effect_component() {
        let calc = ArsCalculator::new();
        assert!(is_side_effect_tool("send_email"));
        assert!(is_side_effect_tool("db_UPDATE_row"));
        assert!(!is_side_effect_tool("search"));

        let send = tool("send_email", json!({"to": "a@b.c"}), json!({"ok": true}));
        let a = sealed(json!({}), None, vec![send.clone()]);
        let b = sealed(json!({}), None, vec![send.clone()]);
        assert_eq!(calc.side_effect_divergence(&a, &b), 1.0);

        let c = sealed(json!({}), None, vec![]);
        assert_eq!(calc.side_effect_divergence(&a, &c), 0.0);
    }

    #[test]
    fn test_error_delta() {
        let calc = ArsCalculator::new();
        let ok = sealed(json!({}), None, vec![]);
        let failed = sealed(json!({}), Some("timeout".to_string()), vec![]);
        let failed_same = sealed(json!({}), Some("timeout".to_string()), vec![]);
        let failed_other = sealed(json!({}), Some("timeout at step 3".to_string()), vec![]);

        assert_eq!(calc.error_delta(&ok, &ok), 1.0);
        assert_eq!(calc.error_delta(&failed, &failed_same), 1.0);
        assert_eq!(calc.error_delta(&ok, &failed), 0.0);
        let partial = calc.error_delta(&failed, &failed_other);
        assert!(partial > 0.0 && partial <= 0.5);
    }

    #[test]
    fn test_batch_rejects_unequal_lengths() {
        let a = sealed(json!({}), None, vec![]);
        let result = BatchArsCalculator::new().calculate_batch(
            &[a.clone(), a.clone()],
            &[a],
            DEFAULT_ARS_THRESHOLD,
        );
        assert!(matches!(result, Err(Error::InvalidComparison(_))));
    }

    #[test]
    fn test_batch_aggregates() {
        let same = sealed(json!({"full_text": "yes"}), None, vec![]);
        let drifted = sealed(json!({"full_text": "completely different text"}), None, vec![]);
        let batch = BatchArsCalculator::new()
            .calculate_batch(
                &[same.clone(), same.clone()],
                &[same.clone(), drifted],
                DEFAULT_ARS_THRESHOLD,
            )
            .unwrap();
        assert_eq!(batch.total_pairs, 2);
        assert_eq!(batch.max_ars, 1.0);
        assert!(batch.min_ars < 1.0);
        assert_eq!(batch.failures, 1);
    }
}
