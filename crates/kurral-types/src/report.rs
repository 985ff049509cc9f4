use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reproducibility confidence rating derived from the determinism score.
///
/// This is metadata only: the replay engine stubs tool calls and serves
/// cached outputs identically for every level. Nothing may gate replay
/// behavior on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplayLevel {
    A,
    B,
    C,
    #[default]
    #[serde(rename = "unset")]
    Unset,
}

impl ReplayLevel {
    /// Level thresholds: A ≥ 0.90, B ≥ 0.50, C below.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.90 {
            ReplayLevel::A
        } else if score >= 0.50 {
            ReplayLevel::B
        } else {
            ReplayLevel::C
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, ReplayLevel::Unset)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayLevel::A => "A",
            ReplayLevel::B => "B",
            ReplayLevel::C => "C",
            ReplayLevel::Unset => "unset",
        }
    }
}

/// Scorer output attached to every sealed artifact
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeterminismReport {
    pub overall_score: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub breakdown: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
