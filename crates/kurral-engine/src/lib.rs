pub mod ab;
pub mod answer;
pub mod ars;
pub mod diff;
pub mod error;
pub mod replay;

pub use ab::{
    model_migration, AbFailure, AbPairScore, AbTestEngine, AbTestResult, Recommendation,
    VersionConfig,
};
pub use answer::{answer_key, final_answer};
pub use ars::{
    is_side_effect_tool, lcs_ratio, ArsBreakdown, ArsCalculator, ArsPairResult, ArsWeights,
    BatchArsCalculator, BatchArsResult, DEFAULT_ARS_THRESHOLD,
};
pub use diff::{compute_diff, structural_match, ModifiedEntry, OutputDiff};
pub use error::{Error, Result};
pub use replay::{
    BatchReplayEngine, ReplayEngine, ReplayLlmState, ReplayMetadata, ReplayOverrides,
    ReplayResult, ReplayValidation,
};
