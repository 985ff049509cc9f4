pub mod cache;
pub mod cancel;
pub mod error;
pub mod sanitize;
pub mod scorer;

pub use cache::{CacheBackend, CacheEntry, CacheStats, MemoryCache, SqliteCache, ToolStub};
pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use sanitize::{sanitize_value, DEFAULT_SANITIZE_DEPTH};
pub use scorer::{DeterminismScorer, ScoreWeights};

use kurral_types::{Artifact, OpenArtifact};

/// Score an open artifact and seal it in one step.
///
/// This is the sealing entry point used by the capture pipeline and by
/// fixtures: the scorer produces the determinism report, sealing derives the
/// replay level from it and freezes the artifact.
pub fn seal_scored(open: OpenArtifact) -> Result<Artifact> {
    let scorer = DeterminismScorer::new();
    let report = scorer.score_open(&open);
    Ok(open.seal(report)?)
}
