use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use kurral_engine::{ArsCalculator, ReplayEngine, ReplayOverrides, ReplayResult};
use kurral_runtime::{CaptureOptions, CaptureOutcome, CapturePipeline, Config};
use kurral_store::{ArtifactStore, IndexRecord, LocalStore};
use kurral_types::Artifact;

use crate::error::{Error, Result};

/// One connection to a Kurral artifact store plus the capture pipeline
/// feeding it.
pub struct Client {
    pipeline: Arc<CapturePipeline>,
    store: Arc<LocalStore>,
    engine: ReplayEngine,
}

impl Client {
    /// Connect to the store at `path` with default configuration.
    pub fn connect(path: impl Into<PathBuf>) -> Result<Self> {
        let config = Config {
            storage_path: path.into(),
            ..Config::default()
        };
        Self::with_config(config)
    }

    /// Resolve everything from `KURRAL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config = Config::from_env().map_err(|e| Error::Internal(e.into()))?;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let pipeline = CapturePipeline::new(config).map_err(|e| Error::Internal(e.into()))?;
        let store = pipeline.local_store();
        Ok(Self {
            pipeline: Arc::new(pipeline),
            store,
            engine: ReplayEngine::new(),
        })
    }

    pub fn pipeline(&self) -> &CapturePipeline {
        &self.pipeline
    }

    pub fn store(&self) -> Arc<LocalStore> {
        self.store.clone()
    }

    /// Capture a synchronous agent run.
    pub fn capture<F>(&self, opts: CaptureOptions, agent: F) -> Result<CaptureOutcome>
    where
        F: FnOnce(&kurral_runtime::CaptureHandle) -> anyhow::Result<serde_json::Value>,
    {
        self.pipeline
            .capture(opts, agent)
            .map_err(|e| Error::Internal(e.into()))
    }

    pub fn list(&self) -> Result<Vec<IndexRecord>> {
        self.store.list().map_err(|e| Error::Internal(e.into()))
    }

    pub fn artifact(&self, id: Uuid) -> ArtifactHandle {
        ArtifactHandle {
            store: self.store.clone(),
            engine: ReplayEngine::new(),
            id,
        }
    }

    /// Resolve a run id to its artifact handle.
    pub fn find_run(&self, run_id: &str) -> Result<ArtifactHandle> {
        let record = self
            .store
            .find_by_run_id(run_id)
            .map_err(|e| Error::Internal(e.into()))?
            .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))?;
        Ok(self.artifact(record.kurral_id))
    }

    /// The most recently captured artifact.
    pub fn latest(&self) -> Result<ArtifactHandle> {
        let record = self
            .store
            .latest()
            .map_err(|e| Error::Internal(e.into()))?
            .ok_or_else(|| Error::NotFound("store is empty".to_string()))?;
        Ok(self.artifact(record.kurral_id))
    }

    /// ARS between two stored artifacts.
    pub fn compare(&self, baseline: Uuid, candidate: Uuid) -> Result<f64> {
        let baseline = self.artifact(baseline).load()?;
        let candidate = self.artifact(candidate).load()?;
        Ok(ArsCalculator::new().calculate(&baseline, &candidate))
    }

    /// Canonical replay of a stored artifact.
    pub fn replay(&self, id: Uuid) -> Result<ReplayResult> {
        let artifact = self.artifact(id).load()?;
        self.engine
            .replay(&artifact, &ReplayOverrides::default())
            .map_err(|e| Error::Internal(e.into()))
    }
}

pub struct ArtifactHandle {
    store: Arc<LocalStore>,
    engine: ReplayEngine,
    id: Uuid,
}

impl ArtifactHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn load(&self) -> Result<Artifact> {
        match self.store.load(&self.id) {
            Ok(artifact) => Ok(artifact),
            Err(kurral_store::Error::NotFound(msg)) => Err(Error::NotFound(msg)),
            Err(err) => Err(Error::Internal(err.into())),
        }
    }

    pub fn replay(&self, overrides: &ReplayOverrides) -> Result<ReplayResult> {
        let artifact = self.load()?;
        self.engine
            .replay(&artifact, overrides)
            .map_err(|e| Error::Internal(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capture_then_replay_through_facade() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::connect(dir.path()).unwrap();

        let outcome = client
            .capture(CaptureOptions::new("tenant-1"), |_handle| {
                Ok(json!({"full_text": "hi"}))
            })
            .unwrap();

        let result = client.replay(outcome.artifact.kurral_id).unwrap();
        assert!(result.matched);
        assert_eq!(result.outputs["full_text"], "hi");
    }

    #[test]
    fn test_find_run_and_latest() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::connect(dir.path()).unwrap();
        let store = client.store();
        let artifacts = kurral_testing::seed_store(&store, 3).unwrap();

        let by_run = client.find_run("run-1").unwrap();
        assert_eq!(by_run.id(), artifacts[1].kurral_id);
        assert!(matches!(
            client.find_run("run-nope"),
            Err(Error::NotFound(_))
        ));

        let latest = client.latest().unwrap().load().unwrap();
        assert_eq!(latest.run_id, "run-2");
    }

    #[test]
    fn test_compare_identical_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::connect(dir.path()).unwrap();
        let artifact = kurral_testing::ArtifactFixture::new("run-a").seal();
        client.store().save(&artifact).unwrap();
        let score = client
            .compare(artifact.kurral_id, artifact.kurral_id)
            .unwrap();
        assert_eq!(score, 1.0);
    }
}
