//! Local filesystem backend.
//!
//! One canonical-JSON file per artifact (`<store>/<id>.kurral`), written
//! atomically: temp file in the same directory, fsync, rename. A sidecar
//! `index.json` mirrors listing metadata and is only touched under an
//! exclusive lock on `index.lock`; payload files need no locking because
//! the rename is the commit point.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::index::{IndexFile, IndexRecord};
use crate::ArtifactStore;
use kurral_types::Artifact;

/// Artifact payload file extension.
pub const ARTIFACT_EXT: &str = "kurral";

const INDEX_FILE: &str = "index.json";
const LOCK_FILE: &str = "index.lock";

pub struct LocalStore {
    root: PathBuf,
}

struct IndexLock {
    file: File,
}

impl IndexLock {
    fn exclusive(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.lock()?;
        Ok(Self { file })
    }

    fn shared(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.lock_shared()?;
        Ok(Self { file })
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Write bytes atomically: temp sibling, fsync, rename. The temp file is
/// unlinked if any step fails.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::StorageUnavailable(format!("{} has no parent", path.display())))?;
    let temp = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Uuid::new_v4().simple()
    ));

    let write_result = (|| -> Result<()> {
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp, path)?;
        Ok(())
    })();

    if write_result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    write_result
}

impl LocalStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Default store location under the user's home directory.
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kurral")
            .join("artifacts")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, id: &Uuid) -> PathBuf {
        self.root.join(format!("{}.{}", id, ARTIFACT_EXT))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    fn read_index(&self) -> Result<IndexFile> {
        match fs::read(self.index_path()) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(IndexFile::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_index(&self, index: &IndexFile) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(index)?;
        atomic_write(&self.index_path(), &bytes)
    }

    /// Rebuild `index.json` by scanning payload files. Used when the sidecar
    /// is missing or out of step with the directory contents.
    pub fn rebuild_index(&self) -> Result<usize> {
        let _lock = IndexLock::exclusive(&self.lock_path())?;
        let mut index = IndexFile::default();
        for entry in WalkDir::new(&self.root).max_depth(1) {
            let entry = entry.map_err(|err| Error::StorageUnavailable(err.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXT) {
                continue;
            }
            let bytes = fs::read(path)?;
            match Artifact::from_json(&bytes) {
                Ok(artifact) => index.upsert(IndexRecord::from_artifact(&artifact)),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable artifact");
                }
            }
        }
        let count = index.artifacts.len();
        self.write_index(&index)?;
        Ok(count)
    }

    /// Load every artifact in the store, newest first.
    pub fn load_all(&self) -> Result<Vec<Artifact>> {
        let records = self.list()?;
        records
            .iter()
            .map(|record| self.load(&record.kurral_id))
            .collect()
    }
}

impl ArtifactStore for LocalStore {
    fn save(&self, artifact: &Artifact) -> Result<String> {
        let path = self.artifact_path(&artifact.kurral_id);
        let payload = artifact.to_canonical_json()?;
        atomic_write(&path, payload.as_bytes())?;

        let _lock = IndexLock::exclusive(&self.lock_path())?;
        let mut index = self.read_index()?;
        index.upsert(IndexRecord::from_artifact(artifact));
        self.write_index(&index)?;

        Ok(format!("file://{}", path.display()))
    }

    fn load(&self, id: &Uuid) -> Result<Artifact> {
        let path = self.artifact_path(id);
        let bytes = fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(id.to_string())
            } else {
                err.into()
            }
        })?;
        Ok(Artifact::from_json(&bytes)?)
    }

    fn exists(&self, id: &Uuid) -> Result<bool> {
        Ok(self.artifact_path(id).exists())
    }

    fn delete(&self, id: &Uuid) -> Result<()> {
        let path = self.artifact_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(id.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        let _lock = IndexLock::exclusive(&self.lock_path())?;
        let mut index = self.read_index()?;
        index.remove(id);
        self.write_index(&index)
    }

    fn list(&self) -> Result<Vec<IndexRecord>> {
        let _lock = IndexLock::shared(&self.lock_path())?;
        Ok(self.read_index()?.sorted_desc())
    }

    fn find_by_run_id(&self, run_id: &str) -> Result<Option<IndexRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|record| record.run_id == run_id))
    }

    fn latest(&self) -> Result<Option<IndexRecord>> {
        Ok(self.list()?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurral_types::{DeterminismReport, OpenArtifact};
    use serde_json::json;

    fn sealed(run_id: &str) -> Artifact {
        let mut open = OpenArtifact::new(run_id, "tenant-1");
        open.inputs = json!({"q": "hello"});
        open.outputs = json!({"full_text": "hi"});
        open.semantic_buckets = vec!["refund_flow".to_string()];
        open.seal(DeterminismReport::default()).unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let artifact = sealed("run-1");
        let uri = store.save(&artifact).unwrap();
        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with(&format!("{}.kurral", artifact.kurral_id)));
        let loaded = store.load(&artifact.kurral_id).unwrap();
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn test_index_mirrors_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let a = sealed("run-a");
        let b = sealed("run-b");
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 2);
        let found = store.find_by_run_id("run-a").unwrap().unwrap();
        assert_eq!(found.kurral_id, a.kurral_id);
        assert_eq!(found.semantic_buckets, vec!["refund_flow"]);
    }

    #[test]
    fn test_resave_does_not_duplicate_index_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let artifact = sealed("run-1");
        store.save(&artifact).unwrap();
        store.save(&artifact).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load(&Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_removes_payload_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let artifact = sealed("run-1");
        store.save(&artifact).unwrap();
        store.delete(&artifact.kurral_id).unwrap();
        assert!(!store.exists(&artifact.kurral_id).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_index_from_payload_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let artifact = sealed("run-1");
        store.save(&artifact).unwrap();
        fs::remove_file(store.index_path()).unwrap();

        assert_eq!(store.rebuild_index().unwrap(), 1);
        let found = store.find_by_run_id("run-1").unwrap().unwrap();
        assert_eq!(found.kurral_id, artifact.kurral_id);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.save(&sealed("run-1")).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
