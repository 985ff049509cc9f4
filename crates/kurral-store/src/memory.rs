//! In-memory backend with LRU eviction.
//!
//! Serves tests and high-speed replay loops. Count and byte caps bound the
//! footprint; the least recently used artifact is evicted first.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::index::IndexRecord;
use crate::ArtifactStore;
use kurral_types::Artifact;

/// Default cap on stored artifacts.
pub const DEFAULT_MAX_ARTIFACTS: usize = 1000;

/// Default cap on total serialized bytes (500 MB).
pub const DEFAULT_MAX_BYTES: usize = 500 * 1024 * 1024;

struct StoredArtifact {
    payload: String,
    record: IndexRecord,
    size: usize,
    last_access: u64,
}

struct Inner {
    entries: HashMap<Uuid, StoredArtifact>,
    total_bytes: usize,
    clock: u64,
}

pub struct MemoryStore {
    max_artifacts: usize,
    max_bytes: usize,
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ARTIFACTS, DEFAULT_MAX_BYTES)
    }
}

impl MemoryStore {
    pub fn new(max_artifacts: usize, max_bytes: usize) -> Self {
        Self {
            max_artifacts,
            max_bytes,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                total_bytes: 0,
                clock: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_for(inner: &mut Inner, incoming_bytes: usize, max_artifacts: usize, max_bytes: usize) {
        while !inner.entries.is_empty()
            && (inner.entries.len() >= max_artifacts
                || inner.total_bytes + incoming_bytes > max_bytes)
        {
            let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, stored)| stored.last_access)
                .map(|(id, _)| *id)
            else {
                break;
            };
            if let Some(evicted) = inner.entries.remove(&oldest) {
                inner.total_bytes -= evicted.size;
            }
        }
    }
}

impl ArtifactStore for MemoryStore {
    fn save(&self, artifact: &Artifact) -> Result<String> {
        let payload = artifact.to_canonical_json()?;
        let size = payload.len();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = inner.entries.remove(&artifact.kurral_id) {
            inner.total_bytes -= existing.size;
        }
        Self::evict_for(&mut inner, size, self.max_artifacts, self.max_bytes);

        inner.clock += 1;
        let last_access = inner.clock;
        inner.total_bytes += size;
        inner.entries.insert(
            artifact.kurral_id,
            StoredArtifact {
                payload,
                record: IndexRecord::from_artifact(artifact),
                size,
                last_access,
            },
        );
        Ok(format!("memory://{}", artifact.kurral_id))
    }

    fn load(&self, id: &Uuid) -> Result<Artifact> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.clock += 1;
        let clock = inner.clock;
        let stored = inner
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        stored.last_access = clock;
        Ok(Artifact::from_json(stored.payload.as_bytes())?)
    }

    fn exists(&self, id: &Uuid) -> Result<bool> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.entries.contains_key(id))
    }

    fn delete(&self, id: &Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let removed = inner
            .entries
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        inner.total_bytes -= removed.size;
        Ok(())
    }

    fn list(&self) -> Result<Vec<IndexRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut records: Vec<IndexRecord> = inner
            .entries
            .values()
            .map(|stored| stored.record.clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
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
