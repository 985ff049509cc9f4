use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kurral_types::Artifact;

/// Index entry mirrored for every stored artifact.
///
/// Keeps run-id lookup and tenant listing O(1) without opening payload files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub kurral_id: Uuid,
    pub run_id: String,
    #[serde(with = "kurral_types::timestamp")]
    pub created_at: DateTime<Utc>,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub semantic_buckets: Vec<String>,
}

impl IndexRecord {
    pub fn from_artifact(artifact: &Artifact) -> Self {
        Self {
            kurral_id: artifact.kurral_id,
            run_id: artifact.run_id.clone(),
            created_at: artifact.created_at,
            tenant_id: artifact.tenant_id.clone(),
            semantic_buckets: artifact.semantic_buckets.clone(),
        }
    }
}

/// Shape of the sidecar `index.json` at the store root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFile {
    #[serde(default)]
    pub artifacts: Vec<IndexRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl IndexFile {
    /// Insert or replace the record for an artifact id.
    pub fn upsert(&mut self, record: IndexRecord) {
        if let Some(existing) = self
            .artifacts
            .iter_mut()
            .find(|r| r.kurral_id == record.kurral_id)
        {
            *existing = record;
        } else {
            self.artifacts.push(record);
        }
        self.touch();
    }

    pub fn remove(&mut self, id: &Uuid) -> bool {
        let before = self.artifacts.len();
        self.artifacts.retain(|r| r.kurral_id != *id);
        let removed = self.artifacts.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Records ordered newest first.
    pub fn sorted_desc(&self) -> Vec<IndexRecord> {
        let mut records = self.artifacts.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    fn touch(&mut self) {
        self.updated_at =
            Some(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(run: &str, secs: u32) -> IndexRecord {
        IndexRecord {
            kurral_id: Uuid::new_v4(),
            run_id: run.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, secs).unwrap(),
            tenant_id: "tenant-1".to_string(),
            semantic_buckets: vec![],
        }
    }

    #[test]
    fn test_upsert_replaces_same_id() {
        let mut index = IndexFile::default();
        let mut rec = record("run-a", 0);
        index.upsert(rec.clone());
        rec.run_id = "run-b".to_string();
        index.upsert(rec.clone());
        assert_eq!(index.artifacts.len(), 1);
        assert_eq!(index.artifacts[0].run_id, "run-b");
        assert!(index.updated_at.is_some());
    }

    #[test]
    fn test_sorted_desc_newest_first() {
        let mut index = IndexFile::default();
        index.upsert(record("old", 1));
        index.upsert(record("new", 30));
        index.upsert(record("mid", 15));
        let sorted = index.sorted_desc();
        assert_eq!(sorted[0].run_id, "new");
        assert_eq!(sorted[2].run_id, "old");
    }

    #[test]
    fn test_remove() {
        let mut index = IndexFile::default();
        let rec = record("run-a", 0);
        index.upsert(rec.clone());
        assert!(index.remove(&rec.kurral_id));
        assert!(!index.remove(&rec.kurral_id));
        assert!(index.artifacts.is_empty());
    }
}
