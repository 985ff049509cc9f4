mod api;
mod fs;
mod memory;

pub mod error;
pub mod index;

pub use api::{object_storage_key, ApiStore};
pub use error::{Error, Result};
pub use fs::{LocalStore, ARTIFACT_EXT};
pub use index::{IndexFile, IndexRecord};
pub use memory::{MemoryStore, DEFAULT_MAX_ARTIFACTS, DEFAULT_MAX_BYTES};

use std::path::PathBuf;

use uuid::Uuid;

use kurral_types::Artifact;

/// Key-value facade over artifact persistence.
///
/// Payload writes are atomic; listing goes through the mirrored index so no
/// payload file is opened for metadata queries.
pub trait ArtifactStore: Send + Sync {
    /// Persist a sealed artifact. Returns a backend-specific URI.
    fn save(&self, artifact: &Artifact) -> Result<String>;
    fn load(&self, id: &Uuid) -> Result<Artifact>;
    fn exists(&self, id: &Uuid) -> Result<bool>;
    fn delete(&self, id: &Uuid) -> Result<()>;
    /// Index records, newest first.
    fn list(&self) -> Result<Vec<IndexRecord>>;
    fn find_by_run_id(&self, run_id: &str) -> Result<Option<IndexRecord>>;
    fn latest(&self) -> Result<Option<IndexRecord>>;
}

/// Storage backend selection resolved from configuration
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Local(PathBuf),
    Memory,
    Api { base_url: String, api_key: String },
}

/// Open the configured backend.
pub fn open_store(backend: StoreBackend) -> Result<Box<dyn ArtifactStore>> {
    match backend {
        StoreBackend::Local(path) => Ok(Box::new(LocalStore::open(path)?)),
        StoreBackend::Memory => Ok(Box::new(MemoryStore::default())),
        StoreBackend::Api { base_url, api_key } => Ok(Box::new(ApiStore::new(base_url, api_key)?)),
    }
}
