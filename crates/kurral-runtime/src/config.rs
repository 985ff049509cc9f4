//! Environment-driven runtime configuration.
//!
//! The core only reads these variables; it never writes them back.

use std::path::PathBuf;

use kurral_store::StoreBackend;

use crate::error::{Error, Result};

/// Storage backend selector: `KURRAL_STORAGE`.
pub const ENV_STORAGE: &str = "KURRAL_STORAGE";
/// Local store root override: `KURRAL_STORAGE_PATH`.
pub const ENV_STORAGE_PATH: &str = "KURRAL_STORAGE_PATH";
/// Metadata-service base URL: `KURRAL_API_URL`.
pub const ENV_API_URL: &str = "KURRAL_API_URL";
/// Metadata-service credential (opaque pass-through): `KURRAL_API_KEY`.
pub const ENV_API_KEY: &str = "KURRAL_API_KEY";
/// Debug logging toggle: `KURRAL_DEBUG`.
pub const ENV_DEBUG: &str = "KURRAL_DEBUG";
/// External trace-service enrichment toggle: `KURRAL_TRACE_SERVICE`.
pub const ENV_TRACE_SERVICE: &str = "KURRAL_TRACE_SERVICE";

const DEFAULT_API_URL: &str = "https://api.kurral.io";

/// Which backend persists captured artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageChoice {
    Local,
    Memory,
    Api,
    /// User-managed bucket fronted by the same metadata-service contract.
    CustomBucket,
}

impl StorageChoice {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "local" => Ok(StorageChoice::Local),
            "memory" => Ok(StorageChoice::Memory),
            "api" => Ok(StorageChoice::Api),
            "custom-bucket" => Ok(StorageChoice::CustomBucket),
            other => Err(Error::Config(format!(
                "{} must be one of local|memory|api|custom-bucket, got {:?}",
                ENV_STORAGE, other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageChoice,
    pub storage_path: PathBuf,
    pub api_url: String,
    pub api_key: Option<String>,
    pub debug: bool,
    pub trace_service: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageChoice::Local,
            storage_path: kurral_store::LocalStore::default_root(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            debug: false,
            trace_service: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|raw| matches!(raw.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl Config {
    /// Resolve configuration from `KURRAL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ENV_STORAGE) {
            config.storage = StorageChoice::parse(&raw)?;
        }
        if let Ok(raw) = std::env::var(ENV_STORAGE_PATH) {
            config.storage_path = PathBuf::from(raw);
        }
        if let Ok(raw) = std::env::var(ENV_API_URL) {
            config.api_url = raw;
        }
        config.api_key = std::env::var(ENV_API_KEY).ok();
        config.debug = env_flag(ENV_DEBUG);
        config.trace_service = env_flag(ENV_TRACE_SERVICE);
        Ok(config)
    }

    /// The primary store this configuration selects.
    pub fn store_backend(&self) -> Result<StoreBackend> {
        match self.storage {
            StorageChoice::Local => Ok(StoreBackend::Local(self.storage_path.clone())),
            StorageChoice::Memory => Ok(StoreBackend::Memory),
            StorageChoice::Api | StorageChoice::CustomBucket => {
                let api_key = self.api_key.clone().ok_or_else(|| {
                    Error::Config(format!("{} is required for api storage", ENV_API_KEY))
                })?;
                Ok(StoreBackend::Api {
                    base_url: self.api_url.clone(),
                    api_key,
                })
            }
        }
    }

    /// The local fallback used when the metadata service is unreachable.
    pub fn fallback_backend(&self) -> StoreBackend {
        StoreBackend::Local(self.storage_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_choice_parse() {
        assert_eq!(StorageChoice::parse("local").unwrap(), StorageChoice::Local);
        assert_eq!(StorageChoice::parse("memory").unwrap(), StorageChoice::Memory);
        assert_eq!(StorageChoice::parse("api").unwrap(), StorageChoice::Api);
        assert_eq!(
            StorageChoice::parse("custom-bucket").unwrap(),
            StorageChoice::CustomBucket
        );
        assert!(StorageChoice::parse("redis").is_err());
    }

    #[test]
    fn test_api_backend_requires_key() {
        let config = Config {
            storage: StorageChoice::Api,
            api_key: None,
            ..Config::default()
        };
        assert!(matches!(config.store_backend(), Err(Error::Config(_))));

        let with_key = Config {
            storage: StorageChoice::Api,
            api_key: Some("k".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            with_key.store_backend().unwrap(),
            StoreBackend::Api { .. }
        ));
    }
}
