//! Metadata-service backend.
//!
//! The external artifact service is treated as opaque durable storage: the
//! canonical artifact JSON goes up wrapped in `{artifact_data: ...}` and
//! comes back verbatim. Authentication is the `kurral` header.

use std::time::Duration;

use chrono::Datelike;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::index::IndexRecord;
use crate::ArtifactStore;
use kurral_types::Artifact;

const UPLOAD_PATH: &str = "/api/v1/artifacts/upload";
const ARTIFACTS_PATH: &str = "/api/v1/artifacts";
const AUTH_HEADER: &str = "kurral";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[allow(dead_code)]
    kurral_id: Uuid,
    object_storage_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    artifacts: Vec<IndexRecord>,
}

pub struct ApiStore {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl ApiStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn check(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(response.url().to_string()));
        }
        if !status.is_success() {
            let detail = response
                .text()
                .unwrap_or_else(|_| "no response body".to_string());
            return Err(Error::StorageUnavailable(format!(
                "metadata service returned {}: {}",
                status, detail
            )));
        }
        Ok(response)
    }
}

/// Object-storage key layout used by the service: `tenant/YYYY/MM/<id>.kurral`.
pub fn object_storage_key(artifact: &Artifact) -> String {
    format!(
        "{}/{:04}/{:02}/{}.kurral",
        artifact.tenant_id,
        artifact.created_at.year(),
        artifact.created_at.month(),
        artifact.kurral_id
    )
}

impl ArtifactStore for ApiStore {
    fn save(&self, artifact: &Artifact) -> Result<String> {
        let artifact_value = serde_json::to_value(artifact).map_err(Error::Json)?;
        let response = self
            .client
            .post(self.url(UPLOAD_PATH))
            .header(AUTH_HEADER, &self.api_key)
            .json(&json!({ "artifact_data": artifact_value }))
            .send()?;
        let response = Self::check(response)?;
        let body: UploadResponse = response.json()?;
        Ok(body
            .object_storage_uri
            .unwrap_or_else(|| format!("api://{}", object_storage_key(artifact))))
    }

    fn load(&self, id: &Uuid) -> Result<Artifact> {
        let response = self
            .client
            .get(self.url(&format!("{}/{}", ARTIFACTS_PATH, id)))
            .header(AUTH_HEADER, &self.api_key)
            .send()?;
        let response = Self::check(response)?;
        let value: serde_json::Value = response.json()?;
        Ok(Artifact::from_value(value)?)
    }

    fn exists(&self, id: &Uuid) -> Result<bool> {
        match self.load(id) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn delete(&self, _id: &Uuid) -> Result<()> {
        // The metadata-service contract has no delete endpoint.
        Err(Error::StorageUnavailable(
            "metadata service does not support delete".to_string(),
        ))
    }

    fn list(&self) -> Result<Vec<IndexRecord>> {
        let response = self
            .client
            .get(self.url(ARTIFACTS_PATH))
            .header(AUTH_HEADER, &self.api_key)
            .send()?;
        let response = Self::check(response)?;
        let body: ListResponse = response.json()?;
        let mut records = body.artifacts;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn find_by_run_id(&self, run_id: &str) -> Result<Option<IndexRecord>> {
        let response = self
            .client
            .get(self.url(ARTIFACTS_PATH))
            .header(AUTH_HEADER, &self.api_key)
            .query(&[("run_id", run_id)])
            .send()?;
        let response = Self::check(response)?;
        let body: ListResponse = response.json()?;
        Ok(body
            .artifacts
            .into_iter()
            .find(|record| record.run_id == run_id))
    }

    fn latest(&self) -> Result<Option<IndexRecord>> {
        Ok(self.list()?.into_iter().next())
    }
}
