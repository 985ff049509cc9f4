//! Metadata-service client against a mocked HTTP server.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kurral_store::{ApiStore, ArtifactStore};
use kurral_types::{Artifact, DeterminismReport, OpenArtifact};

fn sealed(run_id: &str) -> Artifact {
    let mut open = OpenArtifact::new(run_id, "tenant-1");
    open.outputs = json!({"full_text": "hi"});
    open.seal(DeterminismReport::default()).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upload_wraps_artifact_data_and_sends_auth_header() {
    let server = MockServer::start().await;
    let artifact = sealed("run-api");

    Mock::given(method("POST"))
        .and(path("/api/v1/artifacts/upload"))
        .and(header("kurral", "secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kurral_id": artifact.kurral_id,
            "object_storage_uri": format!("r2://bucket/{}.kurral", artifact.kurral_id),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let moved = artifact.clone();
    let saved = tokio::task::spawn_blocking(move || {
        let store = ApiStore::new(uri, "secret-key").unwrap();
        store.save(&moved)
    })
    .await
    .unwrap()
    .unwrap();
    assert!(saved.starts_with("r2://bucket/"));

    // Body shape: the canonical artifact wrapped in artifact_data.
    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body["artifact_data"]["kurral_id"],
        json!(artifact.kurral_id.to_string())
    );
    assert_eq!(body["artifact_data"]["run_id"], "run-api");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_load_roundtrip() {
    let server = MockServer::start().await;
    let artifact = sealed("run-load");

    Mock::given(method("GET"))
        .and(path(format!("/api/v1/artifacts/{}", artifact.kurral_id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::to_value(&artifact).unwrap()),
        )
        .mount(&server)
        .await;

    let uri = server.uri();
    let id = artifact.kurral_id;
    let loaded = tokio::task::spawn_blocking(move || {
        let store = ApiStore::new(uri, "k").unwrap();
        store.load(&id)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(loaded, artifact);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_service_is_storage_unavailable() {
    let result = tokio::task::spawn_blocking(|| {
        let store = ApiStore::new("http://127.0.0.1:9", "k").unwrap();
        store.list()
    })
    .await
    .unwrap();
    assert!(matches!(
        result,
        Err(kurral_store::Error::StorageUnavailable(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_artifact_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let uri = server.uri();
    let result = tokio::task::spawn_blocking(move || {
        let store = ApiStore::new(uri, "k").unwrap();
        store.load(&uuid::Uuid::new_v4())
    })
    .await
    .unwrap();
    assert!(matches!(result, Err(kurral_store::Error::NotFound(_))));
}
