//! Common test utilities for API testing with a mock engine.
//!
//! This module provides a test fixture that builds the full router in-process
//! around a [`MockEngine`], so endpoints can be exercised without real image
//! files or a HEIF decoder.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use imgbatch_core::{testing::MockEngine, Config, ConversionSession};
use imgbatch_server::api::WsBroadcaster;
use imgbatch_server::state::AppState;

/// Re-export fixtures for test convenience
pub use imgbatch_core::testing::fixtures;

/// Test fixture for API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_ingest() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/jobs/ingest", json!({
///         "paths": ["/photos/a.heic"]
///     })).await;
///
///     assert_eq!(response.status, StatusCode::OK);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    /// Mock engine - configure failures, delays and batch results
    pub engine: Arc<MockEngine>,
    pub session: Arc<ConversionSession>,
    pub ws_broadcaster: WsBroadcaster,
    /// Holds the staging and output directories
    pub temp_dir: TempDir,
    pub output_dir: PathBuf,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Value,
    pub raw: Vec<u8>,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let output_dir = temp_dir.path().join("output");

        let mut config = Config::default();
        config.server.port = 0;
        config.ingest.staging_dir = temp_dir.path().join("staging");
        config.batch.auto_clear_completed = test_config.auto_clear_completed;
        config.preview.max_in_flight = test_config.preview_slots;

        let engine = Arc::new(MockEngine::new());
        let session = Arc::new(ConversionSession::new(engine.clone(), &config));

        let ws_broadcaster = WsBroadcaster::default();
        ws_broadcaster.spawn_forwarder(
            session.registry().subscribe(),
            session.preview().subscribe(),
        );

        let state = Arc::new(AppState::new(
            config,
            session.clone(),
            ws_broadcaster.clone(),
        ));
        let router = imgbatch_server::api::create_router(state);

        Self {
            router,
            engine,
            session,
            ws_broadcaster,
            temp_dir,
            output_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> TestResponse {
        self.request("PATCH", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Upload files as `multipart/form-data`, one `file` field per entry.
    pub async fn upload(&self, path: &str, files: &[(&str, &[u8])]) -> TestResponse {
        let boundary = "imgbatch-test-boundary";
        let mut body = Vec::new();
        for (name, bytes) in files {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                    name
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let raw = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        let body: Value = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            content_type,
            body,
            raw,
        }
    }

    /// Ingests `paths` through the API and returns the new job ids.
    pub async fn ingest(&self, paths: &[&str]) -> Vec<String> {
        let response = self
            .post("/api/v1/jobs/ingest", serde_json::json!({ "paths": paths }))
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.body["jobs"]
            .as_array()
            .expect("jobs array")
            .iter()
            .map(|j| j["id"].as_str().expect("job id").to_string())
            .collect()
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub auto_clear_completed: bool,
    pub preview_slots: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            auto_clear_completed: false,
            preview_slots: 4,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
