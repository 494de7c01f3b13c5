//! API tests for job ingestion, removal and settings.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestFixture;

#[tokio::test]
async fn test_health_reports_engine() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["engine"], "mock");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["engine"]["heif_decoder"], "heif-convert");
    assert_eq!(response.body["preview"]["max_in_flight"], 4);
    assert!(response.body["engine"].get("temp_dir").is_none());
}

#[tokio::test]
async fn test_ingest_skips_unsupported_extensions() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/jobs/ingest",
            json!({ "paths": ["/photos/a.HEIC", "/photos/notes.txt", "/photos/c.jpg"] }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    let jobs = response.body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["name"], "a.HEIC");
    assert_eq!(jobs[0]["format"], "heic");
    assert_eq!(jobs[0]["status"], "pending");
    assert_eq!(jobs[1]["format"], "jpeg");
    assert_eq!(response.body["skipped"], json!(["/photos/notes.txt"]));

    let list = fixture.get("/api/v1/jobs").await;
    assert_status!(list, StatusCode::OK);
    assert_eq!(list.body["jobs"].as_array().unwrap().len(), 2);
    assert_eq!(list.body["pending"], 2);
    assert!(list.body["revision"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_ingest_reports_unreadable_files() {
    let fixture = TestFixture::new().await;
    fixture.engine.fail_analysis("/photos/broken.png").await;

    let response = fixture
        .post(
            "/api/v1/jobs/ingest",
            json!({ "paths": ["/photos/ok.png", "/photos/broken.png"] }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["jobs"].as_array().unwrap().len(), 1);
    let failed = response.body["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["path"], "/photos/broken.png");
}

#[tokio::test]
async fn test_ingest_rejects_empty_and_malformed_bodies() {
    let fixture = TestFixture::new().await;

    let empty = fixture
        .post("/api/v1/jobs/ingest", json!({ "paths": [] }))
        .await;
    assert_status!(empty, StatusCode::BAD_REQUEST);
    assert_eq!(empty.body["error"], "No paths provided");

    let malformed = fixture.post_raw("/api/v1/jobs/ingest", "{not json").await;
    assert_status!(malformed, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_stages_and_ingests_files() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .upload(
            "/api/v1/jobs/upload",
            &[("dropped.png", &b"not really a png"[..]), ("readme.md", &b"# hi"[..])],
        )
        .await;

    assert_status!(response, StatusCode::OK);
    let jobs = response.body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0]["name"].as_str().unwrap().ends_with("_dropped.png"));
    assert_eq!(response.body["skipped"].as_array().unwrap().len(), 1);

    let staged: Vec<_> = std::fs::read_dir(fixture.temp_dir.path().join("staging"))
        .unwrap()
        .collect();
    assert_eq!(staged.len(), 2);
}

#[tokio::test]
async fn test_upload_without_files_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture.upload("/api/v1/jobs/upload", &[]).await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "No files provided");
}

#[tokio::test]
async fn test_remove_job() {
    let fixture = TestFixture::new().await;
    let ids = fixture.ingest(&["/photos/a.png", "/photos/b.png"]).await;

    let response = fixture.delete(&format!("/api/v1/jobs/{}", ids[0])).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["name"], "a.png");

    let again = fixture.delete(&format!("/api/v1/jobs/{}", ids[0])).await;
    assert_status!(again, StatusCode::NOT_FOUND);

    let list = fixture.get("/api/v1/jobs").await;
    let remaining = list.body["jobs"].as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["id"], ids[1].as_str());
}

#[tokio::test]
async fn test_remove_job_with_invalid_id() {
    let fixture = TestFixture::new().await;

    let response = fixture.delete("/api/v1/jobs/not-a-uuid").await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("Invalid job id"));
}

#[tokio::test]
async fn test_clear_all() {
    let fixture = TestFixture::new().await;
    let ids = fixture.ingest(&["/photos/a.png", "/photos/b.heic"]).await;

    let response = fixture.delete("/api/v1/jobs").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["removed"].as_array().unwrap().len(), ids.len());
    let list = fixture.get("/api/v1/jobs").await;
    assert!(list.body["jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_settings_defaults_and_patch() {
    let fixture = TestFixture::new().await;

    let defaults = fixture.get("/api/v1/settings").await;
    assert_status!(defaults, StatusCode::OK);
    assert_eq!(
        defaults.body,
        json!({ "target_format": "jpeg", "quality": 90, "preserve_metadata": true })
    );

    let patched = fixture
        .patch("/api/v1/settings", json!({ "quality": 150 }))
        .await;
    assert_status!(patched, StatusCode::OK);
    assert_eq!(patched.body["quality"], 100);
    assert_eq!(patched.body["target_format"], "jpeg");

    let png = fixture
        .patch(
            "/api/v1/settings",
            json!({ "target_format": "png", "preserve_metadata": false }),
        )
        .await;
    assert_eq!(png.body["target_format"], "png");
    assert_eq!(png.body["preserve_metadata"], false);
    assert_eq!(png.body["quality"], 100);
}

#[tokio::test]
async fn test_settings_patch_rejects_unknown_format() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .patch("/api/v1/settings", json!({ "target_format": "gif" }))
        .await;

    assert!(response.status.is_client_error());
    let settings = fixture.get("/api/v1/settings").await;
    assert_eq!(settings.body["target_format"], "jpeg");
}

#[tokio::test]
async fn test_settings_change_refreshes_pending_estimates() {
    let fixture = TestFixture::new().await;
    fixture.ingest(&["/photos/a.png"]).await;

    let before = fixture.get("/api/v1/jobs").await.body["jobs"][0]["estimated_size"]
        .as_u64()
        .unwrap();
    fixture
        .patch("/api/v1/settings", json!({ "target_format": "png" }))
        .await;
    let after = fixture.get("/api/v1/jobs").await.body["jobs"][0]["estimated_size"]
        .as_u64()
        .unwrap();

    // 4000x3000 at 3.5 bytes per pixel
    assert_eq!(after, 42_000_000);
    assert!(before < after);
}

#[tokio::test]
async fn test_output_dir_roundtrip() {
    let fixture = TestFixture::new().await;

    let initial = fixture.get("/api/v1/output-dir").await;
    assert_status!(initial, StatusCode::OK);
    assert!(initial.body["output_dir"].is_null());

    let dir = fixture.output_dir.to_string_lossy().to_string();
    let set = fixture
        .put("/api/v1/output-dir", json!({ "output_dir": dir }))
        .await;
    assert_status!(set, StatusCode::OK);

    let current = fixture.get("/api/v1/output-dir").await;
    assert_eq!(current.body["output_dir"], dir.as_str());

    let unset = fixture
        .put("/api/v1/output-dir", json!({ "output_dir": null }))
        .await;
    assert_status!(unset, StatusCode::OK);
    assert!(fixture.session.output_dir().is_none());
}

#[tokio::test]
async fn test_output_dir_must_be_absolute() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .put("/api/v1/output-dir", json!({ "output_dir": "relative/out" }))
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(fixture.session.output_dir().is_none());
}
