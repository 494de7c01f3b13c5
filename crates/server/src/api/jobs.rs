//! Job API handlers.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use imgbatch_core::ingest::IngestError;
use imgbatch_core::{ConversionSettings, IngestReport, Job, JobId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::handlers::{api_error, parse_job_id, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Read model for the job list view.
#[derive(Debug, Serialize)]
pub struct JobsResponse {
    /// Increases with every registry mutation.
    pub revision: u64,
    pub jobs: Vec<Job>,
    pub settings: ConversionSettings,
    pub output_dir: Option<PathBuf>,
    pub pending: usize,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub removed: Vec<JobId>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<JobsResponse> {
    let session = state.session();
    let snapshot = session.registry().snapshot();
    let pending = snapshot.pending().len();

    Json(JobsResponse {
        revision: snapshot.revision,
        jobs: snapshot.jobs,
        settings: snapshot.settings,
        output_dir: session.output_dir(),
        pending,
    })
}

/// POST /api/v1/jobs/ingest
///
/// Ingests files already on the server's filesystem. Unsupported or
/// unreadable paths are reported, never fatal.
pub async fn ingest_paths(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestRequest>,
) -> Result<Json<IngestReport>, ApiError> {
    if body.paths.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No paths provided"));
    }

    let report = state.session().ingest(body.paths).await;
    Ok(Json(report))
}

/// POST /api/v1/jobs/upload
///
/// Drag-and-drop payloads as multipart file fields. Each field is staged to
/// disk and the whole upload is ingested as one batch.
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, ApiError> {
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    format!("Malformed multipart body: {}", e),
                ))
            }
        };

        let Some(name) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(|e| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("Failed to read {}: {}", name, e),
            )
        })?;
        files.push((name, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No files provided"));
    }

    info!(count = files.len(), "Received dropped files");

    match state.session().ingest_dropped(files).await {
        Ok(report) => Ok(Json(report)),
        Err(e @ IngestError::InvalidName { .. }) => {
            Err(api_error(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// DELETE /api/v1/jobs/{id}
pub async fn remove_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let id = parse_job_id(&id)?;

    state
        .session()
        .remove_job(id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Job not found: {}", id)))
}

/// POST /api/v1/jobs/clear-completed
pub async fn clear_completed(State(state): State<Arc<AppState>>) -> Json<ClearedResponse> {
    Json(ClearedResponse {
        removed: state.session().clear_completed().await,
    })
}

/// DELETE /api/v1/jobs
pub async fn clear_all(State(state): State<Arc<AppState>>) -> Json<ClearedResponse> {
    Json(ClearedResponse {
        removed: state.session().clear_all().await,
    })
}
