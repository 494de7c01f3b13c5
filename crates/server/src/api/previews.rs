//! Preview API handlers.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use imgbatch_core::preview::PreviewSnapshot;
use imgbatch_core::PreviewState;
use std::sync::Arc;
use tracing::warn;

use super::handlers::{api_error, parse_job_id, ApiError};
use crate::state::AppState;

/// GET /api/v1/previews
pub async fn preview_status(State(state): State<Arc<AppState>>) -> Json<PreviewSnapshot> {
    Json(state.session().preview().snapshot().await)
}

/// GET /api/v1/previews/{id}
///
/// Serves the generated JPEG once ready. Otherwise returns the preview state
/// as JSON: 202 while queued or loading, 200 when no preview will follow.
pub async fn get_preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&id)?;
    let session = state.session();

    if session.registry().get(id).is_none() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", id),
        ));
    }

    match session.preview().state(id).await {
        PreviewState::Ready { path } => match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response()),
            Err(e) => {
                warn!(job_id = %id, path = %path.display(), "Preview file unreadable: {}", e);
                Err(api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Preview file unreadable: {}", e),
                ))
            }
        },
        pending @ (PreviewState::Queued | PreviewState::Loading) => {
            Ok((StatusCode::ACCEPTED, Json(pending)).into_response())
        }
        other => Ok(Json(other).into_response()),
    }
}
