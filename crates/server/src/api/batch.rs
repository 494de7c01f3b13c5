use axum::{extract::State, http::StatusCode, Json};
use imgbatch_core::{BatchReport, DispatchError};
use std::sync::Arc;

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

/// POST /api/v1/batch
///
/// Converts every pending job and responds once the batch has been
/// reconciled. Per-job progress is streamed over the WebSocket meanwhile.
pub async fn start_batch(State(state): State<Arc<AppState>>) -> Result<Json<BatchReport>, ApiError> {
    match state.session().dispatch().await {
        Ok(report) => Ok(Json(report)),
        Err(e @ DispatchError::NoOutputDirectory) => {
            Err(api_error(StatusCode::CONFLICT, e.to_string()))
        }
        Err(e @ DispatchError::Interrupted(_)) => {
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
