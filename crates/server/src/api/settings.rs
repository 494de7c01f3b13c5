//! Conversion settings and output directory.

use axum::{extract::State, http::StatusCode, Json};
use imgbatch_core::{ConversionSettings, SettingsUpdate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct OutputDirBody {
    pub output_dir: Option<PathBuf>,
}

/// GET /api/v1/settings
pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<ConversionSettings> {
    Json(state.session().registry().settings())
}

/// PATCH /api/v1/settings
///
/// Quality is clamped to 1-100. Batches already submitted keep the settings
/// they were started with.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Json<ConversionSettings> {
    Json(state.session().update_settings(update))
}

/// GET /api/v1/output-dir
pub async fn get_output_dir(State(state): State<Arc<AppState>>) -> Json<OutputDirBody> {
    Json(OutputDirBody {
        output_dir: state.session().output_dir(),
    })
}

/// PUT /api/v1/output-dir
///
/// `null` unsets the directory. Relative paths are rejected since they would
/// resolve against the server's working directory.
pub async fn set_output_dir(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OutputDirBody>,
) -> Result<Json<OutputDirBody>, ApiError> {
    if let Some(dir) = &body.output_dir {
        if dir.as_os_str().is_empty() || dir.is_relative() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("Output directory must be an absolute path: {}", dir.display()),
            ));
        }
    }

    state.session().set_output_dir(body.output_dir.clone());
    Ok(Json(body))
}
