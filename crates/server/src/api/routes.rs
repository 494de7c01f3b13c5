use axum::{
    extract::State,
    http::header,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{batch, handlers, jobs, middleware::metrics_middleware, previews, settings, ws};
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Jobs
        .route("/jobs", get(jobs::list_jobs).delete(jobs::clear_all))
        .route("/jobs/ingest", post(jobs::ingest_paths))
        .route("/jobs/upload", post(jobs::upload_files))
        .route("/jobs/clear-completed", post(jobs::clear_completed))
        .route("/jobs/{id}", delete(jobs::remove_job))
        // Settings and destination
        .route(
            "/settings",
            get(settings::get_settings).patch(settings::update_settings),
        )
        .route(
            "/output-dir",
            get(settings::get_output_dir).put(settings::set_output_dir),
        )
        // Conversion
        .route("/batch", post(batch::start_batch))
        // Previews
        .route("/previews", get(previews::preview_status))
        .route("/previews/{id}", get(previews::get_preview))
        // Live updates
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn(metrics_middleware));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /metrics
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
