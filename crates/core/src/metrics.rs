//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Ingestion (files accepted, skipped, failed)
//! - Previews (requests by outcome, slots in use)
//! - Batches (submissions, per-item conversions, duration)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Ingestion
// =============================================================================

/// Files seen by ingestion, by result.
pub static FILES_INGESTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "imgbatch_files_ingested_total",
            "Total candidate files processed by ingestion",
        ),
        &["result"], // "accepted", "skipped", "failed"
    )
    .unwrap()
});

// =============================================================================
// Previews
// =============================================================================

/// Preview requests by result.
pub static PREVIEW_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "imgbatch_preview_requests_total",
            "Total preview generation requests",
        ),
        &["result"], // "ready", "failed", "discarded"
    )
    .unwrap()
});

/// Preview requests currently outstanding.
pub static PREVIEWS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "imgbatch_previews_in_flight",
        "Preview requests currently outstanding",
    )
    .unwrap()
});

// =============================================================================
// Batches
// =============================================================================

/// Batch submissions by result.
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("imgbatch_batches_total", "Total batch submissions"),
        &["result"], // "submitted", "rejected"
    )
    .unwrap()
});

/// Per-item conversion outcomes.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("imgbatch_conversions_total", "Total per-image conversions"),
        &["result"], // "completed", "failed", "missing"
    )
    .unwrap()
});

/// Wall time of one batch, submission to reconciliation.
pub static BATCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "imgbatch_batch_duration_seconds",
            "Duration of batch conversions",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(FILES_INGESTED.clone()),
        Box::new(PREVIEW_REQUESTS.clone()),
        Box::new(PREVIEWS_IN_FLIGHT.clone()),
        Box::new(BATCHES_TOTAL.clone()),
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(BATCH_DURATION.clone()),
    ]
}
