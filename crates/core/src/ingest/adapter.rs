//! Turns candidate file paths into pending jobs.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::IngestConfig;
use crate::engine::{extension_of, normalize_format, EngineError, ImageEngine, SUPPORTED_EXTENSIONS};
use crate::job::{Job, JobId, JobRegistry};
use crate::metrics;

/// Errors from staging dropped payloads. Ingestion itself never fails.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid file name: {name:?}")]
    InvalidName { name: String },

    #[error("Failed to stage {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A candidate the engine could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Jobs appended to the registry, in input order.
    pub jobs: Vec<Job>,
    /// Candidates with an unsupported extension.
    pub skipped: Vec<PathBuf>,
    /// Candidates whose probe failed.
    pub failed: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|j| j.id).collect()
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: IngestReport) {
        self.jobs.extend(other.jobs);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }
}

/// Whether `path` has an extension ingestion accepts.
pub fn is_supported(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Ingestion adapter.
///
/// Probes every accepted path through the engine and appends the survivors to
/// the registry in a single `add`.
pub struct Ingestor {
    engine: Arc<dyn ImageEngine>,
    registry: Arc<dyn JobRegistry>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        engine: Arc<dyn ImageEngine>,
        registry: Arc<dyn JobRegistry>,
        config: IngestConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingests candidate paths.
    ///
    /// Unsupported extensions are skipped silently and per-file probe failures
    /// drop only that file. Surviving jobs keep input order.
    pub async fn ingest(&self, paths: Vec<PathBuf>) -> IngestReport {
        let mut report = IngestReport::default();
        let mut candidates = Vec::with_capacity(paths.len());

        for path in paths {
            if is_supported(&path) {
                candidates.push(path);
            } else {
                debug!(path = %path.display(), "Skipping unsupported file");
                metrics::FILES_INGESTED.with_label_values(&["skipped"]).inc();
                report.skipped.push(path);
            }
        }

        let limit = self.config.max_concurrent_probes.max(1);
        let outcomes: Vec<Result<Job, IngestFailure>> = stream::iter(candidates)
            .map(|path| self.probe(path))
            .buffered(limit)
            .collect()
            .await;

        let mut jobs = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(job) => jobs.push(job),
                Err(failure) => report.failed.push(failure),
            }
        }

        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
        metrics::FILES_INGESTED
            .with_label_values(&["accepted"])
            .inc_by(ids.len() as u64);
        self.registry.add(jobs);

        // Read back so the report carries registry-filled fields.
        report.jobs = ids.into_iter().filter_map(|id| self.registry.get(id)).collect();

        info!(
            accepted = report.jobs.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Ingestion finished"
        );
        report
    }

    async fn probe(&self, path: PathBuf) -> Result<Job, IngestFailure> {
        let (meta, size) = tokio::join!(self.engine.analyze(&path), self.engine.file_size(&path));

        let outcome = meta.and_then(|meta| size.map(|size| (meta, size)));
        match outcome {
            Ok((meta, size)) => {
                debug!(path = %path.display(), width = meta.width, height = meta.height, format = %meta.format, "Probed image");
                Ok(Job::pending(
                    path,
                    size,
                    normalize_format(&meta.format),
                    meta.width,
                    meta.height,
                ))
            }
            Err(e) => {
                log_probe_failure(&path, &e);
                metrics::FILES_INGESTED.with_label_values(&["failed"]).inc();
                Err(IngestFailure {
                    path,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Writes an in-memory dropped payload into the staging directory.
    ///
    /// Only the final component of `name` is used. The returned path can be
    /// passed to [`ingest`](Self::ingest).
    pub async fn stage_dropped_file(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, IngestError> {
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| IngestError::InvalidName {
                name: name.to_string(),
            })?;

        let dir = &self.config.staging_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| IngestError::Io {
                path: dir.clone(),
                source,
            })?;

        // Payloads dropped together often share a base name.
        let tag = Uuid::new_v4().simple().to_string();
        let target = dir.join(format!(
            "{}_{}_{}",
            Utc::now().timestamp_millis(),
            &tag[..8],
            file_name
        ));
        let io_err = |source: std::io::Error| IngestError::Io {
            path: target.clone(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(io_err)?;
        file.write_all(bytes).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        debug!(path = %target.display(), bytes = bytes.len(), "Staged dropped file");
        Ok(target)
    }
}

fn log_probe_failure(path: &Path, err: &EngineError) {
    if err.is_environmental() {
        error!(path = %path.display(), error = %err, "Engine is not usable, dropping file");
    } else {
        warn!(path = %path.display(), error = %err, "Failed to probe file, dropping it");
    }
}
