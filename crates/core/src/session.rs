//! A conversion session wiring registry, ingestion, previews and batches.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::batch::{BatchDispatcher, BatchReport, DispatchError};
use crate::config::Config;
use crate::engine::ImageEngine;
use crate::ingest::{IngestError, IngestReport, Ingestor};
use crate::job::{
    ConversionSettings, InMemoryJobRegistry, Job, JobId, JobRegistry, SettingsUpdate,
};
use crate::preview::{PreviewCoordinator, PreviewHandle};

/// Everything a presentation layer needs, behind one handle.
///
/// Must be created inside a tokio runtime; the preview coordinator is spawned
/// on construction.
pub struct ConversionSession {
    registry: Arc<dyn JobRegistry>,
    engine: Arc<dyn ImageEngine>,
    ingestor: Ingestor,
    preview: PreviewHandle,
    dispatcher: BatchDispatcher,
    output_dir: RwLock<Option<PathBuf>>,
}

impl ConversionSession {
    /// Creates a session with a fresh in-memory registry.
    pub fn new(engine: Arc<dyn ImageEngine>, config: &Config) -> Self {
        let registry = Arc::new(InMemoryJobRegistry::with_settings(config.settings.clone()));
        Self::with_registry(engine, registry, config)
    }

    pub fn with_registry(
        engine: Arc<dyn ImageEngine>,
        registry: Arc<dyn JobRegistry>,
        config: &Config,
    ) -> Self {
        let preview = PreviewCoordinator::spawn(engine.clone(), config.preview.clone());
        let ingestor = Ingestor::new(engine.clone(), registry.clone(), config.ingest.clone());
        let dispatcher = BatchDispatcher::new(engine.clone(), registry.clone(), config.batch.clone())
            .with_preview(preview.clone());

        Self {
            registry,
            engine,
            ingestor,
            preview,
            dispatcher,
            output_dir: RwLock::new(config.batch.output_dir.clone()),
        }
    }

    pub fn registry(&self) -> &Arc<dyn JobRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<dyn ImageEngine> {
        &self.engine
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    /// Ingests paths and queues previews for the new jobs.
    pub async fn ingest(&self, paths: Vec<PathBuf>) -> IngestReport {
        let report = self.ingestor.ingest(paths).await;
        self.preview.request(&report.jobs).await;
        report
    }

    /// Stages dropped payloads, then ingests them as one batch.
    pub async fn ingest_dropped(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<IngestReport, IngestError> {
        let mut staged = Vec::with_capacity(files.len());
        for (name, bytes) in files {
            staged.push(self.ingestor.stage_dropped_file(&name, &bytes).await?);
        }
        Ok(self.ingest(staged).await)
    }

    pub async fn remove_job(&self, id: JobId) -> Option<Job> {
        let removed = self.registry.remove(id)?;
        self.preview.forget(vec![id]).await;
        Some(removed)
    }

    pub async fn clear_completed(&self) -> Vec<JobId> {
        let cleared = self.registry.clear_completed();
        self.preview.forget(cleared.clone()).await;
        cleared
    }

    pub async fn clear_all(&self) -> Vec<JobId> {
        let cleared = self.registry.clear_all();
        self.preview.forget(cleared.clone()).await;
        cleared
    }

    pub fn update_settings(&self, update: SettingsUpdate) -> ConversionSettings {
        let settings = self.registry.update_settings(update);
        info!(
            format = %settings.target_format,
            quality = settings.quality,
            preserve_metadata = settings.preserve_metadata,
            "Conversion settings updated"
        );
        settings
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        self.output_dir
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_output_dir(&self, dir: Option<PathBuf>) {
        info!(output_dir = ?dir, "Output directory changed");
        *self.output_dir.write().unwrap_or_else(|e| e.into_inner()) = dir;
    }

    /// Converts every pending job into the current output directory.
    pub async fn dispatch(&self) -> Result<BatchReport, DispatchError> {
        let output_dir = self.output_dir();
        self.dispatcher.dispatch(output_dir.as_deref()).await
    }
}
