//! One-shot batch conversion of every pending job.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::BatchConfig;
use super::error::DispatchError;
use super::output::plan_output_paths;
use super::types::BatchReport;
use crate::engine::{BatchItem, BatchItemResult, ConversionProgress, ImageEngine};
use crate::job::{ConversionSettings, Job, JobId, JobRegistry, JobStatus, JobUpdate};
use crate::metrics;
use crate::preview::PreviewHandle;

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Message for jobs the engine returned no result for.
pub const MISSING_RESULT_MESSAGE: &str = "Conversion result missing";
const DEFAULT_FAILURE_MESSAGE: &str = "Conversion failed";

/// Submits pending jobs to the engine and reconciles the results.
pub struct BatchDispatcher {
    engine: Arc<dyn ImageEngine>,
    registry: Arc<dyn JobRegistry>,
    config: BatchConfig,
    preview: Option<PreviewHandle>,
    /// Serializes job selection so concurrent dispatches never share a job.
    selection: Mutex<()>,
}

impl BatchDispatcher {
    pub fn new(
        engine: Arc<dyn ImageEngine>,
        registry: Arc<dyn JobRegistry>,
        config: BatchConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            config,
            preview: None,
            selection: Mutex::new(()),
        }
    }

    /// Cleared jobs are also forgotten by this preview coordinator.
    pub fn with_preview(mut self, preview: PreviewHandle) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Converts every pending job into `output_dir`.
    ///
    /// Refuses without touching any job when no output directory is given.
    /// Once jobs are selected, every one of them ends in `Completed` or
    /// `Error` before this returns.
    pub async fn dispatch(&self, output_dir: Option<&Path>) -> Result<BatchReport, DispatchError> {
        let output_dir = output_dir.ok_or(DispatchError::NoOutputDirectory)?;
        let batch_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let (jobs, settings) = self.select_pending();
        if jobs.is_empty() {
            debug!(%batch_id, "No pending jobs, nothing to dispatch");
            return Ok(BatchReport::empty(batch_id));
        }

        let outputs = plan_output_paths(
            &jobs,
            output_dir,
            settings.target_format,
            self.config.collision_policy,
        );
        let items: Vec<BatchItem> = jobs
            .iter()
            .zip(outputs)
            .map(|(job, output_path)| BatchItem {
                id: job.id,
                source_path: job.path.clone(),
                output_path,
            })
            .collect();

        info!(
            %batch_id,
            jobs = items.len(),
            format = %settings.target_format,
            quality = settings.quality,
            output_dir = %output_dir.display(),
            "Submitting batch"
        );

        // The selected jobs are already processing; run the rest detached so
        // a dropped caller cannot strand them.
        let ids: Vec<JobId> = items.iter().map(|item| item.id).collect();
        let run = BatchRun {
            batch_id: batch_id.clone(),
            engine: self.engine.clone(),
            registry: self.registry.clone(),
            items,
            settings,
            started,
            clear: self.config.auto_clear_completed.then(|| ClearSchedule {
                delay: Duration::from_millis(self.config.clear_completed_delay_ms),
                preview: self.preview.clone(),
            }),
        };

        match tokio::spawn(run.execute()).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(%batch_id, error = %e, "Batch task did not finish");
                let message = format!("Batch interrupted: {}", e);
                self.registry.update_many(
                    ids.into_iter()
                        .map(|id| (id, JobUpdate::failed(message.clone())))
                        .collect(),
                );
                Err(DispatchError::Interrupted(message))
            }
        }
    }

    /// Snapshots pending jobs and moves them to processing in one step.
    fn select_pending(&self) -> (Vec<Job>, ConversionSettings) {
        let _guard = self.selection.lock().unwrap_or_else(|e| e.into_inner());

        let snapshot = self.registry.snapshot();
        let pending = snapshot.pending();
        if pending.is_empty() {
            return (pending, snapshot.settings);
        }

        let moved: HashSet<JobId> = self
            .registry
            .update_many(
                pending
                    .iter()
                    .map(|job| (job.id, JobUpdate::processing()))
                    .collect(),
            )
            .into_iter()
            .collect();

        // A job removed between snapshot and transition is simply not sent.
        let jobs = pending
            .into_iter()
            .filter(|job| moved.contains(&job.id))
            .collect();
        (jobs, snapshot.settings)
    }
}

/// A submitted batch: the engine call and its reconciliation.
struct BatchRun {
    batch_id: String,
    engine: Arc<dyn ImageEngine>,
    registry: Arc<dyn JobRegistry>,
    items: Vec<BatchItem>,
    settings: ConversionSettings,
    started: Instant,
    clear: Option<ClearSchedule>,
}

/// Delayed removal of completed jobs after a batch.
struct ClearSchedule {
    delay: Duration,
    preview: Option<PreviewHandle>,
}

impl ClearSchedule {
    fn spawn(self, registry: Arc<dyn JobRegistry>) {
        tokio::spawn(async move {
            tokio::time::sleep(self.delay).await;
            let cleared = registry.clear_completed();
            debug!(cleared = cleared.len(), "Cleared completed jobs");
            if let Some(preview) = self.preview {
                preview.forget(cleared).await;
            }
        });
    }
}

impl BatchRun {
    /// Leaves every item in `Completed` or `Error`.
    async fn execute(mut self) -> BatchReport {
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let forwarder = tokio::spawn(forward_progress(self.registry.clone(), progress_rx));

        let result = self
            .engine
            .convert_batch(self.items.clone(), self.settings.clone(), Some(progress_tx))
            .await;

        // No progress may land after reconciliation.
        forwarder.abort();
        let _ = forwarder.await;

        let mut report = match result {
            Ok(results) => self.reconcile(results),
            Err(e) => self.fail_all(e.to_string()),
        };

        let elapsed = self.started.elapsed();
        report.duration_ms = elapsed.as_millis() as u64;
        let outcome = if report.submission_error.is_some() {
            "rejected"
        } else {
            "submitted"
        };
        metrics::BATCH_DURATION
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());

        info!(
            batch_id = %self.batch_id,
            completed = report.completed,
            failed = report.failed,
            missing = report.missing,
            duration_ms = report.duration_ms,
            "Batch finished"
        );

        if report.completed > 0 {
            if let Some(clear) = self.clear.take() {
                clear.spawn(self.registry.clone());
            }
        }

        report
    }

    fn fail_all(&self, message: String) -> BatchReport {
        error!(batch_id = %self.batch_id, error = %message, "Batch submission failed");
        metrics::BATCHES_TOTAL.with_label_values(&["rejected"]).inc();
        self.registry.update_many(
            self.items
                .iter()
                .map(|item| (item.id, JobUpdate::failed(message.clone())))
                .collect(),
        );
        BatchReport {
            batch_id: self.batch_id.clone(),
            submitted: self.items.len(),
            completed: 0,
            failed: self.items.len(),
            missing: 0,
            duration_ms: 0,
            submission_error: Some(message),
        }
    }

    fn reconcile(&self, results: Vec<BatchItemResult>) -> BatchReport {
        let batch_id = self.batch_id.as_str();
        let items = &self.items;
        metrics::BATCHES_TOTAL.with_label_values(&["submitted"]).inc();

        let mut outstanding: HashMap<JobId, &BatchItem> =
            items.iter().map(|item| (item.id, item)).collect();
        let mut updates = Vec::with_capacity(items.len());
        let mut completed = 0;
        let mut failed = 0;

        for result in results {
            let Some(item) = outstanding.remove(&result.id) else {
                if items.iter().any(|item| item.id == result.id) {
                    warn!(%batch_id, id = %result.id, "Ignoring duplicate result");
                } else {
                    warn!(%batch_id, id = %result.id, "Ignoring result for job not in batch");
                }
                continue;
            };

            if result.success {
                let output_path = result
                    .output_path
                    .unwrap_or_else(|| item.output_path.clone());
                debug!(%batch_id, id = %item.id, output = %output_path.display(), "Converted");
                updates.push((item.id, JobUpdate::completed(output_path)));
                completed += 1;
            } else {
                let message = result
                    .error
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                warn!(%batch_id, id = %item.id, error = %message, "Conversion failed");
                updates.push((item.id, JobUpdate::failed(message)));
                failed += 1;
            }
        }

        let mut missing = 0;
        for item in items.iter() {
            if outstanding.contains_key(&item.id) {
                warn!(%batch_id, id = %item.id, "Engine returned no result");
                updates.push((item.id, JobUpdate::failed(MISSING_RESULT_MESSAGE)));
                missing += 1;
            }
        }

        self.registry.update_many(updates);

        metrics::CONVERSIONS_TOTAL
            .with_label_values(&["completed"])
            .inc_by(completed as u64);
        metrics::CONVERSIONS_TOTAL
            .with_label_values(&["failed"])
            .inc_by(failed as u64);
        metrics::CONVERSIONS_TOTAL
            .with_label_values(&["missing"])
            .inc_by(missing as u64);

        BatchReport {
            batch_id: batch_id.to_string(),
            submitted: items.len(),
            completed,
            failed: failed + missing,
            missing,
            duration_ms: 0,
            submission_error: None,
        }
    }

}

/// Copies engine progress onto jobs that are still processing.
async fn forward_progress(
    registry: Arc<dyn JobRegistry>,
    mut progress_rx: mpsc::Receiver<ConversionProgress>,
) {
    while let Some(progress) = progress_rx.recv().await {
        registry.update_if(
            progress.id,
            JobStatus::Processing,
            JobUpdate::progress(progress.percent),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{InMemoryJobRegistry, JobStatus};
    use crate::testing::{fixtures, MockEngine};
    use std::path::PathBuf;

    struct Harness {
        engine: Arc<MockEngine>,
        registry: Arc<InMemoryJobRegistry>,
        dispatcher: BatchDispatcher,
    }

    fn harness(config: BatchConfig) -> Harness {
        let engine = Arc::new(MockEngine::new());
        let registry = Arc::new(InMemoryJobRegistry::new());
        let dispatcher = BatchDispatcher::new(engine.clone(), registry.clone(), config);
        Harness {
            engine,
            registry,
            dispatcher,
        }
    }

    fn no_auto_clear() -> BatchConfig {
        BatchConfig::default().with_auto_clear(false)
    }

    #[tokio::test]
    async fn test_refuses_without_output_dir() {
        let h = harness(no_auto_clear());
        h.registry.add(fixtures::jobs("heic", 2));
        let before = h.registry.snapshot();

        let err = h.dispatcher.dispatch(None).await.unwrap_err();
        assert_eq!(err, DispatchError::NoOutputDirectory);
        assert_eq!(h.registry.snapshot(), before);
        assert!(h.engine.recorded_batches().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_pending_set_skips_engine() {
        let h = harness(no_auto_clear());
        let report = h.dispatcher.dispatch(Some(Path::new("/out"))).await.unwrap();
        assert!(report.is_empty());
        assert!(h.engine.recorded_batches().await.is_empty());
    }

    #[tokio::test]
    async fn test_items_use_planned_output_paths() {
        let h = harness(no_auto_clear());
        let jobs = vec![fixtures::job("IMG_1.heic"), fixtures::job("beach.png")];
        h.registry.add(jobs.clone());

        h.dispatcher.dispatch(Some(Path::new("/out"))).await.unwrap();

        let batches = h.engine.recorded_batches().await;
        assert_eq!(batches.len(), 1);
        let outputs: Vec<PathBuf> = batches[0].items.iter().map(|i| i.output_path.clone()).collect();
        assert_eq!(
            outputs,
            vec![PathBuf::from("/out/IMG_1.jpg"), PathBuf::from("/out/beach.jpg")]
        );
        assert_eq!(batches[0].items[0].source_path, jobs[0].path);
    }

    #[tokio::test]
    async fn test_only_pending_jobs_are_selected() {
        let h = harness(no_auto_clear());
        let jobs = fixtures::jobs("jpg", 3);
        h.registry.add(jobs.clone());
        h.registry.update(jobs[0].id, JobUpdate::failed("earlier failure"));

        let report = h.dispatcher.dispatch(Some(Path::new("/out"))).await.unwrap();
        assert_eq!(report.submitted, 2);

        let sent: Vec<JobId> = h.engine.recorded_batches().await[0].items.iter().map(|i| i.id).collect();
        assert_eq!(sent, vec![jobs[1].id, jobs[2].id]);
        assert_eq!(h.registry.get(jobs[0].id).unwrap().error.as_deref(), Some("earlier failure"));
    }

    #[tokio::test]
    async fn test_result_without_message_uses_default() {
        let h = harness(no_auto_clear());
        let jobs = fixtures::jobs("heic", 1);
        h.registry.add(jobs.clone());
        h.engine
            .set_batch_results(vec![BatchItemResult {
                id: jobs[0].id,
                success: false,
                output_path: None,
                error: None,
            }])
            .await;

        h.dispatcher.dispatch(Some(Path::new("/out"))).await.unwrap();
        let job = h.registry.get(jobs[0].id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some(DEFAULT_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_results_are_ignored() {
        let h = harness(no_auto_clear());
        let jobs = fixtures::jobs("heic", 1);
        h.registry.add(jobs.clone());
        let stranger = JobId::new();
        h.engine
            .set_batch_results(vec![
                BatchItemResult::ok(jobs[0].id, PathBuf::from("/out/img_0.jpg")),
                BatchItemResult::failed(jobs[0].id, "late duplicate"),
                BatchItemResult::ok(stranger, PathBuf::from("/out/stranger.jpg")),
            ])
            .await;

        let report = h.dispatcher.dispatch(Some(Path::new("/out"))).await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(h.registry.get(jobs[0].id).unwrap().status, JobStatus::Completed);
        assert!(h.registry.get(stranger).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_never_share_jobs() {
        let h = harness(no_auto_clear());
        h.engine.set_batch_delay(Duration::from_millis(20)).await;
        h.registry.add(fixtures::jobs("heic", 10));

        let out = Path::new("/out");
        let (a, b) = tokio::join!(h.dispatcher.dispatch(Some(out)), h.dispatcher.dispatch(Some(out)));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.submitted + b.submitted, 10);

        let mut seen = HashSet::new();
        for batch in h.engine.recorded_batches().await {
            for item in batch.items {
                assert!(seen.insert(item.id));
            }
        }
        assert_eq!(seen.len(), 10);
    }

    #[tokio::test]
    async fn test_progress_is_forwarded_while_processing() {
        let h = harness(no_auto_clear());
        h.engine.set_batch_delay(Duration::from_millis(50)).await;
        let jobs = fixtures::jobs("heic", 1);
        h.registry.add(jobs.clone());
        let mut events = h.registry.subscribe();

        h.dispatcher.dispatch(Some(Path::new("/out"))).await.unwrap();

        let mut progress_seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let crate::job::RegistryEvent::JobsUpdated { jobs: updated, .. } = event {
                for job in updated {
                    if job.status == JobStatus::Processing {
                        progress_seen.push(job.progress);
                    }
                }
            }
        }
        assert_eq!(progress_seen, vec![Some(0), Some(50), Some(100)]);
        assert_eq!(h.registry.get(jobs[0].id).unwrap().status, JobStatus::Completed);
    }
}
