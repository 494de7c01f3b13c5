//! Mock image engine for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::engine::{
    extension_of, normalize_format, BatchItem, BatchItemResult, ConversionProgress, EngineError,
    ImageEngine, ImageMetadata,
};
use crate::job::ConversionSettings;

/// A recorded batch request for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub items: Vec<BatchItem>,
    /// Settings as received by the engine.
    pub settings: ConversionSettings,
}

/// Mock implementation of the ImageEngine trait.
///
/// Provides controllable behavior for testing:
/// - Per-path analysis, preview and conversion failures
/// - Artificial delays
/// - Scripted batch results or a whole-batch rejection
/// - Recorded calls and peak preview concurrency
///
/// # Example
///
/// ```rust,ignore
/// use imgbatch_core::testing::MockEngine;
///
/// let engine = MockEngine::new();
/// engine.fail_conversion("/photos/b.heic", "corrupt file").await;
///
/// // ... dispatch a batch ...
///
/// let batches = engine.recorded_batches().await;
/// assert_eq!(batches[0].items.len(), 3);
/// ```
#[derive(Debug)]
pub struct MockEngine {
    metadata: Arc<RwLock<HashMap<PathBuf, ImageMetadata>>>,
    analysis_failures: Arc<RwLock<HashSet<PathBuf>>>,
    analysis_delays: Arc<RwLock<HashMap<PathBuf, Duration>>>,
    file_size: Arc<RwLock<u64>>,
    preview_failures: Arc<RwLock<HashSet<PathBuf>>>,
    preview_delay: Arc<RwLock<Duration>>,
    conversion_failures: Arc<RwLock<HashMap<PathBuf, String>>>,
    omitted_results: Arc<RwLock<HashSet<PathBuf>>>,
    /// Replaces computed results for the next batch.
    scripted_results: Arc<RwLock<Option<Vec<BatchItemResult>>>>,
    /// If set, the next batch is rejected with this reason.
    next_batch_error: Arc<RwLock<Option<String>>>,
    batch_delay: Arc<RwLock<Duration>>,
    valid: Arc<RwLock<bool>>,

    analyzed: Arc<RwLock<Vec<PathBuf>>>,
    preview_requests: Arc<RwLock<Vec<PathBuf>>>,
    batches: Arc<RwLock<Vec<RecordedBatch>>>,
    previews_in_flight: Arc<AtomicUsize>,
    peak_previews: Arc<AtomicUsize>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a new mock engine where everything succeeds instantly.
    pub fn new() -> Self {
        Self {
            metadata: Arc::new(RwLock::new(HashMap::new())),
            analysis_failures: Arc::new(RwLock::new(HashSet::new())),
            analysis_delays: Arc::new(RwLock::new(HashMap::new())),
            file_size: Arc::new(RwLock::new(1024 * 1024)),
            preview_failures: Arc::new(RwLock::new(HashSet::new())),
            preview_delay: Arc::new(RwLock::new(Duration::ZERO)),
            conversion_failures: Arc::new(RwLock::new(HashMap::new())),
            omitted_results: Arc::new(RwLock::new(HashSet::new())),
            scripted_results: Arc::new(RwLock::new(None)),
            next_batch_error: Arc::new(RwLock::new(None)),
            batch_delay: Arc::new(RwLock::new(Duration::ZERO)),
            valid: Arc::new(RwLock::new(true)),
            analyzed: Arc::new(RwLock::new(Vec::new())),
            preview_requests: Arc::new(RwLock::new(Vec::new())),
            batches: Arc::new(RwLock::new(Vec::new())),
            previews_in_flight: Arc::new(AtomicUsize::new(0)),
            peak_previews: Arc::new(AtomicUsize::new(0)),
        }
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    /// Set the analysis result for a specific path.
    pub async fn set_metadata(&self, path: impl AsRef<Path>, metadata: ImageMetadata) {
        self.metadata
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), metadata);
    }

    /// Make analysis of `path` fail.
    pub async fn fail_analysis(&self, path: impl AsRef<Path>) {
        self.analysis_failures
            .write()
            .await
            .insert(path.as_ref().to_path_buf());
    }

    /// Delay analysis of `path`.
    pub async fn set_analysis_delay(&self, path: impl AsRef<Path>, delay: Duration) {
        self.analysis_delays
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), delay);
    }

    /// Size reported for every file.
    pub async fn set_file_size(&self, bytes: u64) {
        *self.file_size.write().await = bytes;
    }

    /// Make preview generation for `path` fail.
    pub async fn fail_preview(&self, path: impl AsRef<Path>) {
        self.preview_failures
            .write()
            .await
            .insert(path.as_ref().to_path_buf());
    }

    pub async fn set_preview_delay(&self, delay: Duration) {
        *self.preview_delay.write().await = delay;
    }

    /// Report a failed result for the item whose source is `path`.
    pub async fn fail_conversion(&self, path: impl AsRef<Path>, message: impl Into<String>) {
        self.conversion_failures
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), message.into());
    }

    /// Leave the item whose source is `path` out of the result list.
    pub async fn omit_result(&self, path: impl AsRef<Path>) {
        self.omitted_results
            .write()
            .await
            .insert(path.as_ref().to_path_buf());
    }

    /// Return exactly these results from the next batch.
    pub async fn set_batch_results(&self, results: Vec<BatchItemResult>) {
        *self.scripted_results.write().await = Some(results);
    }

    /// Reject the next batch with the given reason.
    pub async fn set_next_batch_error(&self, reason: impl Into<String>) {
        *self.next_batch_error.write().await = Some(reason.into());
    }

    /// Time the batch call takes after reporting progress.
    pub async fn set_batch_delay(&self, delay: Duration) {
        *self.batch_delay.write().await = delay;
    }

    /// Make `validate` fail.
    pub async fn set_valid(&self, valid: bool) {
        *self.valid.write().await = valid;
    }

    // ------------------------------------------------------------------------
    // Assertions
    // ------------------------------------------------------------------------

    pub async fn analyzed_paths(&self) -> Vec<PathBuf> {
        self.analyzed.read().await.clone()
    }

    /// Preview requests in the order they started.
    pub async fn preview_requests(&self) -> Vec<PathBuf> {
        self.preview_requests.read().await.clone()
    }

    pub async fn recorded_batches(&self) -> Vec<RecordedBatch> {
        self.batches.read().await.clone()
    }

    /// Highest number of preview requests observed running at once.
    pub fn peak_concurrent_previews(&self) -> usize {
        self.peak_previews.load(Ordering::SeqCst)
    }

    fn default_metadata(path: &Path) -> ImageMetadata {
        ImageMetadata {
            width: 4000,
            height: 3000,
            format: normalize_format(&extension_of(path).unwrap_or_default()),
        }
    }
}

#[async_trait]
impl ImageEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn analyze(&self, path: &Path) -> Result<ImageMetadata, EngineError> {
        self.analyzed.write().await.push(path.to_path_buf());

        let delay = self.analysis_delays.read().await.get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.analysis_failures.read().await.contains(path) {
            return Err(EngineError::analysis(path, "mock analysis failure"));
        }

        if let Some(metadata) = self.metadata.read().await.get(path) {
            return Ok(metadata.clone());
        }
        Ok(Self::default_metadata(path))
    }

    async fn file_size(&self, _path: &Path) -> Result<u64, EngineError> {
        Ok(*self.file_size.read().await)
    }

    async fn generate_preview(&self, path: &Path) -> Result<PathBuf, EngineError> {
        self.preview_requests.write().await.push(path.to_path_buf());

        let current = self.previews_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_previews.fetch_max(current, Ordering::SeqCst);

        let delay = *self.preview_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.previews_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.preview_failures.read().await.contains(path) {
            return Err(EngineError::preview(path, "mock preview failure"));
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(PathBuf::from(format!("/previews/{}.jpg", stem)))
    }

    async fn convert_batch(
        &self,
        items: Vec<BatchItem>,
        settings: ConversionSettings,
        progress_tx: Option<mpsc::Sender<ConversionProgress>>,
    ) -> Result<Vec<BatchItemResult>, EngineError> {
        self.batches.write().await.push(RecordedBatch {
            items: items.clone(),
            settings,
        });

        if let Some(reason) = self.next_batch_error.write().await.take() {
            return Err(EngineError::batch_submission(reason));
        }

        let failures = self.conversion_failures.read().await.clone();
        let omitted = self.omitted_results.read().await.clone();

        if let Some(tx) = &progress_tx {
            for item in items.iter().filter(|i| !failures.contains_key(&i.source_path)) {
                let _ = tx.send(ConversionProgress { id: item.id, percent: 50 }).await;
                let _ = tx.send(ConversionProgress { id: item.id, percent: 100 }).await;
            }
        }

        let delay = *self.batch_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(results) = self.scripted_results.write().await.take() {
            return Ok(results);
        }

        Ok(items
            .into_iter()
            .filter(|item| !omitted.contains(&item.source_path))
            .map(|item| match failures.get(&item.source_path) {
                Some(message) => BatchItemResult::failed(item.id, message.clone()),
                None => BatchItemResult::ok(item.id, item.output_path),
            })
            .collect())
    }

    async fn validate(&self) -> Result<(), EngineError> {
        if *self.valid.read().await {
            Ok(())
        } else {
            Err(EngineError::DecoderNotFound {
                path: PathBuf::from("mock-decoder"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;

    fn item(name: &str) -> BatchItem {
        BatchItem {
            id: JobId::new(),
            source_path: PathBuf::from(format!("/in/{}", name)),
            output_path: PathBuf::from(format!("/out/{}.jpg", name)),
        }
    }

    #[tokio::test]
    async fn test_default_analysis() {
        let engine = MockEngine::new();
        let meta = engine.analyze(Path::new("/in/a.JPG")).await.unwrap();
        assert_eq!(meta.format, "jpeg");
        assert_eq!((meta.width, meta.height), (4000, 3000));
        assert_eq!(engine.analyzed_paths().await, vec![PathBuf::from("/in/a.JPG")]);
    }

    #[tokio::test]
    async fn test_batch_failures_and_omissions() {
        let engine = MockEngine::new();
        engine.fail_conversion("/in/b", "bad pixels").await;
        engine.omit_result("/in/c").await;

        let items = vec![item("a"), item("b"), item("c")];
        let results = engine
            .convert_batch(items.clone(), ConversionSettings::default(), None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert_eq!(results[1], BatchItemResult::failed(items[1].id, "bad pixels"));
    }

    #[tokio::test]
    async fn test_next_batch_error_is_one_shot() {
        let engine = MockEngine::new();
        engine.set_next_batch_error("disk full").await;

        let err = engine
            .convert_batch(vec![item("a")], ConversionSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BatchSubmission { .. }));

        assert!(engine
            .convert_batch(vec![item("a")], ConversionSettings::default(), None)
            .await
            .is_ok());
        assert_eq!(engine.recorded_batches().await.len(), 2);
    }
}
