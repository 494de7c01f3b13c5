//! Trait definitions for the engine module.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use super::error::EngineError;
use super::types::{BatchItem, BatchItemResult, ConversionProgress, ImageMetadata};
use crate::job::ConversionSettings;

/// The external capability that actually reads and writes pixels.
///
/// Implementations must tolerate several concurrent `generate_preview` calls
/// and must enforce their own timeouts.
#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Reads dimensions and format of an image.
    async fn analyze(&self, path: &Path) -> Result<ImageMetadata, EngineError>;

    /// Returns the size of a file in bytes.
    async fn file_size(&self, path: &Path) -> Result<u64, EngineError>;

    /// Produces a displayable preview and returns where it was written.
    async fn generate_preview(&self, path: &Path) -> Result<PathBuf, EngineError>;

    /// Converts every item with the given settings.
    ///
    /// Per-item failures are reported in the result list; an `Err` means the
    /// request as a whole was rejected and nothing should be assumed converted.
    /// If `progress_tx` is given, per-item progress is sent on a best-effort
    /// basis.
    async fn convert_batch(
        &self,
        items: Vec<BatchItem>,
        settings: ConversionSettings,
        progress_tx: Option<mpsc::Sender<ConversionProgress>>,
    ) -> Result<Vec<BatchItemResult>, EngineError>;

    /// Validates that the engine is properly configured and ready.
    async fn validate(&self) -> Result<(), EngineError>;
}
