//! Core job data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Opaque identifier of a tracked image.
///
/// Assigned once at ingestion and never reused; a re-ingested file gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Lifecycle state of a job.
///
/// `Pending -> Processing -> {Completed | Error}`. There is no way back to
/// `Pending`; a failed file has to be removed and ingested again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Returns the status as a lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job
// ============================================================================

/// One tracked image file and its conversion lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Display name (the file name).
    pub name: String,
    /// Source location, the key the engine works with.
    pub path: PathBuf,
    /// Source size in bytes.
    pub size: u64,
    /// Lower-cased source encoding tag, e.g. `jpeg` or `heic`.
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Projected output size in bytes. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_size: Option<u64>,
    pub status: JobStatus,
    /// 0-100, only meaningful while processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Present iff `status == Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present iff `status == Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub added_at: DateTime<Utc>,
}

impl Job {
    /// Creates a pending job with a fresh id.
    pub fn pending(
        path: PathBuf,
        size: u64,
        format: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        Self {
            id: JobId::new(),
            name,
            path,
            size,
            format: format.into().to_lowercase(),
            width,
            height,
            estimated_size: None,
            status: JobStatus::Pending,
            progress: None,
            error: None,
            output_path: None,
            added_at: Utc::now(),
        }
    }

    /// Applies a partial update in place.
    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(ref error) = update.error {
            self.error = error.clone();
        }
        if let Some(ref output_path) = update.output_path {
            self.output_path = output_path.clone();
        }
        if let Some(estimated_size) = update.estimated_size {
            self.estimated_size = estimated_size;
        }
    }
}

// ============================================================================
// Partial updates
// ============================================================================

/// A partial update to the status-related fields of a job.
///
/// Identity and source fields are deliberately absent: only ingestion creates
/// them. For each `Option<Option<T>>` field, `None` leaves the value alone and
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Option<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<Option<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_size: Option<Option<u64>>,
}

impl JobUpdate {
    /// Transition into `Processing` with progress reset to 0.
    pub fn processing() -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(Some(0)),
            error: Some(None),
            output_path: Some(None),
            ..Default::default()
        }
    }

    /// Transition into `Completed`.
    pub fn completed(output_path: PathBuf) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(Some(100)),
            error: Some(None),
            output_path: Some(Some(output_path)),
            ..Default::default()
        }
    }

    /// Transition into `Error`.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Error),
            progress: Some(None),
            error: Some(Some(message.into())),
            output_path: Some(None),
            ..Default::default()
        }
    }

    /// Progress report, clamped to 100.
    pub fn progress(percent: u8) -> Self {
        Self {
            progress: Some(Some(percent.min(100))),
            ..Default::default()
        }
    }

    /// New advisory output size estimate.
    pub fn estimated_size(bytes: u64) -> Self {
        Self {
            estimated_size: Some(Some(bytes)),
            ..Default::default()
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Output encoding for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    Jpeg,
    Png,
}

impl TargetFormat {
    /// Canonical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Whether `quality` means anything for this format.
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Jpeg)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide conversion settings. There is exactly one current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSettings {
    #[serde(default = "default_target_format")]
    pub target_format: TargetFormat,
    /// 1-100, only used by lossy targets.
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_preserve_metadata")]
    pub preserve_metadata: bool,
}

fn default_target_format() -> TargetFormat {
    TargetFormat::Jpeg
}

fn default_quality() -> u8 {
    90
}

fn default_preserve_metadata() -> bool {
    true
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            target_format: default_target_format(),
            quality: default_quality(),
            preserve_metadata: default_preserve_metadata(),
        }
    }
}

impl ConversionSettings {
    /// Merges a partial update. Quality is clamped to 1-100.
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(format) = update.target_format {
            self.target_format = format;
        }
        if let Some(quality) = update.quality {
            self.quality = quality.clamp(1, 100);
        }
        if let Some(preserve) = update.preserve_metadata {
            self.preserve_metadata = preserve;
        }
    }

    /// Rough projected output size for an image of the given dimensions.
    pub fn estimate_output_size(&self, width: u32, height: u32) -> u64 {
        let pixel_count = width as f64 * height as f64;

        match self.target_format {
            TargetFormat::Jpeg => {
                let quality_factor = self.quality as f64 / 100.0;
                let bytes_per_pixel = 0.5 + (quality_factor * 2.5);
                (pixel_count * bytes_per_pixel) as u64
            }
            TargetFormat::Png => (pixel_count * 3.5) as u64,
        }
    }
}

/// Partial settings update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub target_format: Option<TargetFormat>,
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub preserve_metadata: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.target_format.is_none() && self.quality.is_none() && self.preserve_metadata.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_job_defaults() {
        let job = Job::pending(PathBuf::from("/photos/IMG_0001.HEIC"), 2048, "HEIC", 4032, 3024);
        assert_eq!(job.name, "IMG_0001.HEIC");
        assert_eq!(job.format, "heic");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.progress.is_none());
        assert!(job.error.is_none());
        assert!(job.output_path.is_none());
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_job_id_round_trips_through_display() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_lifecycle_updates() {
        let mut job = Job::pending(PathBuf::from("/a.jpg"), 1, "jpeg", 1, 1);

        job.apply(&JobUpdate::processing());
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, Some(0));

        job.apply(&JobUpdate::progress(150));
        assert_eq!(job.progress, Some(100));

        job.apply(&JobUpdate::failed("decoder exploded"));
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("decoder exploded"));
        assert!(job.progress.is_none());
        assert!(job.output_path.is_none());
    }

    #[test]
    fn test_completed_update_sets_output() {
        let mut job = Job::pending(PathBuf::from("/a.heic"), 1, "heic", 1, 1);
        job.apply(&JobUpdate::processing());
        job.apply(&JobUpdate::completed(PathBuf::from("/out/a.jpg")));

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, Some(100));
        assert_eq!(job.output_path, Some(PathBuf::from("/out/a.jpg")));
        assert!(job.error.is_none());
    }

    #[test]
    fn test_empty_update_changes_nothing() {
        let mut job = Job::pending(PathBuf::from("/a.png"), 1, "png", 1, 1);
        let before = job.clone();
        job.apply(&JobUpdate::default());
        assert_eq!(job, before);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&JobStatus::Processing).unwrap(), "\"processing\"");
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_target_format_extension() {
        assert_eq!(TargetFormat::Jpeg.extension(), "jpg");
        assert_eq!(TargetFormat::Png.extension(), "png");
        assert!(TargetFormat::Jpeg.is_lossy());
        assert!(!TargetFormat::Png.is_lossy());
    }

    #[test]
    fn test_settings_apply_clamps_quality() {
        let mut settings = ConversionSettings::default();
        settings.apply(&SettingsUpdate {
            quality: Some(0),
            ..Default::default()
        });
        assert_eq!(settings.quality, 1);

        settings.apply(&SettingsUpdate {
            target_format: Some(TargetFormat::Png),
            quality: Some(250),
            preserve_metadata: Some(false),
        });
        assert_eq!(settings.target_format, TargetFormat::Png);
        assert_eq!(settings.quality, 100);
        assert!(!settings.preserve_metadata);
    }

    #[test]
    fn test_estimate_output_size() {
        let jpeg = ConversionSettings {
            target_format: TargetFormat::Jpeg,
            quality: 100,
            preserve_metadata: true,
        };
        // 100 pixels * 3.0 bytes per pixel at full quality
        assert_eq!(jpeg.estimate_output_size(10, 10), 300);

        let png = ConversionSettings {
            target_format: TargetFormat::Png,
            ..jpeg
        };
        assert_eq!(png.estimate_output_size(10, 10), 350);
        assert_eq!(png.estimate_output_size(0, 10), 0);
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: ConversionSettings = serde_json::from_str(r#"{"target_format":"png"}"#).unwrap();
        assert_eq!(settings.target_format, TargetFormat::Png);
        assert_eq!(settings.quality, 90);
        assert!(settings.preserve_metadata);
    }
}
