//! Wire types exchanged with an image engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::job::JobId;

/// File extensions accepted for ingestion, lower-case.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "heif"];

/// Lower-cased extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Maps an extension to its canonical format tag (`jpg` becomes `jpeg`).
pub fn normalize_format(ext: &str) -> String {
    match ext.to_lowercase().as_str() {
        "jpg" => "jpeg".to_string(),
        other => other.to_string(),
    }
}

/// Result of analyzing an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    /// Lower-cased format tag.
    pub format: String,
}

/// One entry of a batch conversion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: JobId,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
}

/// Per-item outcome of a batch conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub id: JobId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemResult {
    pub fn ok(id: JobId, output_path: PathBuf) -> Self {
        Self {
            id,
            success: true,
            output_path: Some(output_path),
            error: None,
        }
    }

    pub fn failed(id: JobId, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            output_path: None,
            error: Some(error.into()),
        }
    }
}

/// Progress of one item within a running batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionProgress {
    pub id: JobId,
    /// 0-100.
    pub percent: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("/a/B.HEIC")), Some("heic".to_string()));
        assert_eq!(extension_of(Path::new("/a/noext")), None);
        assert_eq!(extension_of(Path::new("/a/archive.tar.gz")), Some("gz".to_string()));
    }

    #[test]
    fn test_normalize_format() {
        assert_eq!(normalize_format("JPG"), "jpeg");
        assert_eq!(normalize_format("jpeg"), "jpeg");
        assert_eq!(normalize_format("Heif"), "heif");
    }

    #[test]
    fn test_item_result_constructors() {
        let id = JobId::new();
        let ok = BatchItemResult::ok(id, PathBuf::from("/out/a.jpg"));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = BatchItemResult::failed(id, "corrupt");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("corrupt"));
        assert!(failed.output_path.is_none());
    }
}
