//! Error types for the engine module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by an image engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Metadata could not be read from the file.
    #[error("Failed to analyze {path}: {reason}")]
    Analysis { path: PathBuf, reason: String },

    /// Filesystem access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be decoded or its output written during a batch.
    #[error("Failed to convert {path}: {reason}")]
    Conversion { path: PathBuf, reason: String },

    /// A preview could not be generated.
    #[error("Failed to generate preview for {path}: {reason}")]
    Preview { path: PathBuf, reason: String },

    /// The batch request as a whole was rejected.
    #[error("Batch submission failed: {reason}")]
    BatchSubmission { reason: String },

    /// The file's encoding is not handled by this engine.
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: String },

    /// External decoder binary not found.
    #[error("Decoder not found at path: {path}")]
    DecoderNotFound { path: PathBuf },

    /// External decoder did not finish in time.
    #[error("Decoding timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

impl EngineError {
    pub fn analysis(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Analysis {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn conversion(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Conversion {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn preview(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Preview {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn batch_submission(reason: impl Into<String>) -> Self {
        Self::BatchSubmission {
            reason: reason.into(),
        }
    }

    /// Whether the failure is a setup problem rather than a per-file one.
    pub fn is_environmental(&self) -> bool {
        matches!(self, Self::DecoderNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EngineError::analysis("/in/a.heic", "truncated header");
        assert_eq!(err.to_string(), "Failed to analyze /in/a.heic: truncated header");

        let err = EngineError::conversion("/out/a.jpg", "permission denied");
        assert_eq!(err.to_string(), "Failed to convert /out/a.jpg: permission denied");

        let err = EngineError::batch_submission("output volume is read-only");
        assert_eq!(err.to_string(), "Batch submission failed: output volume is read-only");

        let err = EngineError::Timeout { timeout_secs: 120 };
        assert_eq!(err.to_string(), "Decoding timed out after 120 seconds");
    }

    #[test]
    fn test_is_environmental() {
        assert!(EngineError::DecoderNotFound {
            path: PathBuf::from("heif-convert")
        }
        .is_environmental());
        assert!(!EngineError::preview("/a.heic", "bad").is_environmental());
    }
}
