//! Configuration for the native image engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for [`NativeEngine`](super::NativeEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// External HEIF/HEIC decoder (invoked as `<decoder> <input> <output.png>`).
    #[serde(default = "default_heif_decoder_path")]
    pub heif_decoder_path: PathBuf,

    /// Scratch directory for previews and intermediate decodes.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Timeout for one external decode in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Longest edge of a generated preview, in pixels.
    #[serde(default = "default_preview_max_dimension")]
    pub preview_max_dimension: u32,

    /// JPEG quality of generated previews.
    #[serde(default = "default_preview_quality")]
    pub preview_quality: u8,

    /// Maximum items converted at once inside one batch.
    #[serde(default = "default_max_parallel")]
    pub max_parallel_conversions: usize,
}

fn default_heif_decoder_path() -> PathBuf {
    PathBuf::from("heif-convert")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("imgbatch")
}

fn default_timeout() -> u64 {
    120
}

fn default_preview_max_dimension() -> u32 {
    800
}

fn default_preview_quality() -> u8 {
    75
}

fn default_max_parallel() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heif_decoder_path: default_heif_decoder_path(),
            temp_dir: default_temp_dir(),
            timeout_secs: default_timeout(),
            preview_max_dimension: default_preview_max_dimension(),
            preview_quality: default_preview_quality(),
            max_parallel_conversions: default_max_parallel(),
        }
    }
}

impl EngineConfig {
    pub fn with_decoder_path(mut self, path: PathBuf) -> Self {
        self.heif_decoder_path = path;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel_conversions = max;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}
