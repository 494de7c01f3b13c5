//! Configuration for the preview coordinator.

use serde::{Deserialize, Serialize};

/// Configuration for [`PreviewCoordinator`](super::PreviewCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Maximum preview requests outstanding at once.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Source formats that cannot be displayed directly and need a preview.
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

fn default_max_in_flight() -> usize {
    4
}

fn default_formats() -> Vec<String> {
    vec!["heic".to_string(), "heif".to_string()]
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            formats: default_formats(),
        }
    }
}

impl PreviewConfig {
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Whether jobs of this format need a generated preview.
    pub fn needs_preview(&self, format: &str) -> bool {
        self.formats.iter().any(|f| f.eq_ignore_ascii_case(format))
    }
}
