//! Configuration for ingestion.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for [`Ingestor`](super::Ingestor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum engine probes running at once during one ingestion.
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    /// Where dropped file payloads are written before ingestion.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

fn default_max_concurrent_probes() -> usize {
    16
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("imgbatch").join("staging")
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_probes: default_max_concurrent_probes(),
            staging_dir: default_staging_dir(),
        }
    }
}

impl IngestConfig {
    pub fn with_staging_dir(mut self, dir: PathBuf) -> Self {
        self.staging_dir = dir;
        self
    }

    pub fn with_max_concurrent_probes(mut self, max: usize) -> Self {
        self.max_concurrent_probes = max;
        self
    }
}
