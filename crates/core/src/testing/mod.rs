//! Testing utilities and mock implementations.
//!
//! This module provides a mock [`ImageEngine`](crate::engine::ImageEngine) and
//! job fixtures, so the registry, preview coordinator and batch dispatcher can
//! be exercised without real image files.
//!
//! # Example
//!
//! ```rust,ignore
//! use imgbatch_core::testing::{fixtures, MockEngine};
//!
//! let engine = Arc::new(MockEngine::new());
//! engine.fail_preview("/photos/img_1.heic").await;
//!
//! registry.add(fixtures::jobs("heic", 3));
//! ```

mod mock_engine;

pub use mock_engine::{MockEngine, RecordedBatch};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::PathBuf;

    use crate::engine::{extension_of, normalize_format};
    use crate::job::Job;

    /// A pending job for `/photos/{name}` with 4000x3000 dimensions.
    pub fn job(name: &str) -> Job {
        let path = PathBuf::from(format!("/photos/{}", name));
        let format = normalize_format(&extension_of(&path).unwrap_or_default());
        Job::pending(path, 2 * 1024 * 1024, format, 4000, 3000)
    }

    /// `count` pending jobs named `img_{i}.{ext}`.
    pub fn jobs(ext: &str, count: usize) -> Vec<Job> {
        (0..count).map(|i| job(&format!("img_{}.{}", i, ext))).collect()
    }
}
