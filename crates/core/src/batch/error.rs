//! Error types for the batch module.

use thiserror::Error;

/// Reasons a batch cannot be started.
///
/// Everything that goes wrong inside the engine is recorded on the jobs
/// themselves, never returned here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No output directory selected")]
    NoOutputDirectory,

    /// The batch task panicked; its jobs were failed.
    #[error("{0}")]
    Interrupted(String),
}
