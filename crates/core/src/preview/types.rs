//! Types for the preview module.

use serde::Serialize;
use std::path::PathBuf;

use crate::job::JobId;

/// Where a job stands with respect to its preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PreviewState {
    /// Never requested, not eligible, or forgotten.
    Unknown,
    Queued,
    Loading,
    Ready { path: PathBuf },
    /// Generation failed. Not retried for this job.
    Unavailable { reason: String },
}

impl PreviewState {
    /// Whether the coordinator still owes a result for this id.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Loading)
    }
}

/// Emitted when a preview request resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreviewEvent {
    Ready { id: JobId, path: PathBuf },
    Failed { id: JobId, error: String },
}

impl PreviewEvent {
    pub fn id(&self) -> JobId {
        match self {
            Self::Ready { id, .. } | Self::Failed { id, .. } => *id,
        }
    }
}

/// Point-in-time copy of the coordinator's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreviewSnapshot {
    pub max_in_flight: usize,
    /// FIFO order.
    pub queued: Vec<JobId>,
    pub loading: Vec<JobId>,
    pub errored: Vec<JobId>,
    pub ready: Vec<JobId>,
}

impl PreviewSnapshot {
    pub fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.loading.is_empty()
    }
}
