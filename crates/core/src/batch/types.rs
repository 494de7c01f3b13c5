//! Types for the batch module.

use serde::Serialize;

/// Summary of one dispatched batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    /// Jobs moved to processing and sent to the engine.
    pub submitted: usize,
    pub completed: usize,
    /// Jobs that ended in error, including missing results.
    pub failed: usize,
    /// Jobs the engine returned no result for.
    pub missing: usize,
    pub duration_ms: u64,
    /// Set when the engine rejected the whole request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_error: Option<String>,
}

impl BatchReport {
    pub(crate) fn empty(batch_id: String) -> Self {
        Self {
            batch_id,
            submitted: 0,
            completed: 0,
            failed: 0,
            missing: 0,
            duration_ms: 0,
            submission_error: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.submitted == 0
    }
}
