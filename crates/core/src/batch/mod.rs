//! Batch conversion.
//!
//! A batch takes every pending job, moves it to processing, submits one
//! request to the engine and maps the per-item results back onto the jobs.
//! No selected job is ever left in processing: a rejected request fails all
//! of them, and a job with no result fails with
//! [`MISSING_RESULT_MESSAGE`].

mod config;
mod dispatcher;
mod error;
mod output;
mod types;

pub use config::{BatchConfig, CollisionPolicy};
pub use dispatcher::{BatchDispatcher, MISSING_RESULT_MESSAGE};
pub use error::DispatchError;
pub use output::plan_output_paths;
pub use types::BatchReport;
