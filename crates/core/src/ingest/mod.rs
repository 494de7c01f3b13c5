//! Ingestion of user-selected files.

mod adapter;
mod config;

pub use adapter::{is_supported, IngestError, IngestFailure, IngestReport, Ingestor};
pub use config::IngestConfig;
