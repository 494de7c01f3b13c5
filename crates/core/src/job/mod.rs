//! Jobs, conversion settings and the registry that owns them.
//!
//! The registry is the only shared mutable state in the crate. Ingestion
//! creates jobs, the preview coordinator and batch dispatcher only update
//! their status fields through [`JobUpdate`], and removal is always an
//! explicit caller action.

mod registry;
mod types;

pub use registry::{InMemoryJobRegistry, JobRegistry, RegistryEvent, RegistrySnapshot};
pub use types::{
    ConversionSettings, Job, JobId, JobStatus, JobUpdate, SettingsUpdate, TargetFormat,
};
