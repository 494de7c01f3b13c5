pub mod batch;
pub mod config;
pub mod engine;
pub mod ingest;
pub mod job;
pub mod metrics;
pub mod preview;
pub mod session;
pub mod testing;

pub use batch::{BatchConfig, BatchDispatcher, BatchReport, CollisionPolicy, DispatchError};
pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, SanitizedConfig,
};
pub use engine::{EngineConfig, EngineError, ImageEngine, NativeEngine};
pub use ingest::{IngestConfig, IngestReport, Ingestor};
pub use job::{
    ConversionSettings, InMemoryJobRegistry, Job, JobId, JobRegistry, JobStatus, JobUpdate,
    RegistryEvent, RegistrySnapshot, SettingsUpdate, TargetFormat,
};
pub use preview::{PreviewConfig, PreviewCoordinator, PreviewEvent, PreviewHandle, PreviewState};
pub use session::ConversionSession;
