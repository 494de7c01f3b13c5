//! Preview generation for formats that cannot be displayed directly.
//!
//! At most `max_in_flight` requests run at once no matter how many jobs are
//! queued. Each job is requested at most once; a failure marks only that job
//! as having no preview.
//!
//! # Example
//!
//! ```ignore
//! use imgbatch_core::preview::{PreviewConfig, PreviewCoordinator};
//!
//! let previews = PreviewCoordinator::spawn(engine.clone(), PreviewConfig::default());
//!
//! previews.request(&report.jobs).await;
//! let mut events = previews.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

mod config;
mod coordinator;
mod types;

pub use config::PreviewConfig;
pub use coordinator::{PreviewCoordinator, PreviewHandle};
pub use types::{PreviewEvent, PreviewSnapshot, PreviewState};
