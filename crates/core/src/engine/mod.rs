//! Image engine abstraction.
//!
//! Everything that touches pixels goes through the [`ImageEngine`] trait:
//! analysis, size lookup, preview generation and batch conversion. The rest
//! of the crate treats the engine as opaque.
//!
//! # Example
//!
//! ```ignore
//! use imgbatch_core::engine::{EngineConfig, ImageEngine, NativeEngine};
//!
//! let engine = NativeEngine::new(EngineConfig::default());
//!
//! // Fails early if the HEIF decoder is not installed
//! engine.validate().await?;
//!
//! let meta = engine.analyze(Path::new("/photos/IMG_0001.HEIC")).await?;
//! println!("{}x{} {}", meta.width, meta.height, meta.format);
//!
//! let preview = engine.generate_preview(Path::new("/photos/IMG_0001.HEIC")).await?;
//! ```

mod config;
mod error;
mod native;
mod traits;
mod types;

pub use config::EngineConfig;
pub use error::EngineError;
pub use native::NativeEngine;
pub use traits::ImageEngine;
pub use types::{
    extension_of, normalize_format, BatchItem, BatchItemResult, ConversionProgress, ImageMetadata,
    SUPPORTED_EXTENSIONS,
};
