//! Image engine backed by the `image` crate and an external HEIF decoder.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use image::codecs::jpeg::JpegEncoder;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, ImageResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::config::EngineConfig;
use super::error::EngineError;
use super::traits::ImageEngine;
use super::types::{
    extension_of, normalize_format, BatchItem, BatchItemResult, ConversionProgress, ImageMetadata,
    SUPPORTED_EXTENSIONS,
};
use crate::job::{ConversionSettings, TargetFormat};

/// Wraps a decode failure into the error variant of the calling operation.
type ErrorWrap = fn(&Path, String) -> EngineError;

/// Native engine.
///
/// JPEG and PNG are handled in-process on the blocking pool. HEIC/HEIF files
/// are first decoded to a scratch PNG by `heif_decoder_path`.
pub struct NativeEngine {
    config: EngineConfig,
}

impl NativeEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Checks the extension and returns the canonical format tag.
    fn format_of(path: &Path) -> Result<String, EngineError> {
        let ext = extension_of(path).unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(EngineError::UnsupportedFormat { format: ext });
        }
        Ok(normalize_format(&ext))
    }

    fn is_heif(format: &str) -> bool {
        matches!(format, "heic" | "heif")
    }

    /// Unique scratch file name derived from the source path.
    fn scratch_path(&self, source: &Path, prefix: &str, ext: &str) -> PathBuf {
        let digest = Sha256::digest(source.to_string_lossy().as_bytes());
        let hash = format!("{:x}", digest);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        self.config
            .temp_dir
            .join(format!("{}_{}_{}.{}", prefix, &hash[..16], nanos, ext))
    }

    async fn ensure_temp_dir(&self) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(&self.config.temp_dir)
            .await
            .map_err(|e| EngineError::io(&self.config.temp_dir, e))
    }

    /// Runs the external decoder, producing a PNG in the temp dir.
    async fn decode_heif(&self, path: &Path, wrap: ErrorWrap) -> Result<PathBuf, EngineError> {
        self.ensure_temp_dir().await?;
        let target = self.scratch_path(path, "decode", "png");

        let child = Command::new(&self.config.heif_decoder_path)
            .arg(path)
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::DecoderNotFound {
                        path: self.config.heif_decoder_path.clone(),
                    }
                } else {
                    EngineError::io(&self.config.heif_decoder_path, e)
                }
            })?;

        // Dropping the future on timeout kills the child.
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let output = match timeout(timeout_duration, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(EngineError::io(path, e)),
            Err(_) => {
                return Err(EngineError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(wrap(
                path,
                format!(
                    "decoder exited with code {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            ));
        }

        debug!(source = %path.display(), target = %target.display(), "Decoded HEIF image");
        Ok(target)
    }

    /// Fully decodes an image.
    async fn load_image(&self, path: &Path, wrap: ErrorWrap) -> Result<DynamicImage, EngineError> {
        let format = Self::format_of(path)?;

        if Self::is_heif(&format) {
            let decoded = self.decode_heif(path, wrap).await?;
            let image = decode_blocking(decoded.clone()).await;
            let _ = tokio::fs::remove_file(&decoded).await;
            return image.map_err(|reason| wrap(path, reason));
        }

        decode_blocking(path.to_path_buf())
            .await
            .map_err(|reason| wrap(path, reason))
    }

    async fn convert_item(
        &self,
        item: &BatchItem,
        settings: &ConversionSettings,
        progress_tx: Option<&mpsc::Sender<ConversionProgress>>,
    ) -> Result<PathBuf, EngineError> {
        let image = self
            .load_image(&item.source_path, |p, r| EngineError::conversion(p, r))
            .await?;
        report_progress(progress_tx, item, 50);

        let output = item.output_path.clone();
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || encode_output(&image, &output, &settings))
            .await
            .map_err(|e| EngineError::conversion(&item.output_path, e.to_string()))?
            .map_err(|e| EngineError::conversion(&item.output_path, e.to_string()))?;
        report_progress(progress_tx, item, 100);

        Ok(item.output_path.clone())
    }
}

fn report_progress(
    progress_tx: Option<&mpsc::Sender<ConversionProgress>>,
    item: &BatchItem,
    percent: u8,
) {
    if let Some(tx) = progress_tx {
        // Non-blocking send
        let _ = tx.try_send(ConversionProgress {
            id: item.id,
            percent,
        });
    }
}

async fn decode_blocking(path: PathBuf) -> Result<DynamicImage, String> {
    tokio::task::spawn_blocking(move || read_oriented(&path).map_err(|e| e.to_string()))
        .await
        .map_err(|e| e.to_string())?
}

/// Decodes an image with its EXIF orientation applied.
fn read_oriented(path: &Path) -> ImageResult<DynamicImage> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = read_orientation(&mut decoder);
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Displayed dimensions, without decoding pixel data.
fn read_dimensions(path: &Path) -> ImageResult<(u32, u32)> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let (width, height) = decoder.dimensions();
    if swaps_dimensions(read_orientation(&mut decoder)) {
        Ok((height, width))
    } else {
        Ok((width, height))
    }
}

/// Missing or unreadable EXIF means upright.
fn read_orientation(decoder: &mut impl ImageDecoder) -> Orientation {
    decoder.orientation().unwrap_or(Orientation::NoTransforms)
}

fn swaps_dimensions(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

fn encode_output(
    image: &DynamicImage,
    output: &Path,
    settings: &ConversionSettings,
) -> ImageResult<()> {
    match settings.target_format {
        TargetFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            let writer = BufWriter::new(File::create(output)?);
            rgb.write_with_encoder(JpegEncoder::new_with_quality(writer, settings.quality))
        }
        TargetFormat::Png => image.save_with_format(output, ImageFormat::Png),
    }
}

fn encode_preview(image: &DynamicImage, output: &Path, max_dim: u32, quality: u8) -> ImageResult<()> {
    let thumb = image.thumbnail(max_dim, max_dim);
    let rgb = DynamicImage::ImageRgb8(thumb.to_rgb8());
    let writer = BufWriter::new(File::create(output)?);
    rgb.write_with_encoder(JpegEncoder::new_with_quality(writer, quality))
}

#[async_trait]
impl ImageEngine for NativeEngine {
    fn name(&self) -> &str {
        "native"
    }

    async fn analyze(&self, path: &Path) -> Result<ImageMetadata, EngineError> {
        let format = Self::format_of(path)?;

        if Self::is_heif(&format) {
            let image = self
                .load_image(path, |p, r| EngineError::analysis(p, r))
                .await?;
            return Ok(ImageMetadata {
                width: image.width(),
                height: image.height(),
                format,
            });
        }

        let source = path.to_path_buf();
        let (width, height) =
            tokio::task::spawn_blocking(move || read_dimensions(&source).map_err(|e| e.to_string()))
                .await
                .map_err(|e| EngineError::analysis(path, e.to_string()))?
                .map_err(|reason| EngineError::analysis(path, reason))?;

        Ok(ImageMetadata {
            width,
            height,
            format,
        })
    }

    async fn file_size(&self, path: &Path) -> Result<u64, EngineError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| EngineError::io(path, e))?;
        Ok(metadata.len())
    }

    async fn generate_preview(&self, path: &Path) -> Result<PathBuf, EngineError> {
        let image = self
            .load_image(path, |p, r| EngineError::preview(p, r))
            .await?;

        self.ensure_temp_dir().await?;
        let target = self.scratch_path(path, "preview", "jpg");
        let output = target.clone();
        let max_dim = self.config.preview_max_dimension;
        let quality = self.config.preview_quality;

        tokio::task::spawn_blocking(move || encode_preview(&image, &output, max_dim, quality))
            .await
            .map_err(|e| EngineError::preview(path, e.to_string()))?
            .map_err(|e| EngineError::preview(path, e.to_string()))?;

        debug!(source = %path.display(), preview = %target.display(), "Generated preview");
        Ok(target)
    }

    async fn convert_batch(
        &self,
        items: Vec<BatchItem>,
        settings: ConversionSettings,
        progress_tx: Option<mpsc::Sender<ConversionProgress>>,
    ) -> Result<Vec<BatchItemResult>, EngineError> {
        for item in &items {
            if let Some(parent) = item.output_path.parent() {
                if parent.as_os_str().is_empty() {
                    continue;
                }
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    EngineError::batch_submission(format!(
                        "cannot create output directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let parallel = self.config.max_parallel_conversions.max(1);
        let settings = &settings;
        let results = stream::iter(items)
            .map(|item| {
                let tx = progress_tx.clone();
                async move {
                    match self.convert_item(&item, settings, tx.as_ref()).await {
                        Ok(output_path) => BatchItemResult::ok(item.id, output_path),
                        Err(e) => {
                            warn!(id = %item.id, source = %item.source_path.display(), error = %e, "Conversion failed");
                            BatchItemResult::failed(item.id, e.to_string())
                        }
                    }
                }
            })
            .buffer_unordered(parallel)
            .collect::<Vec<_>>()
            .await;

        Ok(results)
    }

    async fn validate(&self) -> Result<(), EngineError> {
        let result = Command::new(&self.config.heif_decoder_path)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await;

        if let Err(e) = result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(EngineError::DecoderNotFound {
                    path: self.config.heif_decoder_path.clone(),
                });
            }
            return Err(EngineError::io(&self.config.heif_decoder_path, e));
        }

        self.ensure_temp_dir().await
    }
}
