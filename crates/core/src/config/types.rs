use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use crate::batch::BatchConfig;
use crate::engine::EngineConfig;
use crate::ingest::IngestConfig;
use crate::job::ConversionSettings;
use crate::preview::PreviewConfig;

/// Root configuration. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Initial conversion settings.
    #[serde(default)]
    pub settings: ConversionSettings,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

/// Config view for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub engine: SanitizedEngineConfig,
    pub preview: PreviewConfig,
    pub max_concurrent_probes: usize,
    pub batch: BatchConfig,
    pub settings: ConversionSettings,
}

/// Engine config without local filesystem layout.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEngineConfig {
    pub heif_decoder: String,
    pub timeout_secs: u64,
    pub preview_max_dimension: u32,
    pub max_parallel_conversions: usize,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            engine: SanitizedEngineConfig {
                heif_decoder: config
                    .engine
                    .heif_decoder_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                timeout_secs: config.engine.timeout_secs,
                preview_max_dimension: config.engine.preview_max_dimension,
                max_parallel_conversions: config.engine.max_parallel_conversions,
            },
            preview: config.preview.clone(),
            max_concurrent_probes: config.ingest.max_concurrent_probes,
            batch: config.batch.clone(),
            settings: config.settings.clone(),
        }
    }
}
