use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Preview, probe and conversion concurrency limits are not 0
/// - At least one preview format is configured
/// - Default quality is within 1-100
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.preview.max_in_flight == 0 {
        return Err(ConfigError::ValidationError(
            "preview.max_in_flight must be at least 1".to_string(),
        ));
    }

    if config.preview.formats.is_empty() {
        return Err(ConfigError::ValidationError(
            "preview.formats cannot be empty".to_string(),
        ));
    }

    if config.ingest.max_concurrent_probes == 0 {
        return Err(ConfigError::ValidationError(
            "ingest.max_concurrent_probes must be at least 1".to_string(),
        ));
    }

    if config.engine.max_parallel_conversions == 0 {
        return Err(ConfigError::ValidationError(
            "engine.max_parallel_conversions must be at least 1".to_string(),
        ));
    }

    if !(1..=100).contains(&config.settings.quality) {
        return Err(ConfigError::ValidationError(format!(
            "settings.quality must be between 1 and 100, got {}",
            config.settings.quality
        )));
    }

    Ok(())
}
