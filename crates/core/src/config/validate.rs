use super::{
    types::{Config, TlsConfig},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Ports are not 0
/// - Retry policy makes at least one attempt and never shrinks the delay
/// - Connection pool and stage channels have room for one unit
/// - Client certificate and key are configured together
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.daemon.port == 0 {
        return Err(ConfigError::ValidationError(
            "daemon.port cannot be 0".to_string(),
        ));
    }

    if config.ingest.port == 0 {
        return Err(ConfigError::ValidationError(
            "ingest.port cannot be 0".to_string(),
        ));
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if !(config.retry.backoff_multiplier >= 1.0) {
        return Err(ConfigError::ValidationError(
            "retry.backoff_multiplier must be >= 1.0".to_string(),
        ));
    }

    if config.daemon.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "daemon.max_connections must be at least 1".to_string(),
        ));
    }

    if config.ingest.channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "ingest.channel_capacity must be at least 1".to_string(),
        ));
    }

    validate_tls("daemon.tls", &config.daemon.tls)?;
    validate_tls("ingest.tls", &config.ingest.tls)?;

    Ok(())
}

fn validate_tls(section: &str, tls: &TlsConfig) -> Result<(), ConfigError> {
    if tls.cert_path.is_some() != tls.key_path.is_some() {
        return Err(ConfigError::ValidationError(format!(
            "{}: cert_path and key_path must be set together",
            section
        )));
    }
    Ok(())
}
