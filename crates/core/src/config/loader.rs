use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
///
/// Variables are prefixed with `NOITLINK_` and nest on `__`, so
/// `NOITLINK_DAEMON__PORT=43191` overrides `daemon.port` and
/// `NOITLINK_RETRY__MAX_ATTEMPTS=5` overrides `retry.max_attempts`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("NOITLINK_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[daemon]
port = 9000

[store]
path = "/data/metrics.db"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.daemon.port, 9000);
        assert_eq!(config.store.path.to_str().unwrap(), "/data/metrics.db");
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[daemon]
port = "not-a-port"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/noitlink.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_env_overrides_multi_word_keys() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("noitlink.toml", "[daemon]\nport = 1234\n")?;
            jail.set_env("NOITLINK_DAEMON__PORT", "4321");
            jail.set_env("NOITLINK_RETRY__MAX_ATTEMPTS", "9");
            jail.set_env("NOITLINK_DAEMON__REQUEST_TIMEOUT_MS", "777");
            jail.set_env("NOITLINK_INGEST__SOURCE_NAME", "stratcon-east");

            let config = load_config(Path::new("noitlink.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.daemon.port, 4321);
            assert_eq!(config.retry.max_attempts, 9);
            assert_eq!(config.daemon.request_timeout_ms, 777);
            assert_eq!(config.ingest.source_name, "stratcon-east");
            Ok(())
        });
    }

    #[test]
    fn test_load_config_from_file() {
        // Inside a jail so overrides set by other tests cannot leak in.
        figment::Jail::expect_with(|_jail| {
            let mut temp_file = NamedTempFile::new().unwrap();
            writeln!(
                temp_file,
                r#"
[daemon]
host = "10.0.0.5"
port = 43191

[ingest]
journal_dir = "/tmp/journals"
"#
            )
            .unwrap();

            let config = load_config(temp_file.path()).unwrap();
            assert_eq!(config.daemon.host, "10.0.0.5");
            assert_eq!(config.daemon.port, 43191);
            assert_eq!(config.ingest.journal_dir.to_str().unwrap(), "/tmp/journals");
            Ok(())
        });
    }
}
