use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::{Config, StoreBackend};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Store path cannot be empty for the sqlite backend")]
    EmptyStorePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid workers: {0}. Must be between 1 and 256")]
    InvalidWorkers(usize),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid retention: {0} must be at least 1 hour")]
    InvalidRetention(&'static str),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .threadloom/config.yaml
    /// 3. .threadloom/local.yaml (optional overrides)
    /// 4. Environment variables (THREADLOOM_* prefix, `__` between sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".threadloom/config.yaml"))
            .merge(Yaml::file(".threadloom/local.yaml"))
            .merge(Env::prefixed("THREADLOOM_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file. Environment variables still
    /// take precedence over the file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("THREADLOOM_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.store.backend == StoreBackend::Sqlite && config.store.path.is_empty() {
            return Err(ConfigError::EmptyStorePath);
        }
        if config.store.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.store.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.dispatcher.workers == 0 || config.dispatcher.workers > 256 {
            return Err(ConfigError::InvalidWorkers(config.dispatcher.workers));
        }

        if config.dispatcher.initial_backoff_ms >= config.dispatcher.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.dispatcher.initial_backoff_ms,
                config.dispatcher.max_backoff_ms,
            ));
        }

        if config.retention.ephemeral_thread_ttl_hours == 0 {
            return Err(ConfigError::InvalidRetention("ephemeral_thread_ttl_hours"));
        }
        if config.retention.finished_run_ttl_hours == 0 {
            return Err(ConfigError::InvalidRetention("finished_run_ttl_hours"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.path, ".threadloom/threadloom.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.retention.ephemeral_thread_ttl_hours, 12);
        assert_eq!(config.retention.finished_run_ttl_hours, 12);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
store:
  backend: memory
logging:
  level: debug
  format: pretty
  rotation: hourly
dispatcher:
  workers: 8
  max_retries: 3
retention:
  finished_run_ttl_hours: 24
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.rotation, "hourly");
        assert_eq!(config.dispatcher.workers, 8);
        assert_eq!(config.dispatcher.max_retries, 3);
        assert_eq!(config.dispatcher.initial_backoff_ms, 100);
        assert_eq!(config.retention.finished_run_ttl_hours, 24);
        assert_eq!(config.retention.ephemeral_thread_ttl_hours, 12);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_empty_store_path_only_matters_for_sqlite() {
        let mut config = Config::default();
        config.store.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyStorePath
        ));

        config.store.backend = StoreBackend::Memory;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.dispatcher.workers = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWorkers(0)
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.dispatcher.initial_backoff_ms = 30000;
        config.dispatcher.max_backoff_ms = 10000;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(30000, 10000)
        ));
    }

    #[test]
    fn test_validate_zero_retention() {
        let mut config = Config::default();
        config.retention.finished_run_ttl_hours = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRetention("finished_run_ttl_hours")
        ));
    }

    #[test]
    fn test_env_override_beats_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  level: info\ndispatcher:\n  workers: 2").unwrap();
        file.flush().unwrap();

        temp_env::with_vars(
            [
                ("THREADLOOM_LOGGING__LEVEL", Some("debug")),
                ("THREADLOOM_STORE__BACKEND", Some("memory")),
            ],
            || {
                let config = ConfigLoader::load_from_file(file.path()).unwrap();
                assert_eq!(config.logging.level, "debug");
                assert_eq!(config.store.backend, StoreBackend::Memory);
                assert_eq!(config.dispatcher.workers, 2);
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "dispatcher:\n  workers: 5\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "dispatcher:\n  workers: 15\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.dispatcher.workers, 15, "Override should win");
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  format: xml").unwrap();
        file.flush().unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("xml"));
    }
}
