use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Default location of the service config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/yunion/llm.conf";

/// Prefix of environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "LLM_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port: {0}. Must be between 1 and 65535")]
    InvalidPort(u16),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Database url cannot be empty")]
    EmptyDatabaseUrl,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid workers: {0}. Must be between 1 and 256")]
    InvalidWorkers(usize),

    #[error("Invalid {name}: must be positive")]
    ZeroInterval { name: &'static str },

    #[error("Invalid endpoint {name}: {url} must start with http:// or https://")]
    InvalidEndpoint { name: &'static str, url: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. The YAML file at `path`, or `/etc/yunion/llm.conf` (optional)
    /// 3. Environment variables (`LLM_*`, highest priority)
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), Path::to_path_buf);
        let config: Config = Self::figment(&path)
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// The merged provider stack, exposed for inspection in tests.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.port == 0 {
            return Err(ConfigError::InvalidPort(config.port));
        }
        if config.address.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("address cannot be empty".to_string()));
        }

        if config.database.url.trim().is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        for (name, url) in [
            ("compute_url", &config.endpoints.compute_url),
            ("image_url", &config.endpoints.image_url),
            ("model_registry_url", &config.endpoints.model_registry_url),
        ] {
            if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidEndpoint { name, url: url.clone() });
            }
        }
        if config.endpoints.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroInterval { name: "request_timeout_secs" });
        }

        let tasks = &config.tasks;
        if tasks.workers == 0 || tasks.workers > 256 {
            return Err(ConfigError::InvalidWorkers(tasks.workers));
        }
        for (name, value) in [
            ("poll_interval_secs", tasks.poll_interval_secs),
            ("server_timeout_secs", tasks.server_timeout_secs),
            ("model_pull_timeout_secs", tasks.model_pull_timeout_secs),
            ("mount_timeout_secs", tasks.mount_timeout_secs),
            ("mount_retry_interval_secs", tasks.mount_retry_interval_secs),
            ("import_timeout_secs", tasks.import_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { name });
            }
        }
        if !tasks.working_dir.is_absolute() {
            return Err(ConfigError::ValidationFailed(format!(
                "working_dir {} must be an absolute path",
                tasks.working_dir.display()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::logging::LogFormat;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn missing_file() -> PathBuf {
        PathBuf::from("/nonexistent/llm.conf")
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 30892);
        assert_eq!(config.tasks.workers, 8);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
port: 8080
region: region1
database:
  url: sqlite::memory:
  max_connections: 2
endpoints:
  compute_url: https://10.0.0.1:30888
  auth_token: secret
tasks:
  workers: 2
  poll_interval_secs: 1
logging:
  level: debug
  format: pretty
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.port, 8080);
        assert_eq!(config.region, "region1");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.endpoints.auth_token, "secret");
        assert_eq!(config.endpoints.request_timeout_secs, 60);
        assert_eq!(config.tasks.workers, 2);
        assert_eq!(config.tasks.server_timeout_secs, 1800);
        assert_eq!(config.tasks.working_dir, PathBuf::from("/opt/cloud/workspace/llm"));
        assert_eq!(config.endpoints.model_registry_url, "https://registry.ollama.ai");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.port = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidPort(0))));

        let mut config = Config::default();
        config.database.url = String::new();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDatabaseUrl)));

        let mut config = Config::default();
        config.tasks.workers = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidWorkers(0))));

        let mut config = Config::default();
        config.tasks.poll_interval_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroInterval { name: "poll_interval_secs" })
        ));

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "loud"),
            other => panic!("Expected InvalidLogLevel, got {other:?}"),
        }

        let mut config = Config::default();
        config.endpoints.image_url = "10.0.0.1:30292".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidEndpoint { name: "image_url", .. })
        ));

        let mut config = Config::default();
        config.tasks.working_dir = PathBuf::from("workspace/llm");
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        temp_env::with_vars_unset(["LLM_PORT", "LLM_TASKS__WORKERS"], || {
            let config = ConfigLoader::load(Some(&missing_file())).unwrap();
            assert_eq!(config.port, 30892);
        });
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "port: 9000\ntasks:\n  workers: 3\n  poll_interval_secs: 2").unwrap();
        file.flush().unwrap();

        temp_env::with_vars(
            [
                ("LLM_TASKS__WORKERS", Some("6")),
                ("LLM_LOGGING__LEVEL", Some("debug")),
                ("LLM_PORT", None),
            ],
            || {
                let config = ConfigLoader::load(Some(file.path())).unwrap();
                assert_eq!(config.port, 9000, "file value should persist");
                assert_eq!(config.tasks.workers, 6, "env should win over the file");
                assert_eq!(config.tasks.poll_interval_secs, 2);
                assert_eq!(config.logging.level, "debug");
            },
        );
    }

    #[test]
    fn test_invalid_file_value_fails_validation() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "tasks:\n  workers: 0").unwrap();
        file.flush().unwrap();

        temp_env::with_vars_unset(["LLM_TASKS__WORKERS"], || {
            let err = ConfigLoader::load(Some(file.path())).unwrap_err();
            assert!(err.to_string().contains("Invalid workers"));
        });
    }
}
