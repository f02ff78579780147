use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::Rotation;

/// `[logging]` section of the service config.
///
/// A missing key falls back to the value in [`LogConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error; `RUST_LOG` wins when set
    pub level: String,
    pub format: LogFormat,
    /// Rolling JSON files are written here when set
    pub log_dir: Option<PathBuf>,
    pub enable_stdout: bool,
    pub rotation: RotationPolicy,
    /// Rotated files kept in `log_dir`
    pub max_log_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
            max_log_files: 30,
        }
    }
}

impl LogConfig {
    /// Stdout stays on when there is no file sink, whatever `enable_stdout` says.
    pub fn writes_stdout(&self) -> bool {
        self.enable_stdout || self.log_dir.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl From<RotationPolicy> for Rotation {
    fn from(policy: RotationPolicy) -> Self {
        match policy {
            RotationPolicy::Daily => Rotation::DAILY,
            RotationPolicy::Hourly => Rotation::HOURLY,
            RotationPolicy::Never => Rotation::NEVER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: LogConfig = serde_yaml::from_str("format: pretty\nrotation: hourly\n").unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.rotation, RotationPolicy::Hourly);
        assert_eq!(config.level, "info");
        assert_eq!(config.max_log_files, 30);
        assert!(config.enable_stdout);
    }

    #[test]
    fn test_stdout_forced_without_file_sink() {
        let config = LogConfig {
            enable_stdout: false,
            ..LogConfig::default()
        };
        assert!(config.writes_stdout());

        let config = LogConfig {
            enable_stdout: false,
            log_dir: Some(PathBuf::from("/var/log/llm")),
            ..LogConfig::default()
        };
        assert!(!config.writes_stdout());
    }

    #[test]
    fn test_rotation_mapping() {
        assert_eq!(Rotation::from(RotationPolicy::Hourly), Rotation::HOURLY);
        assert_eq!(Rotation::from(RotationPolicy::Never), Rotation::NEVER);
    }
}
