use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::infrastructure::logging::LogConfig;

/// Main configuration of the LLM service (`llm.conf`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Address the API listens on
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Region passed to the compute and image services
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Remote platform endpoints
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub tasks: TaskConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    30892
}

fn default_region() -> String {
    "region0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            region: default_region(),
            database: DatabaseConfig::default(),
            endpoints: EndpointsConfig::default(),
            tasks: TaskConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// sqlx connection url
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite:/opt/cloud/workspace/llm/llm.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EndpointsConfig {
    /// Compute service base url, e.g. `https://10.0.0.1:30888`
    #[serde(default)]
    pub compute_url: String,

    /// Image service base url
    #[serde(default)]
    pub image_url: String,

    /// Token sent as `X-Auth-Token`
    #[serde(default)]
    pub auth_token: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Registry instant models are imported from
    #[serde(default = "default_model_registry_url")]
    pub model_registry_url: String,
}

const fn default_request_timeout() -> u64 {
    60
}

fn default_model_registry_url() -> String {
    "https://registry.ollama.ai".to_string()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            compute_url: String::new(),
            image_url: String::new(),
            auth_token: String::new(),
            request_timeout_secs: default_request_timeout(),
            model_registry_url: default_model_registry_url(),
        }
    }
}

/// Task runner and polling knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskConfig {
    /// Concurrent task stages
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_server_timeout")]
    pub server_timeout_secs: u64,

    #[serde(default = "default_pull_timeout")]
    pub model_pull_timeout_secs: u64,

    /// Retry window for overlay mount/unmount on busy containers
    #[serde(default = "default_mount_timeout")]
    pub mount_timeout_secs: u64,

    #[serde(default = "default_mount_retry")]
    pub mount_retry_interval_secs: u64,

    /// Minimum time between two instant model probes of one LLM
    #[serde(default = "default_probe_interval")]
    pub instant_model_probe_interval_secs: u64,

    /// Scratch space for instant model imports
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// How long an imported image may take to become active
    #[serde(default = "default_import_timeout")]
    pub import_timeout_secs: u64,
}

const fn default_workers() -> usize {
    8
}

const fn default_poll_interval() -> u64 {
    5
}

const fn default_server_timeout() -> u64 {
    1800
}

const fn default_pull_timeout() -> u64 {
    3600
}

const fn default_mount_timeout() -> u64 {
    600
}

const fn default_mount_retry() -> u64 {
    5
}

const fn default_probe_interval() -> u64 {
    60
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("/opt/cloud/workspace/llm")
}

const fn default_import_timeout() -> u64 {
    1800
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_secs: default_poll_interval(),
            server_timeout_secs: default_server_timeout(),
            model_pull_timeout_secs: default_pull_timeout(),
            mount_timeout_secs: default_mount_timeout(),
            mount_retry_interval_secs: default_mount_retry(),
            instant_model_probe_interval_secs: default_probe_interval(),
            working_dir: default_working_dir(),
            import_timeout_secs: default_import_timeout(),
        }
    }
}
