//! LLM instance model.
//!
//! An LLM is a pod on the compute fleet running a model server container.
//! Its `status` column walks through [`LlmStatus`] values as tasks drive
//! provisioning, power operations and teardown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::resource::ResourceBase;
use crate::impl_resource;

/// Container flavour backing an LLM or Dify deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmContainerType {
    Ollama,
    Dify,
}

impl Default for LlmContainerType {
    fn default() -> Self {
        Self::Ollama
    }
}

impl LlmContainerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Dify => "dify",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "dify" => Some(Self::Dify),
            _ => None,
        }
    }

    /// Whether this type serves a model directly (as opposed to an app stack).
    pub fn is_llm_container_type(&self) -> bool {
        matches!(self, Self::Ollama)
    }
}

/// Status values an LLM or Dify record moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmStatus {
    Creating,
    CreatingPod,
    CreatePodFailed,
    CreateFail,
    Ready,
    Running,
    StartStart,
    Starting,
    StartFailed,
    StartStop,
    Stopping,
    StopFailed,
    StartSyncstatus,
    Syncstatus,
    PullingModel,
    PullModelFailed,
    SyncingModels,
    StartDelete,
    Deleting,
    DeleteFailed,
    Unknown,
    NoServer,
    NoContainer,
}

impl Default for LlmStatus {
    fn default() -> Self {
        Self::Creating
    }
}

impl LlmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::CreatingPod => "creating_pod",
            Self::CreatePodFailed => "create_pod_failed",
            Self::CreateFail => "create_fail",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::StartStart => "start_start",
            Self::Starting => "starting",
            Self::StartFailed => "start_failed",
            Self::StartStop => "start_stop",
            Self::Stopping => "stopping",
            Self::StopFailed => "stop_failed",
            Self::StartSyncstatus => "start_syncstatus",
            Self::Syncstatus => "syncstatus",
            Self::PullingModel => "pulling_model",
            Self::PullModelFailed => "pull_model_failed",
            Self::SyncingModels => "syncing_models",
            Self::StartDelete => "start_delete",
            Self::Deleting => "deleting",
            Self::DeleteFailed => "delete_failed",
            Self::Unknown => "unknown",
            Self::NoServer => "no_server",
            Self::NoContainer => "no_container",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let status = match s {
            "creating" => Self::Creating,
            "creating_pod" => Self::CreatingPod,
            "create_pod_failed" => Self::CreatePodFailed,
            "create_fail" => Self::CreateFail,
            "ready" => Self::Ready,
            "running" => Self::Running,
            "start_start" => Self::StartStart,
            "starting" => Self::Starting,
            "start_failed" => Self::StartFailed,
            "start_stop" => Self::StartStop,
            "stopping" => Self::Stopping,
            "stop_failed" => Self::StopFailed,
            "start_syncstatus" => Self::StartSyncstatus,
            "syncstatus" => Self::Syncstatus,
            "pulling_model" => Self::PullingModel,
            "pull_model_failed" => Self::PullModelFailed,
            "syncing_models" => Self::SyncingModels,
            "start_delete" => Self::StartDelete,
            "deleting" => Self::Deleting,
            "delete_failed" => Self::DeleteFailed,
            "unknown" => Self::Unknown,
            "no_server" => Self::NoServer,
            "no_container" => Self::NoContainer,
            _ => return None,
        };
        Some(status)
    }

    /// Statuses in which a start request makes no sense.
    pub fn is_running_like(&self) -> bool {
        matches!(self, Self::Running | Self::StartStart | Self::Starting)
    }

    /// Statuses that accept model install/uninstall requests.
    pub fn accepts_model_changes(&self) -> bool {
        matches!(self, Self::Running | Self::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            Self::CreatePodFailed
                | Self::CreateFail
                | Self::StartFailed
                | Self::StopFailed
                | Self::PullModelFailed
                | Self::DeleteFailed
        )
    }
}

/// A deployed LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Llm {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub llm_sku_id: String,
    pub llm_image_id: String,
    #[serde(default)]
    pub llm_type: LlmContainerType,
    /// Compute server (pod) id backing this LLM.
    #[serde(default)]
    pub svr_id: String,
    #[serde(default)]
    pub network_type: String,
    #[serde(default)]
    pub network_id: String,
    /// Overrides the sku bandwidth when non-zero.
    #[serde(default)]
    pub bandwidth_mb: i64,
    /// Instant model capacity limit in GB, 0 means unlimited.
    #[serde(default)]
    pub instant_model_quota_gb: i64,
    #[serde(default)]
    pub prefer_host: String,
    #[serde(default)]
    pub last_instant_model_probe: Option<DateTime<Utc>>,
}

impl_resource!(Llm, "llms_tbl", "llm", "llms");

impl Llm {
    pub fn llm_status(&self) -> LlmStatus {
        LlmStatus::from_str(&self.base.status).unwrap_or(LlmStatus::Unknown)
    }
}

/// Split `name:tag` into its parts, defaulting the tag to `latest`.
pub fn split_model_name(name: &str) -> (String, String) {
    match name.split_once(':') {
        Some((model, tag)) if !tag.is_empty() => (model.to_string(), tag.to_string()),
        Some((model, _)) => (model.to_string(), "latest".to_string()),
        None => (name.to_string(), "latest".to_string()),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCreateInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project_id: String,
    /// Sku id or name.
    pub llm_sku_id: String,
    #[serde(default)]
    pub llm_image_id: String,
    #[serde(default)]
    pub network_type: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub bandwidth_mb: i64,
    #[serde(default)]
    pub instant_model_quota_gb: i64,
    #[serde(default)]
    pub prefer_host: String,
    /// Number of instances for batch creation.
    #[serde(default)]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUpdateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub bandwidth_mb: Option<i64>,
    pub instant_model_quota_gb: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmListInput {
    /// Sku id or name.
    pub llm_sku: Option<String>,
    /// Image id or name.
    pub llm_image: Option<String>,
    pub status: Option<String>,
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub details: bool,
}

/// Enriched list/show row for an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmListDetails {
    #[serde(flatten)]
    pub llm: Llm,
    pub llm_sku: String,
    pub llm_image: String,
    pub llm_image_label: String,
    pub cpu: i64,
    pub memory_mb: i64,
    pub bandwidth_mb: i64,
    pub devices: Vec<String>,
    pub volume: String,
    pub volume_used_mb: i64,
    pub network: String,
    pub server: String,
    pub host: String,
    pub host_id: String,
    pub host_access_ip: String,
    pub host_eip: String,
    pub zone: String,
    pub zone_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub llm_status: String,
    pub mounted_models: Vec<String>,
}

impl LlmListDetails {
    pub fn new(llm: Llm) -> Self {
        Self {
            bandwidth_mb: llm.bandwidth_mb,
            llm,
            llm_sku: String::new(),
            llm_image: String::new(),
            llm_image_label: String::new(),
            cpu: 0,
            memory_mb: 0,
            devices: Vec::new(),
            volume: String::new(),
            volume_used_mb: 0,
            network: String::new(),
            server: String::new(),
            host: String::new(),
            host_id: String::new(),
            host_access_ip: String::new(),
            host_eip: String::new(),
            zone: String::new(),
            zone_id: String::new(),
            start_time: None,
            llm_status: LlmStatus::Unknown.as_str().to_string(),
            mounted_models: Vec::new(),
        }
    }
}

/// Per-LLM result of an accepted perform action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmPerformOutput {
    pub id: String,
    pub name: String,
    pub request_status: u16,
    #[serde(default)]
    pub task_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmBatchPerformOutput {
    pub data: Vec<LlmPerformOutput>,
}

/// Response of `GET /llms/{id}/url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAccessUrl {
    pub access_url: String,
}

/// Response of `GET /llms/available-network`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailableNetworkOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_alloc_network_hostlocal_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_alloc_network_guest_count: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_all() {
        for status in [
            LlmStatus::CreatingPod,
            LlmStatus::PullModelFailed,
            LlmStatus::StartSyncstatus,
            LlmStatus::NoContainer,
        ] {
            assert_eq!(LlmStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(LlmStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_running_like() {
        assert!(LlmStatus::Running.is_running_like());
        assert!(!LlmStatus::Ready.is_running_like());
        assert!(LlmStatus::Ready.accepts_model_changes());
        assert!(!LlmStatus::Creating.accepts_model_changes());
    }

    #[test]
    fn test_split_model_name() {
        assert_eq!(split_model_name("qwen2"), ("qwen2".into(), "latest".into()));
        assert_eq!(split_model_name("qwen2:7b"), ("qwen2".into(), "7b".into()));
        assert_eq!(split_model_name("qwen2:"), ("qwen2".into(), "latest".into()));
    }

    #[test]
    fn test_container_type() {
        assert_eq!(LlmContainerType::from_str("Ollama"), Some(LlmContainerType::Ollama));
        assert!(LlmContainerType::Ollama.is_llm_container_type());
        assert!(!LlmContainerType::Dify.is_llm_container_type());
    }
}
