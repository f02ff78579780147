//! Resources created alongside a pod: data volumes, port access records and
//! the container record.

use serde::{Deserialize, Serialize};

use crate::domain::models::llm::LlmContainerType;
use crate::domain::models::resource::ResourceBase;
use crate::impl_resource;

/// Data disk attached to an LLM or Dify pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(flatten)]
    pub base: ResourceBase,
    /// Owning LLM or Dify id.
    pub llm_id: String,
    #[serde(default)]
    pub disk_id: String,
    pub size_mb: i64,
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub template_id: String,
    /// Full names of instant models mounted on this volume.
    #[serde(default)]
    pub mounted_models: Vec<String>,
}

impl_resource!(Volume, "volumes_tbl", "volume", "volumes");

/// Host port mapped onto a container port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessInfo {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub llm_id: String,
    pub protocol: String,
    pub listen_port: i32,
    pub access_port: i32,
    #[serde(default)]
    pub remote_ips: Vec<String>,
}

impl_resource!(AccessInfo, "access_infos_tbl", "access_info", "access_infos");

/// Local record of a compute container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmContainer {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub llm_id: String,
    /// Container id on the compute service.
    pub cmp_id: String,
    pub container_type: LlmContainerType,
}

impl_resource!(LlmContainer, "llm_containers_tbl", "llm_container", "llm_containers");
