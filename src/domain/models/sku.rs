//! Deployment templates: LLM skus, container images and Dify skus.

use serde::{Deserialize, Serialize};

use crate::domain::models::llm::LlmContainerType;
use crate::domain::models::resource::ResourceBase;
use crate::impl_resource;

/// Data volume requested by a sku.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub size_mb: i64,
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub template_id: String,
}

/// Container port exposed through the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMappingSpec {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub container_port: i32,
    #[serde(default)]
    pub remote_ips: Vec<String>,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// Host device passed through to the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub dev_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// Template an LLM is created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSku {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub cpu: i64,
    pub memory_mb: i64,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub port_mappings: Vec<PortMappingSpec>,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub envs: Vec<EnvVar>,
    #[serde(default)]
    pub bandwidth_mb: i64,
    pub llm_type: LlmContainerType,
    pub llm_image_id: String,
    /// Model pulled right after creation, `name[:tag]`.
    #[serde(default)]
    pub llm_model_name: String,
    /// Instant models mounted into every LLM built from this sku.
    #[serde(default)]
    pub mounted_models: Vec<String>,
}

impl_resource!(LlmSku, "llm_skus_tbl", "llm_sku", "llm_skus");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmSkuCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cpu: i64,
    pub memory_mb: i64,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub port_mappings: Vec<PortMappingSpec>,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub envs: Vec<EnvVar>,
    #[serde(default)]
    pub bandwidth_mb: i64,
    pub llm_type: String,
    /// Image id or name.
    pub llm_image_id: String,
    #[serde(default)]
    pub llm_model_name: String,
    #[serde(default)]
    pub mounted_models: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmSkuUpdateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cpu: Option<i64>,
    pub memory_mb: Option<i64>,
    pub bandwidth_mb: Option<i64>,
    pub llm_model_name: Option<String>,
    pub mounted_models: Option<Vec<String>>,
}

/// Container image an LLM runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmImage {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub image_name: String,
    #[serde(default)]
    pub image_label: String,
    #[serde(default)]
    pub credential_id: String,
    pub llm_type: LlmContainerType,
}

impl_resource!(LlmImage, "llm_images_tbl", "llm_image", "llm_images");

impl LlmImage {
    /// Full image reference, `name:label`.
    pub fn image_ref(&self) -> String {
        if self.image_label.is_empty() {
            self.image_name.clone()
        } else {
            format!("{}:{}", self.image_name, self.image_label)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmImageCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image_name: String,
    #[serde(default)]
    pub image_label: String,
    #[serde(default)]
    pub credential_id: String,
    pub llm_type: String,
}

/// Component images of a Dify stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifyImages {
    pub postgres_image_id: String,
    pub redis_image_id: String,
    pub nginx_image_id: String,
    pub dify_api_image_id: String,
    pub dify_plugin_image_id: String,
    pub dify_web_image_id: String,
    pub dify_sandbox_image_id: String,
    pub dify_ssrf_image_id: String,
}

impl DifyImages {
    /// `(component, image id)` pairs, in container start order.
    pub fn components(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("postgres", self.postgres_image_id.as_str()),
            ("redis", self.redis_image_id.as_str()),
            ("sandbox", self.dify_sandbox_image_id.as_str()),
            ("ssrf_proxy", self.dify_ssrf_image_id.as_str()),
            ("plugin_daemon", self.dify_plugin_image_id.as_str()),
            ("api", self.dify_api_image_id.as_str()),
            ("worker", self.dify_api_image_id.as_str()),
            ("web", self.dify_web_image_id.as_str()),
            ("nginx", self.nginx_image_id.as_str()),
        ]
    }
}

/// Template a Dify stack is created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifySku {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub cpu: i64,
    pub memory_mb: i64,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub port_mappings: Vec<PortMappingSpec>,
    #[serde(default)]
    pub envs: Vec<EnvVar>,
    #[serde(default)]
    pub bandwidth_mb: i64,
    #[serde(flatten)]
    pub images: DifyImages,
}

impl_resource!(DifySku, "dify_skus_tbl", "dify_sku", "dify_skus");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifySkuCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cpu: i64,
    pub memory_mb: i64,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub port_mappings: Vec<PortMappingSpec>,
    #[serde(default)]
    pub envs: Vec<EnvVar>,
    #[serde(default)]
    pub bandwidth_mb: i64,
    #[serde(flatten)]
    pub images: DifyImages,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ref() {
        let mut image = LlmImage {
            base: ResourceBase::new("ollama", "active"),
            image_name: "registry.local/ollama/ollama".into(),
            image_label: String::new(),
            credential_id: String::new(),
            llm_type: LlmContainerType::Ollama,
        };
        assert_eq!(image.image_ref(), "registry.local/ollama/ollama");
        image.image_label = "0.5.7".into();
        assert_eq!(image.image_ref(), "registry.local/ollama/ollama:0.5.7");
    }

    #[test]
    fn test_port_mapping_default_protocol() {
        let pm: PortMappingSpec = serde_json::from_str(r#"{"container_port": 11434}"#).unwrap();
        assert_eq!(pm.protocol, "tcp");
    }
}
