//! Container drivers.
//!
//! A driver knows how one kind of model server is laid out inside a pod:
//! which containers it runs, where its model files live and how to reach
//! its HTTP endpoint. Drivers are looked up by [`LlmContainerType`] through
//! the [`DriverRegistry`].

pub mod dify;
pub mod ollama;

pub use dify::DifyDriver;
pub use ollama::OllamaDriver;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{
    DiskConfig, NetworkConfig, PodPortMapping, PostOverlay, ServerCreateInput, ServerDetails,
};
use crate::domain::models::{
    AccessInfo, DeviceSpec, Dify, DifySku, EnvVar, InstantModel, InternalInstantModelInfo, Llm,
    LlmContainerType, LlmImage, LlmInstantModel, LlmSku, MountDirInfo, PortMappingSpec,
    VolumeSpec,
};
use crate::domain::ports::{LlmClientDriver, ModelRegistry};

pub const POD_HYPERVISOR: &str = "pod";

/// A model package fetched into a local directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadedModel {
    pub model_id: String,
    /// Paths relative to the download directory; they become the mounts
    /// of the imported instant model.
    pub mounts: Vec<String>,
}

/// Everything a driver needs to lay out one pod.
#[derive(Debug, Clone)]
pub struct PodRequest<'a> {
    pub name: &'a str,
    pub project_id: &'a str,
    pub cpu: i64,
    pub memory_mb: i64,
    pub volumes: &'a [VolumeSpec],
    pub port_mappings: &'a [PortMappingSpec],
    pub devices: &'a [DeviceSpec],
    pub envs: &'a [EnvVar],
    pub bandwidth_mb: i64,
    pub network_type: &'a str,
    pub network_id: &'a str,
    pub prefer_host: &'a str,
    /// Container images keyed by component name.
    pub images: BTreeMap<String, LlmImage>,
}

impl<'a> PodRequest<'a> {
    pub fn for_llm(llm: &'a Llm, sku: &'a LlmSku, image: LlmImage) -> Self {
        let bandwidth_mb = if llm.bandwidth_mb > 0 {
            llm.bandwidth_mb
        } else {
            sku.bandwidth_mb
        };
        let mut images = BTreeMap::new();
        images.insert(llm.llm_type.as_str().to_string(), image);
        Self {
            name: &llm.base.name,
            project_id: &llm.base.project_id,
            cpu: sku.cpu,
            memory_mb: sku.memory_mb,
            volumes: &sku.volumes,
            port_mappings: &sku.port_mappings,
            devices: &sku.devices,
            envs: &sku.envs,
            bandwidth_mb,
            network_type: &llm.network_type,
            network_id: &llm.network_id,
            prefer_host: &llm.prefer_host,
            images,
        }
    }

    pub fn for_dify(dify: &'a Dify, sku: &'a DifySku, images: BTreeMap<String, LlmImage>) -> Self {
        let bandwidth_mb = if dify.bandwidth_mb > 0 {
            dify.bandwidth_mb
        } else {
            sku.bandwidth_mb
        };
        Self {
            name: &dify.base.name,
            project_id: &dify.base.project_id,
            cpu: sku.cpu,
            memory_mb: sku.memory_mb,
            volumes: &sku.volumes,
            port_mappings: &sku.port_mappings,
            devices: &[],
            envs: &sku.envs,
            bandwidth_mb,
            network_type: &dify.network_type,
            network_id: &dify.network_id,
            prefer_host: &dify.prefer_host,
            images,
        }
    }

    pub fn image(&self, component: &str) -> DomainResult<&LlmImage> {
        self.images
            .get(component)
            .ok_or_else(|| DomainError::Validation(format!("missing image for {component}")))
    }

    /// Server skeleton shared by every driver; the caller fills `pod.containers`.
    pub fn server_input(&self, default_ports: &[i32]) -> DomainResult<ServerCreateInput> {
        if self.volumes.is_empty() {
            return Err(DomainError::Validation("at least one volume is required".into()));
        }
        let disks = self
            .volumes
            .iter()
            .map(|v| DiskConfig {
                size: v.size_mb,
                backend: v.storage_type.clone(),
                image_id: v.template_id.clone(),
                format: String::new(),
            })
            .collect();

        let mut port_mappings: Vec<PodPortMapping> = self
            .port_mappings
            .iter()
            .map(|pm| PodPortMapping {
                protocol: pm.protocol.clone(),
                container_port: pm.container_port,
                host_port: None,
                remote_ips: pm.remote_ips.clone(),
            })
            .collect();
        for port in default_ports {
            if !port_mappings.iter().any(|pm| pm.container_port == *port) {
                port_mappings.push(PodPortMapping {
                    protocol: "tcp".to_string(),
                    container_port: *port,
                    host_port: None,
                    remote_ips: Vec::new(),
                });
            }
        }

        let mut input = ServerCreateInput {
            name: self.name.to_string(),
            project_id: self.project_id.to_string(),
            hypervisor: POD_HYPERVISOR.to_string(),
            vcpu_count: self.cpu,
            vmem_size: self.memory_mb,
            disks,
            nets: vec![NetworkConfig {
                network: self.network_id.to_string(),
                net_type: self.network_type.to_string(),
                bw_limit: self.bandwidth_mb,
            }],
            prefer_host: self.prefer_host.to_string(),
            auto_start: true,
            ..Default::default()
        };
        input.pod.port_mappings = port_mappings;
        Ok(input)
    }
}

/// Build `http://host:port` for the access record bound to `listen_port`,
/// falling back to the first server ip on the container port.
pub fn access_url(
    server: &ServerDetails,
    access_infos: &[AccessInfo],
    listen_port: i32,
) -> DomainResult<String> {
    if let Some(info) = access_infos.iter().find(|a| a.listen_port == listen_port) {
        let host = if server.host_eip.is_empty() {
            &server.host_access_ip
        } else {
            &server.host_eip
        };
        if !host.is_empty() {
            return Ok(format!("http://{host}:{}", info.access_port));
        }
    }
    if let Some(mapping) = server.port_mappings.iter().find(|p| p.port == listen_port) {
        if !server.host_access_ip.is_empty() {
            return Ok(format!("http://{}:{}", server.host_access_ip, mapping.host_port));
        }
    }
    server
        .ips
        .split(',')
        .map(str::trim)
        .find(|ip| !ip.is_empty())
        .map(|ip| format!("http://{ip}:{listen_port}"))
        .ok_or_else(|| {
            DomainError::InvalidStatus(format!("server {} has no reachable address", server.id))
        })
}

#[async_trait]
pub trait LlmContainerDriver: Send + Sync {
    fn container_type(&self) -> LlmContainerType;

    fn pod_create_input(&self, request: &PodRequest<'_>) -> DomainResult<ServerCreateInput>;

    fn llm_url(&self, server: &ServerDetails, access_infos: &[AccessInfo]) -> DomainResult<String>;

    /// Overlay layer that exposes one image directory inside the container.
    fn dir_post_overlay(&self, dir: &MountDirInfo) -> PostOverlay;

    /// Map an existing overlay back to an instant model id, given the
    /// probed `name:tag -> model_id` table.
    fn instant_model_id_by_post_overlay(
        &self,
        overlay: &PostOverlay,
        name_to_id: &HashMap<String, String>,
    ) -> Option<String>;

    /// Normalize and check the image-relative mount paths of a model package.
    fn validate_mounts(&self, mounts: &[String], name: &str, tag: &str) -> DomainResult<Vec<String>>;

    /// Image path to container path for every mount of the model.
    fn image_internal_path_mounts(&self, model: &InstantModel) -> BTreeMap<String, String>;

    fn mount_dirs(&self, model: &InstantModel) -> Vec<MountDirInfo> {
        self.image_internal_path_mounts(model)
            .into_iter()
            .map(|(image_path, container_target_dir)| MountDirInfo {
                image_id: model.image_id.clone(),
                image_path,
                container_target_dir,
            })
            .collect()
    }

    /// Models the running server reports, keyed by model id. An empty
    /// `ids` slice means all of them.
    async fn probed_instant_models(
        &self,
        llm_url: &str,
        ids: &[String],
    ) -> DomainResult<HashMap<String, InternalInstantModelInfo>>;

    async fn pre_install_model(&self, llm_url: &str, model: &LlmInstantModel) -> DomainResult<()>;

    async fn install_model(&self, llm_url: &str, dirs: &[String], model_ids: &[String]) -> DomainResult<()>;

    async fn uninstall_model(&self, llm_url: &str, model: &LlmInstantModel) -> DomainResult<()>;

    async fn pull_model(&self, llm_url: &str, model_name: &str) -> DomainResult<()>;

    /// Fetch `name:tag` from the upstream registry into `dir`, laid out the
    /// way the model server stores its models.
    async fn download_model(&self, dir: &Path, name: &str, tag: &str) -> DomainResult<DownloadedModel>;
}

#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<LlmContainerType, Arc<dyn LlmContainerDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in Ollama and Dify drivers.
    pub fn with_defaults(client: Arc<dyn LlmClientDriver>, models: Arc<dyn ModelRegistry>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OllamaDriver::new(client, models)));
        registry.register(Arc::new(DifyDriver::new()));
        registry
    }

    pub fn register(&mut self, driver: Arc<dyn LlmContainerDriver>) {
        self.drivers.insert(driver.container_type(), driver);
    }

    pub fn get(&self, container_type: LlmContainerType) -> Option<Arc<dyn LlmContainerDriver>> {
        self.drivers.get(&container_type).cloned()
    }

    pub fn get_or_err(&self, container_type: LlmContainerType) -> DomainResult<Arc<dyn LlmContainerDriver>> {
        self.get(container_type).ok_or_else(|| {
            DomainError::Unsupported(format!("no driver for llm type {}", container_type.as_str()))
        })
    }

    pub fn types(&self) -> Vec<LlmContainerType> {
        let mut types: Vec<_> = self.drivers.keys().copied().collect();
        types.sort_by_key(LlmContainerType::as_str);
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::compute::ServerPortMapping;
    use crate::domain::models::ResourceBase;

    fn access(listen: i32, access: i32) -> AccessInfo {
        AccessInfo {
            base: ResourceBase::new("a", "ready"),
            llm_id: "llm".into(),
            protocol: "tcp".into(),
            listen_port: listen,
            access_port: access,
            remote_ips: vec![],
        }
    }

    #[test]
    fn test_access_url_prefers_access_info() {
        let server = ServerDetails {
            id: "s1".into(),
            host_access_ip: "10.0.0.2".into(),
            ips: "192.168.0.9".into(),
            ..Default::default()
        };
        assert_eq!(
            access_url(&server, &[access(11434, 20001)], 11434).unwrap(),
            "http://10.0.0.2:20001"
        );
        assert_eq!(access_url(&server, &[], 11434).unwrap(), "http://192.168.0.9:11434");
    }

    #[test]
    fn test_access_url_uses_eip_and_server_port_mappings() {
        let mut server = ServerDetails {
            id: "s1".into(),
            host_access_ip: "10.0.0.2".into(),
            host_eip: "1.2.3.4".into(),
            ..Default::default()
        };
        assert_eq!(
            access_url(&server, &[access(80, 20080)], 80).unwrap(),
            "http://1.2.3.4:20080"
        );
        server.port_mappings.push(ServerPortMapping {
            protocol: "tcp".into(),
            port: 80,
            host_port: 20081,
        });
        assert_eq!(access_url(&server, &[], 80).unwrap(), "http://10.0.0.2:20081");
    }

    #[test]
    fn test_access_url_without_address() {
        let server = ServerDetails {
            id: "s1".into(),
            ..Default::default()
        };
        assert!(access_url(&server, &[], 11434).unwrap_err().is_invalid_status());
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = DriverRegistry::new();
        assert!(registry.get(LlmContainerType::Dify).is_none());
        assert!(matches!(
            registry.get_or_err(LlmContainerType::Dify),
            Err(DomainError::Unsupported(_))
        ));
        registry.register(Arc::new(DifyDriver::new()));
        assert_eq!(
            registry.get_or_err(LlmContainerType::Dify).unwrap().container_type(),
            LlmContainerType::Dify
        );
        assert_eq!(registry.types(), vec![LlmContainerType::Dify]);
    }
}
