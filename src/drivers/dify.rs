//! Dify driver: the whole Dify stack in one pod.
//!
//! Components share the pod network and reach each other on localhost;
//! nginx fronts the web and api containers. Dify serves no instant models.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;

use super::{access_url, DownloadedModel, LlmContainerDriver, PodRequest};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{
    ContainerVolumeMount, PodContainerCreateInput, PostOverlay, ServerCreateInput, ServerDetails,
};
use crate::domain::models::{
    AccessInfo, EnvVar, InstantModel, InternalInstantModelInfo, LlmContainerType,
    LlmInstantModel, MountDirInfo,
};

pub const DIFY_NGINX_PORT: i32 = 80;
const DIFY_DATA_DIR: &str = "/data";

/// Component, command, data subdirectory and extra env of each container.
const COMPONENTS: &[(&str, &[&str], &str, &[(&str, &str)])] = &[
    ("postgres", &[], "postgres", &[("PGDATA", "/data/postgres/pgdata"), ("POSTGRES_DB", "dify")]),
    ("redis", &["redis-server", "--dir", "/data/redis"], "redis", &[]),
    ("sandbox", &[], "sandbox", &[("GIN_MODE", "release")]),
    ("ssrf_proxy", &[], "ssrf_proxy", &[]),
    ("plugin_daemon", &[], "plugin_daemon", &[("DB_HOST", "127.0.0.1"), ("REDIS_HOST", "127.0.0.1")]),
    ("api", &[], "api", &[("MODE", "api"), ("DB_HOST", "127.0.0.1"), ("REDIS_HOST", "127.0.0.1")]),
    ("worker", &[], "api", &[("MODE", "worker"), ("DB_HOST", "127.0.0.1"), ("REDIS_HOST", "127.0.0.1")]),
    ("web", &[], "web", &[("CONSOLE_API_URL", ""), ("APP_API_URL", "")]),
    ("nginx", &[], "nginx", &[]),
];

#[derive(Default)]
pub struct DifyDriver;

impl DifyDriver {
    pub fn new() -> Self {
        Self
    }

    fn unsupported(op: &str) -> DomainError {
        DomainError::Unsupported(format!("{op} is not available for dify"))
    }
}

#[async_trait]
impl LlmContainerDriver for DifyDriver {
    fn container_type(&self) -> LlmContainerType {
        LlmContainerType::Dify
    }

    fn pod_create_input(&self, request: &PodRequest<'_>) -> DomainResult<ServerCreateInput> {
        let mut input = request.server_input(&[DIFY_NGINX_PORT])?;
        for (component, command, data_dir, extra_envs) in COMPONENTS {
            let image = request.image(component)?;
            let mut envs = request.envs.to_vec();
            envs.extend(extra_envs.iter().map(|(k, v)| EnvVar {
                key: (*k).to_string(),
                value: (*v).to_string(),
            }));
            input.pod.containers.push(PodContainerCreateInput {
                name: format!("{}-{}", request.name, component.replace('_', "-")),
                image: image.image_ref(),
                image_credential_id: image.credential_id.clone(),
                command: command.iter().map(|s| (*s).to_string()).collect(),
                args: Vec::new(),
                envs,
                volume_mounts: vec![ContainerVolumeMount::disk(
                    0,
                    data_dir,
                    &format!("{DIFY_DATA_DIR}/{data_dir}"),
                )],
                devices: Vec::new(),
                always_restart: true,
            });
        }
        Ok(input)
    }

    fn llm_url(&self, server: &ServerDetails, access_infos: &[AccessInfo]) -> DomainResult<String> {
        access_url(server, access_infos, DIFY_NGINX_PORT)
    }

    fn dir_post_overlay(&self, dir: &MountDirInfo) -> PostOverlay {
        PostOverlay {
            container_target_dir: dir.container_target_dir.clone(),
            ..Default::default()
        }
    }

    fn instant_model_id_by_post_overlay(
        &self,
        _overlay: &PostOverlay,
        _name_to_id: &HashMap<String, String>,
    ) -> Option<String> {
        None
    }

    fn validate_mounts(&self, _mounts: &[String], _name: &str, _tag: &str) -> DomainResult<Vec<String>> {
        Err(Self::unsupported("instant model"))
    }

    fn image_internal_path_mounts(&self, _model: &InstantModel) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    async fn probed_instant_models(
        &self,
        _llm_url: &str,
        _ids: &[String],
    ) -> DomainResult<HashMap<String, InternalInstantModelInfo>> {
        Err(Self::unsupported("model probing"))
    }

    async fn pre_install_model(&self, _llm_url: &str, _model: &LlmInstantModel) -> DomainResult<()> {
        Err(Self::unsupported("model install"))
    }

    async fn install_model(&self, _llm_url: &str, _dirs: &[String], _model_ids: &[String]) -> DomainResult<()> {
        Err(Self::unsupported("model install"))
    }

    async fn uninstall_model(&self, _llm_url: &str, _model: &LlmInstantModel) -> DomainResult<()> {
        Err(Self::unsupported("model uninstall"))
    }

    async fn pull_model(&self, _llm_url: &str, _model_name: &str) -> DomainResult<()> {
        Err(Self::unsupported("model pull"))
    }

    async fn download_model(&self, _dir: &Path, _name: &str, _tag: &str) -> DomainResult<DownloadedModel> {
        Err(Self::unsupported("model import"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{LlmImage, ResourceBase, VolumeSpec};

    fn image(name: &str) -> LlmImage {
        LlmImage {
            base: ResourceBase::new(name, "active"),
            image_name: format!("registry/{name}"),
            image_label: String::new(),
            credential_id: String::new(),
            llm_type: LlmContainerType::Dify,
        }
    }

    #[test]
    fn test_pod_has_every_component() {
        let volumes = vec![VolumeSpec {
            size_mb: 20480,
            ..Default::default()
        }];
        let images: BTreeMap<String, LlmImage> = COMPONENTS
            .iter()
            .map(|(c, ..)| ((*c).to_string(), image(c)))
            .collect();
        let request = PodRequest {
            name: "dify-a",
            project_id: "",
            cpu: 8,
            memory_mb: 16384,
            volumes: &volumes,
            port_mappings: &[],
            devices: &[],
            envs: &[],
            bandwidth_mb: 0,
            network_type: "guest",
            network_id: "net-1",
            prefer_host: "",
            images,
        };
        let input = DifyDriver::new().pod_create_input(&request).unwrap();
        assert_eq!(input.pod.containers.len(), COMPONENTS.len());
        assert!(input.pod.containers.iter().any(|c| c.name == "dify-a-plugin-daemon"));
        assert_eq!(input.pod.port_mappings[0].container_port, DIFY_NGINX_PORT);
    }

    #[test]
    fn test_missing_component_image() {
        let volumes = vec![VolumeSpec {
            size_mb: 1,
            ..Default::default()
        }];
        let request = PodRequest {
            name: "dify-a",
            project_id: "",
            cpu: 1,
            memory_mb: 1,
            volumes: &volumes,
            port_mappings: &[],
            devices: &[],
            envs: &[],
            bandwidth_mb: 0,
            network_type: "",
            network_id: "",
            prefer_host: "",
            images: BTreeMap::new(),
        };
        assert!(matches!(
            DifyDriver::new().pod_create_input(&request),
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_instant_models_unsupported() {
        let drv = DifyDriver::new();
        assert!(matches!(
            drv.probed_instant_models("http://x", &[]).await,
            Err(DomainError::Unsupported(_))
        ));
        assert!(drv.validate_mounts(&[], "a", "b").is_err());
    }
}
