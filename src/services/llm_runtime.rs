//! Helpers shared by LLM/Dify services and their tasks: status updates,
//! driver lookup and the records mirrored from a pod.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::ServerDetails;
use crate::domain::models::{
    AccessInfo, Dify, Llm, LlmContainer, LlmContainerType, LlmStatus, Resource, ResourceBase,
    Volume, VolumeSpec,
};
use crate::domain::ports::ResourceFilter;
use crate::drivers::LlmContainerDriver;
use crate::services::context::AppContext;

pub async fn set_llm_status(app: &AppContext, llm_id: &str, status: LlmStatus) -> DomainResult<Llm> {
    let mut llm = app.repos.llms.fetch(llm_id).await?;
    if llm.base.status != status.as_str() {
        debug!(llm_id, from = %llm.base.status, to = status.as_str(), "llm status");
        llm.set_status(status.as_str());
        app.repos.llms.update(&llm).await?;
    }
    Ok(llm)
}

pub async fn set_dify_status(app: &AppContext, dify_id: &str, status: LlmStatus) -> DomainResult<Dify> {
    let mut dify = app.repos.difys.fetch(dify_id).await?;
    if dify.base.status != status.as_str() {
        debug!(dify_id, from = %dify.base.status, to = status.as_str(), "dify status");
        dify.set_status(status.as_str());
        app.repos.difys.update(&dify).await?;
    }
    Ok(dify)
}

pub fn llm_driver(app: &AppContext, llm: &Llm) -> DomainResult<Arc<dyn LlmContainerDriver>> {
    app.drivers.get_or_err(llm.llm_type)
}

/// Compute server behind an LLM or Dify record.
pub async fn owner_server(app: &AppContext, owner_id: &str, svr_id: &str) -> DomainResult<ServerDetails> {
    if svr_id.is_empty() {
        return Err(DomainError::InvalidStatus(format!("{owner_id} has no server")));
    }
    app.compute
        .get_server(svr_id)
        .await?
        .ok_or_else(|| DomainError::not_found("server", svr_id))
}

pub async fn owner_containers(app: &AppContext, owner_id: &str) -> DomainResult<Vec<LlmContainer>> {
    app.repos
        .llm_containers
        .list(&ResourceFilter::new().eq("llm_id", owner_id))
        .await
}

/// The model-server container of an LLM.
pub async fn llm_container(app: &AppContext, llm: &Llm) -> DomainResult<LlmContainer> {
    owner_containers(app, &llm.base.id)
        .await?
        .into_iter()
        .find(|c| c.container_type == llm.llm_type)
        .ok_or_else(|| DomainError::not_found("llm_container", &llm.base.id))
}

pub async fn access_infos(app: &AppContext, owner_id: &str) -> DomainResult<Vec<AccessInfo>> {
    app.repos
        .access_infos
        .list(&ResourceFilter::new().eq("llm_id", owner_id))
        .await
}

pub async fn llm_url(app: &AppContext, llm: &Llm) -> DomainResult<String> {
    let driver = llm_driver(app, llm)?;
    let server = owner_server(app, &llm.base.id, &llm.svr_id).await?;
    let infos = access_infos(app, &llm.base.id).await?;
    driver.llm_url(&server, &infos)
}

pub async fn dify_url(app: &AppContext, dify: &Dify) -> DomainResult<String> {
    let driver = app.drivers.get_or_err(LlmContainerType::Dify)?;
    let server = owner_server(app, &dify.base.id, &dify.svr_id).await?;
    let infos = access_infos(app, &dify.base.id).await?;
    driver.llm_url(&server, &infos)
}

/// First data volume of an owner.
pub async fn owner_volume(app: &AppContext, owner_id: &str) -> DomainResult<Volume> {
    app.repos
        .volumes
        .list(&ResourceFilter::new().eq("llm_id", owner_id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::not_found("volume", owner_id))
}

/// The LLM or Dify record a pod belongs to.
#[derive(Debug, Clone, Copy)]
pub struct PodOwner<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub project_id: &'a str,
    pub container_type: LlmContainerType,
}

/// Mirror the disks, port mappings and containers of a freshly created pod.
pub async fn sync_pod_resources(
    app: &AppContext,
    owner: PodOwner<'_>,
    server: &ServerDetails,
    volumes: &[VolumeSpec],
    mounted_models: &[String],
) -> DomainResult<()> {
    let PodOwner {
        id: owner_id,
        name: owner_name,
        project_id,
        container_type,
    } = owner;
    cleanup_pod_resources(app, owner_id).await?;

    for (idx, spec) in volumes.iter().enumerate() {
        let disk = server.disks_info.iter().find(|d| usize::try_from(d.index).ok() == Some(idx));
        let mut base = ResourceBase::new(format!("{owner_name}-volume-{idx}"), "ready");
        base.project_id = project_id.to_string();
        let volume = Volume {
            base,
            llm_id: owner_id.to_string(),
            disk_id: disk.map(|d| d.id.clone()).unwrap_or_default(),
            size_mb: spec.size_mb,
            storage_type: spec.storage_type.clone(),
            template_id: spec.template_id.clone(),
            mounted_models: if idx == 0 { mounted_models.to_vec() } else { Vec::new() },
        };
        app.repos.volumes.insert(&volume).await?;
    }

    for mapping in &server.port_mappings {
        let mut base = ResourceBase::new(format!("{owner_name}-{}", mapping.port), "ready");
        base.project_id = project_id.to_string();
        let info = AccessInfo {
            base,
            llm_id: owner_id.to_string(),
            protocol: mapping.protocol.clone(),
            listen_port: mapping.port,
            access_port: mapping.host_port,
            remote_ips: Vec::new(),
        };
        app.repos.access_infos.insert(&info).await?;
    }

    for ctr in &server.containers {
        let mut base = ResourceBase::new(ctr.name.clone(), ctr.status.clone());
        base.project_id = project_id.to_string();
        let record = LlmContainer {
            base,
            llm_id: owner_id.to_string(),
            cmp_id: ctr.id.clone(),
            container_type,
        };
        app.repos.llm_containers.insert(&record).await?;
    }
    info!(
        owner_id,
        volumes = volumes.len(),
        ports = server.port_mappings.len(),
        containers = server.containers.len(),
        "pod resources synced"
    );
    Ok(())
}

pub async fn cleanup_pod_resources(app: &AppContext, owner_id: &str) -> DomainResult<()> {
    let filter = ResourceFilter::new().eq("llm_id", owner_id);
    for ctr in app.repos.llm_containers.list(&filter).await? {
        app.repos.llm_containers.delete(ctr.id()).await?;
    }
    for volume in app.repos.volumes.list(&filter).await? {
        app.repos.volumes.delete(volume.id()).await?;
    }
    for info in app.repos.access_infos.list(&filter).await? {
        app.repos.access_infos.delete(info.id()).await?;
    }
    Ok(())
}

/// Status reported by the pod: the first container's status, or a marker
/// when the server or its containers are gone.
pub fn pod_status(server: Option<&ServerDetails>) -> String {
    match server {
        None => LlmStatus::NoServer.as_str().to_string(),
        Some(srv) => srv
            .containers
            .first()
            .map_or_else(|| LlmStatus::NoContainer.as_str().to_string(), |c| c.status.clone()),
    }
}
