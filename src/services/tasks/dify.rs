//! Dify stack provisioning and teardown.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{current_stage, next, TaskStage};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::server_status;
use crate::domain::models::{DifySku, LlmContainerType, LlmImage, LlmStatus, TaskRecord, INIT_STAGE};
use crate::drivers::PodRequest;
use crate::services::context::AppContext;
use crate::services::llm_runtime::{
    cleanup_pod_resources, owner_server, set_dify_status, sync_pod_resources, PodOwner,
};
use crate::services::task_manager::{StageOutcome, TaskContext, TaskHandler};
use crate::services::wait::{wait_server_deleted, wait_server_status};

/// Component images of a Dify sku, keyed by component name.
pub async fn dify_images(app: &AppContext, sku: &DifySku) -> DomainResult<BTreeMap<String, LlmImage>> {
    let mut images = BTreeMap::new();
    for (component, image_id) in sku.images.components() {
        if image_id.is_empty() {
            return Err(DomainError::Validation(format!("dify sku {} has no {component} image", sku.base.name)));
        }
        let image = app
            .repos
            .llm_images
            .fetch_by_id_or_name(image_id)
            .await
            .map_err(|e| e.context(format!("{component} image")))?;
        images.insert(component.to_string(), image);
    }
    Ok(images)
}

async fn fail_dify(app: &AppContext, dify_id: &str, status: LlmStatus, err: &DomainError) -> DomainResult<StageOutcome> {
    set_dify_status(app, dify_id, status).await?;
    Ok(StageOutcome::Failed(err.to_string()))
}

async fn mark_dify_failed(app: &AppContext, dify_id: &str, status: LlmStatus) -> DomainResult<()> {
    if let Some(dify) = app.repos.difys.get(dify_id).await? {
        let current = LlmStatus::from_str(&dify.base.status).unwrap_or(LlmStatus::Unknown);
        if !current.is_failed() {
            set_dify_status(app, dify_id, status).await?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifyCreateStage {
    Init,
    WaitServer,
    SyncResources,
}

impl TaskStage for DifyCreateStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => INIT_STAGE,
            Self::WaitServer => "on_wait_server",
            Self::SyncResources => "on_sync_resources",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            INIT_STAGE => Some(Self::Init),
            "on_wait_server" => Some(Self::WaitServer),
            "on_sync_resources" => Some(Self::SyncResources),
            _ => None,
        }
    }
}

pub struct DifyCreateTask;

#[async_trait]
impl TaskHandler for DifyCreateTask {
    fn name(&self) -> &'static str {
        "DifyCreateTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let dify_id = task.obj_id.as_str();
        match current_stage::<DifyCreateStage>(task)? {
            DifyCreateStage::Init => {
                let mut dify = set_dify_status(app, dify_id, LlmStatus::CreatingPod).await?;
                if !dify.svr_id.is_empty() {
                    return next(DifyCreateStage::WaitServer);
                }
                let sku = app.repos.dify_skus.fetch(&dify.dify_sku_id).await?;
                let images = dify_images(app, &sku).await?;
                let driver = app.drivers.get_or_err(LlmContainerType::Dify)?;
                let input = driver.pod_create_input(&PodRequest::for_dify(&dify, &sku, images))?;
                let svr_id = match app.compute.create_server(&input).await {
                    Ok(id) => id,
                    Err(err) => return fail_dify(app, dify_id, LlmStatus::CreatePodFailed, &err).await,
                };
                info!(dify_id, svr_id = %svr_id, "dify pod requested");
                dify = app.repos.difys.fetch(dify_id).await?;
                dify.svr_id = svr_id;
                app.repos.difys.update(&dify).await?;
                next(DifyCreateStage::WaitServer)
            }
            DifyCreateStage::WaitServer => {
                let dify = app.repos.difys.fetch(dify_id).await?;
                let targets = [server_status::RUNNING, server_status::READY];
                match wait_server_status(app.compute.as_ref(), &dify.svr_id, &targets, app.server_poll()).await {
                    Ok(_) => next(DifyCreateStage::SyncResources),
                    Err(err) => fail_dify(app, dify_id, LlmStatus::CreatePodFailed, &err).await,
                }
            }
            DifyCreateStage::SyncResources => {
                let dify = app.repos.difys.fetch(dify_id).await?;
                let sku = app.repos.dify_skus.fetch(&dify.dify_sku_id).await?;
                let server = owner_server(app, dify_id, &dify.svr_id).await?;
                let owner = PodOwner {
                    id: &dify.base.id,
                    name: &dify.base.name,
                    project_id: &dify.base.project_id,
                    container_type: LlmContainerType::Dify,
                };
                sync_pod_resources(app, owner, &server, &sku.volumes, &[]).await?;
                let status = if server.status == server_status::READY {
                    LlmStatus::Ready
                } else {
                    LlmStatus::Running
                };
                set_dify_status(app, dify_id, status).await?;
                Ok(StageOutcome::Complete(Some(json!({ "svr_id": dify.svr_id }))))
            }
        }
    }

    async fn on_failure(&self, ctx: &TaskContext, task: &TaskRecord, _reason: &str) -> DomainResult<()> {
        mark_dify_failed(&ctx.app, &task.obj_id, LlmStatus::CreateFail).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifyDeleteStage {
    Init,
    WaitDeleted,
    Cleanup,
}

impl TaskStage for DifyDeleteStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => INIT_STAGE,
            Self::WaitDeleted => "on_wait_deleted",
            Self::Cleanup => "on_cleanup",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            INIT_STAGE => Some(Self::Init),
            "on_wait_deleted" => Some(Self::WaitDeleted),
            "on_cleanup" => Some(Self::Cleanup),
            _ => None,
        }
    }
}

pub struct DifyDeleteTask;

#[async_trait]
impl TaskHandler for DifyDeleteTask {
    fn name(&self) -> &'static str {
        "DifyDeleteTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let dify_id = task.obj_id.as_str();
        match current_stage::<DifyDeleteStage>(task)? {
            DifyDeleteStage::Init => {
                let dify = set_dify_status(app, dify_id, LlmStatus::Deleting).await?;
                if dify.svr_id.is_empty() {
                    return next(DifyDeleteStage::Cleanup);
                }
                match app.compute.delete_server(&dify.svr_id).await {
                    Err(err) if err.is_not_found() => next(DifyDeleteStage::Cleanup),
                    Err(err) => Err(err.context(format!("delete server {}", dify.svr_id))),
                    Ok(()) => next(DifyDeleteStage::WaitDeleted),
                }
            }
            DifyDeleteStage::WaitDeleted => {
                let dify = app.repos.difys.fetch(dify_id).await?;
                wait_server_deleted(app.compute.as_ref(), &dify.svr_id, app.server_poll()).await?;
                next(DifyDeleteStage::Cleanup)
            }
            DifyDeleteStage::Cleanup => {
                cleanup_pod_resources(app, dify_id).await?;
                app.repos.difys.delete(dify_id).await?;
                info!(dify_id, "dify deleted");
                Ok(StageOutcome::Complete(None))
            }
        }
    }

    async fn on_failure(&self, ctx: &TaskContext, task: &TaskRecord, _reason: &str) -> DomainResult<()> {
        mark_dify_failed(&ctx.app, &task.obj_id, LlmStatus::DeleteFailed).await
    }
}
