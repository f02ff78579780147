//! Power and teardown tasks of an LLM.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{current_stage, mark_llm_failed, next, TaskStage};
use crate::domain::errors::DomainResult;
use crate::domain::models::compute::server_status;
use crate::domain::models::{LlmStatus, TaskRecord, INIT_STAGE};
use crate::domain::ports::ResourceFilter;
use crate::services::instant_model_sync::{fetch_models, refresh_instant_models};
use crate::services::llm_runtime::{cleanup_pod_resources, set_llm_status};
use crate::services::task_manager::{StageOutcome, TaskContext, TaskHandler};
use crate::services::wait::{wait_server_deleted, wait_server_status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStage {
    Init,
    WaitDeleted,
    Cleanup,
}

impl TaskStage for DeleteStage {
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

pub struct LlmDeleteTask;

#[async_trait]
impl TaskHandler for LlmDeleteTask {
    fn name(&self) -> &'static str {
        "LlmDeleteTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let llm_id = task.obj_id.as_str();
        match current_stage::<DeleteStage>(task)? {
            DeleteStage::Init => {
                let llm = set_llm_status(app, llm_id, LlmStatus::Deleting).await?;
                if llm.svr_id.is_empty() {
                    return next(DeleteStage::Cleanup);
                }
                match app.compute.delete_server(&llm.svr_id).await {
                    Err(err) if err.is_not_found() => next(DeleteStage::Cleanup),
                    Err(err) => Err(err.context(format!("delete server {}", llm.svr_id))),
                    Ok(()) => next(DeleteStage::WaitDeleted),
                }
            }
            DeleteStage::WaitDeleted => {
                let llm = app.repos.llms.fetch(llm_id).await?;
                wait_server_deleted(app.compute.as_ref(), &llm.svr_id, app.server_poll()).await?;
                next(DeleteStage::Cleanup)
            }
            DeleteStage::Cleanup => {
                cleanup_pod_resources(app, llm_id).await?;
                for model in fetch_models(app, llm_id, None, None, None).await? {
                    app.repos.llm_instant_models.delete(&model.base.id).await?;
                }
                app.repos.llms.delete(llm_id).await?;
                info!(llm_id, "llm deleted");
                Ok(StageOutcome::Complete(None))
            }
        }
    }

    async fn on_failure(&self, ctx: &TaskContext, task: &TaskRecord, _reason: &str) -> DomainResult<()> {
        mark_llm_failed(&ctx.app, &task.obj_id, LlmStatus::DeleteFailed).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStage {
    Init,
    WaitRunning,
    Started,
}

impl TaskStage for StartStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => INIT_STAGE,
            Self::WaitRunning => "on_wait_running",
            Self::Started => "on_started",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            INIT_STAGE => Some(Self::Init),
            "on_wait_running" => Some(Self::WaitRunning),
            "on_started" => Some(Self::Started),
            _ => None,
        }
    }
}

pub struct LlmStartTask;

#[async_trait]
impl TaskHandler for LlmStartTask {
    fn name(&self) -> &'static str {
        "LlmStartTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let llm_id = task.obj_id.as_str();
        match current_stage::<StartStage>(task)? {
            StartStage::Init => {
                let llm = set_llm_status(app, llm_id, LlmStatus::Starting).await?;
                app.compute.start_server(&llm.svr_id).await?;
                next(StartStage::WaitRunning)
            }
            StartStage::WaitRunning => {
                let llm = app.repos.llms.fetch(llm_id).await?;
                wait_server_status(
                    app.compute.as_ref(),
                    &llm.svr_id,
                    &[server_status::RUNNING],
                    app.server_poll(),
                )
                .await?;
                next(StartStage::Started)
            }
            StartStage::Started => {
                let llm = set_llm_status(app, llm_id, LlmStatus::Running).await?;
                if let Err(err) = refresh_instant_models(app, &llm, true).await {
                    warn!(llm_id, error = %err, "refresh instant models after start");
                }
                Ok(StageOutcome::Complete(None))
            }
        }
    }

    async fn on_failure(&self, ctx: &TaskContext, task: &TaskRecord, _reason: &str) -> DomainResult<()> {
        mark_llm_failed(&ctx.app, &task.obj_id, LlmStatus::StartFailed).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStage {
    Init,
    WaitReady,
    Stopped,
}

impl TaskStage for StopStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => INIT_STAGE,
            Self::WaitReady => "on_wait_ready",
            Self::Stopped => "on_stopped",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            INIT_STAGE => Some(Self::Init),
            "on_wait_ready" => Some(Self::WaitReady),
            "on_stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

pub struct LlmStopTask;

#[async_trait]
impl TaskHandler for LlmStopTask {
    fn name(&self) -> &'static str {
        "LlmStopTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let llm_id = task.obj_id.as_str();
        match current_stage::<StopStage>(task)? {
            StopStage::Init => {
                let llm = set_llm_status(app, llm_id, LlmStatus::Stopping).await?;
                app.compute.stop_server(&llm.svr_id).await?;
                next(StopStage::WaitReady)
            }
            StopStage::WaitReady => {
                let llm = app.repos.llms.fetch(llm_id).await?;
                wait_server_status(
                    app.compute.as_ref(),
                    &llm.svr_id,
                    &[server_status::READY],
                    app.server_poll(),
                )
                .await?;
                next(StopStage::Stopped)
            }
            StopStage::Stopped => {
                set_llm_status(app, llm_id, LlmStatus::Ready).await?;
                Ok(StageOutcome::Complete(None))
            }
        }
    }

    async fn on_failure(&self, ctx: &TaskContext, task: &TaskRecord, _reason: &str) -> DomainResult<()> {
        mark_llm_failed(&ctx.app, &task.obj_id, LlmStatus::StopFailed).await
    }
}

/// Derives the LLM status from its server.
pub struct LlmSyncStatusTask;

#[async_trait]
impl TaskHandler for LlmSyncStatusTask {
    fn name(&self) -> &'static str {
        "LlmSyncStatusTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let llm_id = task.obj_id.as_str();
        let llm = app.repos.llms.fetch(llm_id).await?;
        let server = if llm.svr_id.is_empty() {
            None
        } else {
            app.compute.get_server(&llm.svr_id).await?
        };
        let status = match &server {
            None => LlmStatus::NoServer,
            Some(srv) => LlmStatus::from_str(&srv.status).unwrap_or(LlmStatus::Unknown),
        };
        let llm = set_llm_status(app, llm_id, status).await?;
        if status == LlmStatus::Running {
            if let Err(err) = refresh_instant_models(app, &llm, true).await {
                warn!(llm_id, error = %err, "refresh instant models on syncstatus");
            }
        }
        let containers = app
            .repos
            .llm_containers
            .list(&ResourceFilter::new().eq("llm_id", llm_id))
            .await?;
        if let Some(srv) = &server {
            for mut record in containers {
                if let Some(ctr) = srv.containers.iter().find(|c| c.id == record.cmp_id) {
                    if record.base.status != ctr.status {
                        record.base.status = ctr.status.clone();
                        record.base.touch();
                        app.repos.llm_containers.update(&record).await?;
                    }
                }
            }
        }
        info!(llm_id, status = status.as_str(), "llm status synced");
        Ok(StageOutcome::Complete(Some(serde_json::json!({ "status": status.as_str() }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::domain::models::{Llm, LlmContainerType, ResourceBase, TaskStatus};
    use crate::services::task_manager::TaskManager;
    use crate::services::tasks::{all_handlers, OBJ_LLM};
    use crate::test_support::{seed_llm_image, seed_llm_sku, test_env, TestEnv};

    /// Provision an LLM through the create task.
    async fn created_llm(env: &TestEnv, manager: &TaskManager) -> Llm {
        let image = seed_llm_image(&env.app).await;
        let sku = seed_llm_sku(&env.app, &image).await;
        let llm = Llm {
            base: ResourceBase::new("qwen", LlmStatus::Creating.as_str()),
            llm_sku_id: sku.base.id.clone(),
            llm_image_id: image.base.id.clone(),
            llm_type: LlmContainerType::Ollama,
            svr_id: String::new(),
            network_type: String::new(),
            network_id: String::new(),
            bandwidth_mb: 0,
            instant_model_quota_gb: 0,
            prefer_host: String::new(),
            last_instant_model_probe: None,
        };
        env.app.repos.llms.insert(&llm).await.unwrap();
        let status = run(manager, "LlmCreateTask", &llm).await;
        assert_eq!(status, TaskStatus::Complete);
        env.app.repos.llms.fetch(&llm.base.id).await.unwrap()
    }

    async fn run(manager: &TaskManager, name: &str, llm: &Llm) -> TaskStatus {
        let task = manager
            .start_task(name, OBJ_LLM, &llm.base.id, &llm.base.name, json!({}), None)
            .await
            .unwrap();
        manager.wait_task(&task.id, Duration::from_secs(5)).await.unwrap().status
    }

    #[tokio::test]
    async fn test_stop_then_start() {
        let env = test_env().await;
        let manager = TaskManager::new(env.app.clone(), all_handlers());
        let llm = created_llm(&env, &manager).await;

        assert_eq!(run(&manager, "LlmStopTask", &llm).await, TaskStatus::Complete);
        assert_eq!(env.app.repos.llms.fetch(&llm.base.id).await.unwrap().base.status, "ready");

        assert_eq!(run(&manager, "LlmStartTask", &llm).await, TaskStatus::Complete);
        let llm = env.app.repos.llms.fetch(&llm.base.id).await.unwrap();
        assert_eq!(llm.base.status, "running");
        assert!(llm.last_instant_model_probe.is_some());
    }

    #[tokio::test]
    async fn test_start_failure_sets_start_failed() {
        let env = test_env().await;
        let manager = TaskManager::new(env.app.clone(), all_handlers());
        let llm = created_llm(&env, &manager).await;
        env.compute.state().servers.clear();

        assert_eq!(run(&manager, "LlmStartTask", &llm).await, TaskStatus::Failed);
        assert_eq!(env.app.repos.llms.fetch(&llm.base.id).await.unwrap().base.status, "start_failed");
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let env = test_env().await;
        let manager = TaskManager::new(env.app.clone(), all_handlers());
        let llm = created_llm(&env, &manager).await;

        assert_eq!(run(&manager, "LlmDeleteTask", &llm).await, TaskStatus::Complete);
        assert!(env.app.repos.llms.get(&llm.base.id).await.unwrap().is_none());
        let filter = ResourceFilter::new().eq("llm_id", llm.base.id.as_str());
        assert_eq!(env.app.repos.volumes.count(&filter).await.unwrap(), 0);
        assert_eq!(env.app.repos.llm_containers.count(&filter).await.unwrap(), 0);
        assert!(env.compute.state().servers.is_empty());
    }

    #[tokio::test]
    async fn test_syncstatus_without_server() {
        let env = test_env().await;
        let manager = TaskManager::new(env.app.clone(), all_handlers());
        let llm = created_llm(&env, &manager).await;
        env.compute.state().servers.clear();

        assert_eq!(run(&manager, "LlmSyncStatusTask", &llm).await, TaskStatus::Complete);
        assert_eq!(env.app.repos.llms.fetch(&llm.base.id).await.unwrap().base.status, "no_server");
    }
}
