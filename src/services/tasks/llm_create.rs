//! LLM provisioning: pod creation, resource mirroring and the initial
//! model pull.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::{current_stage, fail_llm, mark_llm_failed, next, with_timeout, TaskStage, OBJ_LLM};
use crate::domain::errors::DomainResult;
use crate::domain::models::compute::{container_status, server_status};
use crate::domain::models::{LlmContainerType, LlmStatus, TaskRecord, INIT_STAGE};
use crate::drivers::PodRequest;
use crate::services::llm_runtime::{
    llm_driver, llm_url, owner_server, set_llm_status, sync_pod_resources, PodOwner,
};
use crate::services::task_manager::{child_failures, StageOutcome, TaskContext, TaskHandler};
use crate::services::wait::{wait_container_status, wait_server_status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchCreateStage {
    Init,
    ChildrenComplete,
}

impl TaskStage for BatchCreateStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => INIT_STAGE,
            Self::ChildrenComplete => "on_children_complete",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            INIT_STAGE => Some(Self::Init),
            "on_children_complete" => Some(Self::ChildrenComplete),
            _ => None,
        }
    }
}

/// Fans out one [`LlmCreateTask`] per LLM id in the `llm_ids` param.
pub struct LlmBatchCreateTask;

#[async_trait]
impl TaskHandler for LlmBatchCreateTask {
    fn name(&self) -> &'static str {
        "LlmBatchCreateTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        match current_stage::<BatchCreateStage>(task)? {
            BatchCreateStage::Init => {
                let ids: Vec<String> = task.param("llm_ids").unwrap_or_default();
                for id in &ids {
                    let llm = ctx.app.repos.llms.fetch(id).await?;
                    ctx.manager
                        .start_task(
                            LlmCreateTask.name(),
                            OBJ_LLM,
                            id,
                            &llm.base.name,
                            json!({}),
                            Some(task.id.as_str()),
                        )
                        .await?;
                }
                Ok(StageOutcome::wait_children(BatchCreateStage::ChildrenComplete.as_str()))
            }
            BatchCreateStage::ChildrenComplete => {
                let failures = child_failures(task);
                if !failures.is_empty() {
                    warn!(task_id = %task.id, failed = failures.len(), "some llms failed to create");
                }
                Ok(StageOutcome::Complete(Some(json!({ "failed": failures.len() }))))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    Init,
    WaitServer,
    SyncResources,
    PullModel,
}

impl TaskStage for CreateStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => INIT_STAGE,
            Self::WaitServer => "on_wait_server",
            Self::SyncResources => "on_sync_resources",
            Self::PullModel => "on_pull_model",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            INIT_STAGE => Some(Self::Init),
            "on_wait_server" => Some(Self::WaitServer),
            "on_sync_resources" => Some(Self::SyncResources),
            "on_pull_model" => Some(Self::PullModel),
            _ => None,
        }
    }
}

pub struct LlmCreateTask;

impl LlmCreateTask {
    async fn create_pod(ctx: &TaskContext, llm_id: &str) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let mut llm = set_llm_status(app, llm_id, LlmStatus::CreatingPod).await?;
        if !llm.svr_id.is_empty() {
            // Resumed after the pod was requested.
            return next(CreateStage::WaitServer);
        }
        let sku = app.repos.llm_skus.fetch(&llm.llm_sku_id).await?;
        let image = app.repos.llm_images.fetch(&llm.llm_image_id).await?;
        let driver = llm_driver(app, &llm)?;
        let input = driver.pod_create_input(&PodRequest::for_llm(&llm, &sku, image))?;

        let svr_id = match app.compute.create_server(&input).await {
            Ok(id) => id,
            Err(err) => return fail_llm(app, llm_id, LlmStatus::CreatePodFailed, &err).await,
        };
        info!(llm_id, svr_id = %svr_id, "pod requested");
        llm = app.repos.llms.fetch(llm_id).await?;
        llm.svr_id = svr_id;
        app.repos.llms.update(&llm).await?;
        next(CreateStage::WaitServer)
    }

    async fn wait_server(ctx: &TaskContext, llm_id: &str) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let llm = app.repos.llms.fetch(llm_id).await?;
        let targets = [server_status::RUNNING, server_status::READY];
        let settled = async {
            let server =
                wait_server_status(app.compute.as_ref(), &llm.svr_id, &targets, app.server_poll()).await?;
            for ctr in &server.containers {
                wait_container_status(
                    app.compute.as_ref(),
                    &ctr.id,
                    container_status::FINAL,
                    app.server_poll(),
                )
                .await?;
            }
            DomainResult::Ok(())
        }
        .await;
        match settled {
            Ok(()) => next(CreateStage::SyncResources),
            Err(err) => fail_llm(app, llm_id, LlmStatus::CreatePodFailed, &err).await,
        }
    }

    async fn sync_resources(ctx: &TaskContext, llm_id: &str) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let llm = app.repos.llms.fetch(llm_id).await?;
        let sku = app.repos.llm_skus.fetch(&llm.llm_sku_id).await?;
        let server = owner_server(app, llm_id, &llm.svr_id).await?;
        let owner = PodOwner {
            id: &llm.base.id,
            name: &llm.base.name,
            project_id: &llm.base.project_id,
            container_type: llm.llm_type,
        };
        sync_pod_resources(app, owner, &server, &sku.volumes, &sku.mounted_models).await?;
        next(CreateStage::PullModel)
    }

    async fn pull_model(ctx: &TaskContext, llm_id: &str) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let llm = app.repos.llms.fetch(llm_id).await?;
        let sku = app.repos.llm_skus.fetch(&llm.llm_sku_id).await?;
        let server = owner_server(app, llm_id, &llm.svr_id).await?;

        if llm.llm_type == LlmContainerType::Ollama && !sku.llm_model_name.is_empty() {
            set_llm_status(app, llm_id, LlmStatus::PullingModel).await?;
            let pulled = async {
                let driver = llm_driver(app, &llm)?;
                let url = llm_url(app, &llm).await?;
                with_timeout(
                    app.config.model_pull_timeout_secs,
                    &format!("pull {}", sku.llm_model_name),
                    driver.pull_model(&url, &sku.llm_model_name),
                )
                .await
            }
            .await;
            if let Err(err) = pulled {
                return fail_llm(app, llm_id, LlmStatus::PullModelFailed, &err).await;
            }
            info!(llm_id, model = %sku.llm_model_name, "model pulled");
        }

        let status = if server.status == server_status::READY {
            LlmStatus::Ready
        } else {
            LlmStatus::Running
        };
        set_llm_status(app, llm_id, status).await?;
        Ok(StageOutcome::Complete(Some(json!({ "svr_id": llm.svr_id }))))
    }
}

#[async_trait]
impl TaskHandler for LlmCreateTask {
    fn name(&self) -> &'static str {
        "LlmCreateTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        let llm_id = task.obj_id.clone();
        match current_stage::<CreateStage>(task)? {
            CreateStage::Init => Self::create_pod(ctx, &llm_id).await,
            CreateStage::WaitServer => Self::wait_server(ctx, &llm_id).await,
            CreateStage::SyncResources => Self::sync_resources(ctx, &llm_id).await,
            CreateStage::PullModel => Self::pull_model(ctx, &llm_id).await,
        }
    }

    async fn on_failure(&self, ctx: &TaskContext, task: &TaskRecord, _reason: &str) -> DomainResult<()> {
        mark_llm_failed(&ctx.app, &task.obj_id, LlmStatus::CreateFail).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::models::{Llm, ResourceBase, TaskStatus};
    use crate::domain::ports::ResourceFilter;
    use crate::services::task_manager::TaskManager;
    use crate::services::tasks::all_handlers;
    use crate::test_support::{seed_llm_image, seed_llm_sku, test_env, TestEnv};

    async fn llm_with_sku(env: &TestEnv, model_name: &str) -> Llm {
        let image = seed_llm_image(&env.app).await;
        let mut sku = seed_llm_sku(&env.app, &image).await;
        sku.llm_model_name = model_name.to_string();
        env.app.repos.llm_skus.update(&sku).await.unwrap();

        let llm = Llm {
            base: ResourceBase::new("qwen-1", LlmStatus::Creating.as_str()),
            llm_sku_id: sku.base.id.clone(),
            llm_image_id: image.base.id.clone(),
            llm_type: LlmContainerType::Ollama,
            svr_id: String::new(),
            network_type: "guest".into(),
            network_id: String::new(),
            bandwidth_mb: 0,
            instant_model_quota_gb: 0,
            prefer_host: String::new(),
            last_instant_model_probe: None,
        };
        env.app.repos.llms.insert(&llm).await.unwrap();
        llm
    }

    async fn run(env: &TestEnv, llm: &Llm) -> TaskRecord {
        let manager = TaskManager::new(env.app.clone(), all_handlers());
        let task = manager
            .start_task("LlmCreateTask", OBJ_LLM, &llm.base.id, &llm.base.name, json!({}), None)
            .await
            .unwrap();
        manager.wait_task(&task.id, Duration::from_secs(5)).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_runs_to_running() {
        let env = test_env().await;
        let llm = llm_with_sku(&env, "qwen2:0.5b").await;

        let task = run(&env, &llm).await;
        assert_eq!(task.status, TaskStatus::Complete, "{:?}", task.reason);

        let llm = env.app.repos.llms.fetch(&llm.base.id).await.unwrap();
        assert_eq!(llm.base.status, "running");
        assert_eq!(llm.svr_id, "srv-1");

        let filter = ResourceFilter::new().eq("llm_id", llm.base.id.as_str());
        assert_eq!(env.app.repos.volumes.count(&filter).await.unwrap(), 1);
        assert_eq!(env.app.repos.access_infos.count(&filter).await.unwrap(), 1);
        assert_eq!(env.app.repos.llm_containers.count(&filter).await.unwrap(), 1);
        assert_eq!(env.models.state().pulled, vec!["qwen2:0.5b".to_string()]);
    }

    #[tokio::test]
    async fn test_pod_failure_sets_create_pod_failed() {
        let env = test_env().await;
        env.compute.state().create_status = Some("create_fail".into());
        let llm = llm_with_sku(&env, "").await;

        let task = run(&env, &llm).await;
        assert_eq!(task.status, TaskStatus::Failed);
        let llm = env.app.repos.llms.fetch(&llm.base.id).await.unwrap();
        assert_eq!(llm.base.status, "create_pod_failed");
    }

    #[tokio::test]
    async fn test_pull_failure_sets_pull_model_failed() {
        let env = test_env().await;
        env.models.state().fail_pull = true;
        let llm = llm_with_sku(&env, "qwen2:0.5b").await;

        let task = run(&env, &llm).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.reason.unwrap().contains("manifest unknown"));
        let llm = env.app.repos.llms.fetch(&llm.base.id).await.unwrap();
        assert_eq!(llm.base.status, "pull_model_failed");
    }

    #[tokio::test]
    async fn test_missing_sku_sets_create_fail() {
        let env = test_env().await;
        let mut llm = llm_with_sku(&env, "").await;
        llm.llm_sku_id = "gone".into();
        env.app.repos.llms.update(&llm).await.unwrap();

        let task = run(&env, &llm).await;
        assert_eq!(task.status, TaskStatus::Failed);
        let llm = env.app.repos.llms.fetch(&llm.base.id).await.unwrap();
        assert_eq!(llm.base.status, "create_fail");
    }

    #[tokio::test]
    async fn test_batch_create_waits_for_children() {
        let env = test_env().await;
        let first = llm_with_sku(&env, "").await;
        let mut second = first.clone();
        second.base = ResourceBase::new("qwen-2", LlmStatus::Creating.as_str());
        env.app.repos.llms.insert(&second).await.unwrap();

        let manager = TaskManager::new(env.app.clone(), all_handlers());
        let task = manager
            .start_task(
                "LlmBatchCreateTask",
                OBJ_LLM,
                "batch",
                "batch",
                json!({ "llm_ids": [first.base.id, second.base.id] }),
                None,
            )
            .await
            .unwrap();
        let done = manager.wait_task(&task.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, TaskStatus::Complete);
        assert_eq!(done.result, Some(json!({ "failed": 0 })));
        assert_eq!(env.compute.state().servers.len(), 2);
    }
}
