//! Model tasks: pulling a model by name and syncing instant models.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::{current_stage, fail_llm, mark_llm_failed, next, with_timeout, TaskStage};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{LlmStatus, LlmSyncModelTaskInput, TaskRecord, INIT_STAGE};
use crate::services::context::AppContext;
use crate::services::instant_model_sync::{
    ensure_models_installed, install_models, mark_models_mounted, refresh_instant_models,
    request_mount, request_unmount, try_container_post_overlay,
};
use crate::services::llm_runtime::{llm_driver, llm_url, set_llm_status};
use crate::services::task_manager::{StageOutcome, TaskContext, TaskHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStage {
    Init,
    Pull,
}

impl TaskStage for PullStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => INIT_STAGE,
            Self::Pull => "on_pull",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            INIT_STAGE => Some(Self::Init),
            "on_pull" => Some(Self::Pull),
            _ => None,
        }
    }
}

/// Pulls the model named in the `model` param through the LLM's driver.
pub struct LlmPullModelTask;

#[async_trait]
impl TaskHandler for LlmPullModelTask {
    fn name(&self) -> &'static str {
        "LlmPullModelTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let llm_id = task.obj_id.as_str();
        match current_stage::<PullStage>(task)? {
            PullStage::Init => {
                set_llm_status(app, llm_id, LlmStatus::PullingModel).await?;
                next(PullStage::Pull)
            }
            PullStage::Pull => {
                let model: String = task
                    .param("model")
                    .ok_or_else(|| DomainError::Validation("pull task without model".into()))?;
                let llm = app.repos.llms.fetch(llm_id).await?;
                let pulled = async {
                    let driver = llm_driver(app, &llm)?;
                    let url = llm_url(app, &llm).await?;
                    with_timeout(
                        app.config.model_pull_timeout_secs,
                        &format!("pull {model}"),
                        driver.pull_model(&url, &model),
                    )
                    .await
                }
                .await;
                if let Err(err) = pulled {
                    return fail_llm(app, llm_id, LlmStatus::PullModelFailed, &err).await;
                }
                let llm = set_llm_status(app, llm_id, LlmStatus::Running).await?;
                if let Err(err) = refresh_instant_models(app, &llm, true).await {
                    warn!(llm_id, error = %err, "refresh instant models after pull");
                }
                info!(llm_id, model = %model, "model pulled");
                Ok(StageOutcome::Complete(Some(json!({ "model": model }))))
            }
        }
    }

    async fn on_failure(&self, ctx: &TaskContext, task: &TaskRecord, _reason: &str) -> DomainResult<()> {
        mark_llm_failed(&ctx.app, &task.obj_id, LlmStatus::PullModelFailed).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Init,
    Unmount,
    Mount,
}

impl TaskStage for SyncStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => INIT_STAGE,
            Self::Unmount => "on_unmount",
            Self::Mount => "on_mount",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            INIT_STAGE => Some(Self::Init),
            "on_unmount" => Some(Self::Unmount),
            "on_mount" => Some(Self::Mount),
            _ => None,
        }
    }
}

/// Installs, uninstalls or reinstalls instant models on one LLM. Params are
/// a serialized [`LlmSyncModelTaskInput`].
pub struct LlmInstantModelsSyncTask;

impl LlmInstantModelsSyncTask {
    fn input(task: &TaskRecord) -> DomainResult<LlmSyncModelTaskInput> {
        Ok(serde_json::from_value(task.params.clone())?)
    }

    async fn unmount(app: &AppContext, llm_id: &str, input: &LlmSyncModelTaskInput) -> DomainResult<()> {
        let llm = app.repos.llms.fetch(llm_id).await?;
        let (model_ids, overlays) = request_unmount(app, &llm, input).await?;
        if !overlays.is_empty() {
            try_container_post_overlay(app, &llm, overlays, false).await?;
        }
        if !model_ids.is_empty() {
            mark_models_mounted(app, &llm, &input.llm_status, &model_ids, false).await?;
            info!(llm_id, models = ?model_ids, "models unmounted");
        }
        Ok(())
    }

    async fn mount(app: &AppContext, llm_id: &str, input: &LlmSyncModelTaskInput) -> DomainResult<()> {
        let llm = app.repos.llms.fetch(llm_id).await?;
        let (model_ids, dirs, overlays) = request_mount(app, &llm, input).await?;
        if !overlays.is_empty() {
            try_container_post_overlay(app, &llm, overlays, true).await?;
        }
        if model_ids.is_empty() {
            return Ok(());
        }
        if input.llm_status == LlmStatus::Running.as_str() {
            install_models(app, &llm, &dirs, &model_ids).await?;
            ensure_models_installed(app, &llm, &model_ids).await?;
        }
        mark_models_mounted(app, &llm, &input.llm_status, &model_ids, true).await?;
        info!(llm_id, models = ?model_ids, "models mounted");
        Ok(())
    }

    async fn restore_status(app: &AppContext, llm_id: &str, input: &LlmSyncModelTaskInput) -> DomainResult<()> {
        let status = LlmStatus::from_str(&input.llm_status).unwrap_or(LlmStatus::Ready);
        set_llm_status(app, llm_id, status).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for LlmInstantModelsSyncTask {
    fn name(&self) -> &'static str {
        "LlmInstantModelsSyncTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        let llm_id = task.obj_id.as_str();
        let input = Self::input(task)?;
        match current_stage::<SyncStage>(task)? {
            SyncStage::Init => {
                set_llm_status(app, llm_id, LlmStatus::SyncingModels).await?;
                next(SyncStage::Unmount)
            }
            SyncStage::Unmount => {
                Self::unmount(app, llm_id, &input).await?;
                next(SyncStage::Mount)
            }
            SyncStage::Mount => {
                Self::mount(app, llm_id, &input).await?;
                Self::restore_status(app, llm_id, &input).await?;
                app.pending_quota.remove(&task.id);
                Ok(StageOutcome::Complete(Some(json!({
                    "method": input.method.as_str(),
                    "models": input.models.len(),
                }))))
            }
        }
    }

    async fn on_failure(&self, ctx: &TaskContext, task: &TaskRecord, _reason: &str) -> DomainResult<()> {
        ctx.app.pending_quota.remove(&task.id);
        let input = Self::input(task)?;
        if ctx.app.repos.llms.get(&task.obj_id).await?.is_some() {
            Self::restore_status(&ctx.app, &task.obj_id, &input).await?;
        }
        Ok(())
    }
}
