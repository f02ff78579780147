//! Task handlers for LLM and Dify provisioning and instant model imports.
//!
//! Every handler keeps its stages in an enum and dispatches on it with a
//! single `match`; the runner persists the stage string between steps.

pub mod dify;
pub mod instant_model_import;
pub mod llm_create;
pub mod llm_lifecycle;
pub mod llm_models;

use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{LlmStatus, TaskRecord};
use crate::services::context::AppContext;
use crate::services::llm_runtime::set_llm_status;
use crate::services::task_manager::{StageOutcome, TaskHandler};

pub use dify::{dify_images, DifyCreateTask, DifyDeleteTask};
pub use instant_model_import::InstantModelImportTask;
pub use llm_create::{LlmBatchCreateTask, LlmCreateTask};
pub use llm_lifecycle::{LlmDeleteTask, LlmStartTask, LlmStopTask, LlmSyncStatusTask};
pub use llm_models::{LlmInstantModelsSyncTask, LlmPullModelTask};

pub const OBJ_LLM: &str = "llm";
pub const OBJ_DIFY: &str = "dify";
pub const OBJ_INSTANT_MODEL: &str = "instant_model";

/// Stage enum of a task.
pub trait TaskStage: Sized + Copy {
    fn as_str(&self) -> &'static str;

    fn parse(s: &str) -> Option<Self>;
}

/// Current stage of a task, failing on a stage the handler does not know.
pub fn current_stage<S: TaskStage>(task: &TaskRecord) -> DomainResult<S> {
    S::parse(&task.stage).ok_or_else(|| {
        DomainError::InvalidStatus(format!("task {} has unknown stage {}", task.task_name, task.stage))
    })
}

pub fn next<S: TaskStage>(stage: S) -> DomainResult<StageOutcome> {
    Ok(StageOutcome::next(stage.as_str()))
}

/// Handlers for every task the service runs.
pub fn all_handlers() -> Vec<Arc<dyn TaskHandler>> {
    vec![
        Arc::new(LlmBatchCreateTask),
        Arc::new(LlmCreateTask),
        Arc::new(LlmDeleteTask),
        Arc::new(LlmStartTask),
        Arc::new(LlmStopTask),
        Arc::new(LlmSyncStatusTask),
        Arc::new(LlmPullModelTask),
        Arc::new(LlmInstantModelsSyncTask),
        Arc::new(DifyCreateTask),
        Arc::new(DifyDeleteTask),
        Arc::new(InstantModelImportTask),
    ]
}

/// Record a failure status on the LLM and fail the task with the error.
pub async fn fail_llm(app: &AppContext, llm_id: &str, status: LlmStatus, err: &DomainError) -> DomainResult<StageOutcome> {
    set_llm_status(app, llm_id, status).await?;
    Ok(StageOutcome::Failed(err.to_string()))
}

/// Set the failure status unless a stage already recorded a more precise one.
/// The record may be gone already, which is not an error here.
pub async fn mark_llm_failed(app: &AppContext, llm_id: &str, status: LlmStatus) -> DomainResult<()> {
    match app.repos.llms.get(llm_id).await? {
        Some(llm) if !llm.llm_status().is_failed() => {
            set_llm_status(app, llm_id, status).await?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Bound a remote operation by a timeout in seconds.
pub async fn with_timeout<T>(
    secs: u64,
    what: &str,
    fut: impl std::future::Future<Output = DomainResult<T>>,
) -> DomainResult<T> {
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .map_err(|_| DomainError::Timeout(format!("{what} did not finish within {secs}s")))?
}
