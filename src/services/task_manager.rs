//! Task runner.
//!
//! A task is a persisted record plus a [`TaskHandler`] that advances it one
//! stage at a time. The stage is written back after every step so an
//! interrupted task resumes where it stopped. Runs are bounded by a worker
//! semaphore and serialized per object: two tasks on the same LLM never
//! execute stages at the same time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TaskRecord, TaskStatus};
use crate::domain::ports::TaskRepository;
use crate::services::context::AppContext;

/// What a stage asks the runner to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Next(String),
    /// Park until every child task is terminal, then run the given stage.
    WaitChildren(String),
    Complete(Option<Value>),
    Failed(String),
}

impl StageOutcome {
    pub fn next(stage: impl AsRef<str>) -> Self {
        Self::Next(stage.as_ref().to_string())
    }

    pub fn wait_children(stage: impl AsRef<str>) -> Self {
        Self::WaitChildren(stage.as_ref().to_string())
    }
}

/// Handles passed to every stage.
#[derive(Clone)]
pub struct TaskContext {
    pub app: Arc<AppContext>,
    pub manager: TaskManager,
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome>;

    /// Called once when the task fails, before the failure is persisted.
    async fn on_failure(&self, _ctx: &TaskContext, _task: &TaskRecord, _reason: &str) -> DomainResult<()> {
        Ok(())
    }
}

/// Key under which child failures are recorded in the parent's params.
pub const CHILD_FAILURES_PARAM: &str = "child_failures";

struct Inner {
    app: Arc<AppContext>,
    repo: Arc<dyn TaskRepository>,
    handlers: HashMap<&'static str, Arc<dyn TaskHandler>>,
    workers: Arc<Semaphore>,
    object_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    pub fn new(app: Arc<AppContext>, handlers: Vec<Arc<dyn TaskHandler>>) -> Self {
        let workers = app.config.workers.max(1);
        let repo = app.repos.tasks.clone();
        let handlers = handlers.into_iter().map(|h| (h.name(), h)).collect();
        Self {
            inner: Arc::new(Inner {
                app,
                repo,
                handlers,
                workers: Arc::new(Semaphore::new(workers)),
                object_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn app(&self) -> &Arc<AppContext> {
        &self.inner.app
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.inner.handlers.contains_key(name)
    }

    /// Persist a queued task without running it.
    pub async fn new_task(
        &self,
        task_name: &str,
        obj_type: &str,
        obj_id: &str,
        obj_name: &str,
        params: Value,
        parent_task_id: Option<&str>,
    ) -> DomainResult<TaskRecord> {
        if !self.has_handler(task_name) {
            return Err(DomainError::Validation(format!("unknown task {task_name}")));
        }
        let params = if params.is_null() { json!({}) } else { params };
        let task = TaskRecord::new(
            task_name,
            obj_type,
            obj_id,
            obj_name,
            params,
            parent_task_id.map(ToString::to_string),
        );
        self.inner.repo.insert(&task).await?;
        info!(task_id = %task.id, task = task_name, obj_id, "task created");
        Ok(task)
    }

    /// Create a task and schedule it right away.
    pub async fn start_task(
        &self,
        task_name: &str,
        obj_type: &str,
        obj_id: &str,
        obj_name: &str,
        params: Value,
        parent_task_id: Option<&str>,
    ) -> DomainResult<TaskRecord> {
        let task = self
            .new_task(task_name, obj_type, obj_id, obj_name, params, parent_task_id)
            .await?;
        self.schedule_run(&task.id);
        Ok(task)
    }

    pub fn schedule_run(&self, task_id: &str) {
        let manager = self.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = manager.run(&task_id).await {
                error!(task_id = %task_id, error = %err, "task run aborted");
            }
        });
    }

    /// Reschedule every task that was not terminal when the service stopped.
    pub async fn resume_unfinished(&self) -> DomainResult<usize> {
        let tasks = self.inner.repo.list_unfinished().await?;
        for task in &tasks {
            info!(task_id = %task.id, task = %task.task_name, stage = %task.stage, "resuming task");
            self.schedule_run(&task.id);
        }
        Ok(tasks.len())
    }

    pub async fn get(&self, task_id: &str) -> DomainResult<TaskRecord> {
        self.inner
            .repo
            .get(task_id)
            .await?
            .ok_or_else(|| DomainError::not_found("task", task_id))
    }

    /// Poll until the task is terminal.
    pub async fn wait_task(&self, task_id: &str, timeout: Duration) -> DomainResult<TaskRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let task = self.get(task_id).await?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DomainError::Timeout(format!(
                    "task {task_id} still {} at stage {}",
                    task.status.as_str(),
                    task.stage
                )));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn object_lock(&self, task: &TaskRecord) -> Arc<tokio::sync::Mutex<()>> {
        let key = format!("{}/{}", task.obj_type, task.obj_id);
        let mut locks = self
            .inner
            .object_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }

    fn release_object_locks(&self) {
        let mut locks = self
            .inner
            .object_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    async fn run(&self, task_id: &str) -> DomainResult<()> {
        let task = self.get(task_id).await?;
        let lock = self.object_lock(&task);
        let result = {
            let _guard = lock.lock().await;
            let _permit = self
                .inner
                .workers
                .acquire()
                .await
                .map_err(|_| DomainError::Unsupported("task runner is shut down".into()))?;
            self.drive(task_id).await
        };
        drop(lock);
        self.release_object_locks();
        result
    }

    /// Run stages until the task completes, fails or parks.
    async fn drive(&self, task_id: &str) -> DomainResult<()> {
        let mut task = self.get(task_id).await?;
        if task.status.is_terminal() {
            return Ok(());
        }
        if task.status == TaskStatus::Waiting && !self.collect_children(&mut task).await? {
            return Ok(());
        }

        let Some(handler) = self.inner.handlers.get(task.task_name.as_str()).cloned() else {
            let reason = format!("no handler for task {}", task.task_name);
            return self.finish_failed(None, &mut task, reason).await;
        };
        let ctx = TaskContext {
            app: self.inner.app.clone(),
            manager: self.clone(),
        };

        loop {
            task.status = TaskStatus::Running;
            self.save(&mut task).await?;

            match self.run_stage(handler.as_ref(), &ctx, &mut task).await {
                Ok(StageOutcome::Next(stage)) => {
                    task.stage = stage;
                }
                Ok(StageOutcome::WaitChildren(stage)) => {
                    task.stage = stage;
                    task.status = TaskStatus::Waiting;
                    self.save(&mut task).await?;
                    if !self.collect_children(&mut task).await? {
                        return Ok(());
                    }
                }
                Ok(StageOutcome::Complete(result)) => {
                    task.status = TaskStatus::Complete;
                    task.result = result;
                    self.save(&mut task).await?;
                    info!(task_id = %task.id, task = %task.task_name, "task complete");
                    self.notify_parent(&task).await?;
                    return Ok(());
                }
                Ok(StageOutcome::Failed(reason)) => {
                    return self.finish_failed(Some((handler.as_ref(), &ctx)), &mut task, reason).await;
                }
                Err(err) => {
                    return self
                        .finish_failed(Some((handler.as_ref(), &ctx)), &mut task, err.to_string())
                        .await;
                }
            }
        }
    }

    #[instrument(skip_all, fields(task_id = %task.id, task = %task.task_name, stage = %task.stage))]
    async fn run_stage(
        &self,
        handler: &dyn TaskHandler,
        ctx: &TaskContext,
        task: &mut TaskRecord,
    ) -> DomainResult<StageOutcome> {
        handler.on_stage(ctx, task).await
    }

    async fn finish_failed(
        &self,
        handler: Option<(&dyn TaskHandler, &TaskContext)>,
        task: &mut TaskRecord,
        reason: String,
    ) -> DomainResult<()> {
        warn!(task_id = %task.id, task = %task.task_name, stage = %task.stage, reason = %reason, "task failed");
        if let Some((handler, ctx)) = handler {
            if let Err(err) = handler.on_failure(ctx, task, &reason).await {
                error!(task_id = %task.id, error = %err, "failure hook failed");
            }
        }
        task.status = TaskStatus::Failed;
        task.reason = Some(reason);
        self.save(task).await?;
        self.notify_parent(task).await
    }

    async fn save(&self, task: &mut TaskRecord) -> DomainResult<()> {
        task.updated_at = Utc::now();
        self.inner.repo.update(task).await
    }

    /// Returns `true` and resumes the task when all children are terminal,
    /// recording the failed ones.
    async fn collect_children(&self, task: &mut TaskRecord) -> DomainResult<bool> {
        let children = self.inner.repo.list_children(&task.id).await?;
        if children.iter().any(|c| !c.status.is_terminal()) {
            return Ok(false);
        }
        let failures: Vec<Value> = children
            .iter()
            .filter(|c| c.status == TaskStatus::Failed)
            .map(|c| {
                json!({
                    "task_id": c.id,
                    "obj_id": c.obj_id,
                    "obj_name": c.obj_name,
                    "reason": c.reason.clone().unwrap_or_default(),
                })
            })
            .collect();
        task.set_param(CHILD_FAILURES_PARAM, failures);
        task.status = TaskStatus::Running;
        Ok(true)
    }

    async fn notify_parent(&self, task: &TaskRecord) -> DomainResult<()> {
        let Some(parent_id) = task.parent_task_id.as_deref() else {
            return Ok(());
        };
        let Some(parent) = self.inner.repo.get(parent_id).await? else {
            warn!(task_id = %task.id, parent_id, "parent task vanished");
            return Ok(());
        };
        if parent.status != TaskStatus::Waiting {
            return Ok(());
        }
        let children = self.inner.repo.list_children(parent_id).await?;
        if children.iter().all(|c| c.status.is_terminal()) {
            self.schedule_run(parent_id);
        }
        Ok(())
    }
}

/// Records the children reported as failed by [`TaskManager`].
pub fn child_failures(task: &TaskRecord) -> Vec<Value> {
    task.param::<Vec<Value>>(CHILD_FAILURES_PARAM).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_app;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TaskHandler for CountingTask {
        fn name(&self) -> &'static str {
            "CountingTask"
        }

        async fn on_stage(&self, _ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match task.stage.as_str() {
                "on_init" => {
                    task.set_param("seen", true);
                    Ok(StageOutcome::next("on_second"))
                }
                "on_second" => Ok(StageOutcome::Complete(Some(json!({"done": true})))),
                other => Ok(StageOutcome::Failed(format!("unexpected stage {other}"))),
            }
        }
    }

    struct FailingTask;

    #[async_trait]
    impl TaskHandler for FailingTask {
        fn name(&self) -> &'static str {
            "FailingTask"
        }

        async fn on_stage(&self, _ctx: &TaskContext, _task: &mut TaskRecord) -> DomainResult<StageOutcome> {
            Err(DomainError::Remote("compute unavailable".into()))
        }
    }

    struct ParentTask;

    #[async_trait]
    impl TaskHandler for ParentTask {
        fn name(&self) -> &'static str {
            "ParentTask"
        }

        async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
            match task.stage.as_str() {
                "on_init" => {
                    for (i, name) in ["CountingTask", "FailingTask"].iter().enumerate() {
                        ctx.manager
                            .start_task(name, "thing", &format!("child-{i}"), "child", json!({}), Some(task.id.as_str()))
                            .await?;
                    }
                    Ok(StageOutcome::wait_children("on_children_done"))
                }
                "on_children_done" => Ok(StageOutcome::Complete(Some(json!({
                    "failed": child_failures(task).len()
                })))),
                other => Ok(StageOutcome::Failed(format!("unexpected stage {other}"))),
            }
        }
    }

    async fn manager() -> (TaskManager, Arc<AtomicUsize>) {
        let app = test_app().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let handlers: Vec<Arc<dyn TaskHandler>> = vec![
            Arc::new(CountingTask { runs: runs.clone() }),
            Arc::new(FailingTask),
            Arc::new(ParentTask),
        ];
        (TaskManager::new(app, handlers), runs)
    }

    #[tokio::test]
    async fn test_stages_run_to_completion() {
        let (manager, runs) = manager().await;
        let task = manager
            .start_task("CountingTask", "thing", "a", "a", Value::Null, None)
            .await
            .unwrap();
        let done = manager.wait_task(&task.id, Duration::from_secs(5)).await.unwrap();

        assert_eq!(done.status, TaskStatus::Complete);
        assert_eq!(done.stage, "on_second");
        assert_eq!(done.param::<bool>("seen"), Some(true));
        assert_eq!(done.result, Some(json!({"done": true})));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_fails_task_with_reason() {
        let (manager, _) = manager().await;
        let task = manager
            .start_task("FailingTask", "thing", "a", "a", json!({}), None)
            .await
            .unwrap();
        let done = manager.wait_task(&task.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        assert!(done.reason.unwrap().contains("compute unavailable"));
    }

    #[tokio::test]
    async fn test_parent_resumes_after_children() {
        let (manager, _) = manager().await;
        let task = manager
            .start_task("ParentTask", "thing", "p", "p", json!({}), None)
            .await
            .unwrap();
        let done = manager.wait_task(&task.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, TaskStatus::Complete);
        assert_eq!(done.result, Some(json!({"failed": 1})));
        assert_eq!(child_failures(&done)[0]["obj_id"], "child-1");
    }

    #[tokio::test]
    async fn test_unknown_task_rejected() {
        let (manager, _) = manager().await;
        let err = manager
            .new_task("NoSuchTask", "thing", "a", "a", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_resume_unfinished() {
        let (manager, _) = manager().await;
        let task = manager
            .new_task("CountingTask", "thing", "a", "a", json!({}), None)
            .await
            .unwrap();
        assert_eq!(manager.resume_unfinished().await.unwrap(), 1);
        let done = manager.wait_task(&task.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, TaskStatus::Complete);
    }
}
