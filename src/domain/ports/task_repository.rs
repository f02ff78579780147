use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{TaskRecord, TaskStatus};

/// Filters for querying tasks
#[derive(Default, Debug, Clone)]
pub struct TaskFilter {
    pub obj_type: Option<String>,
    pub obj_id: Option<String>,
    pub task_name: Option<String>,
    pub status: Option<TaskStatus>,
    pub limit: Option<i64>,
}

/// Repository port for task persistence operations
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: &TaskRecord) -> DomainResult<()>;

    async fn get(&self, id: &str) -> DomainResult<Option<TaskRecord>>;

    /// Update an existing task, failing with not found if it vanished
    async fn update(&self, task: &TaskRecord) -> DomainResult<()>;

    /// List tasks, newest first
    async fn list(&self, filter: &TaskFilter) -> DomainResult<Vec<TaskRecord>>;

    async fn list_children(&self, parent_id: &str) -> DomainResult<Vec<TaskRecord>>;

    /// Tasks not yet complete or failed, oldest first
    async fn list_unfinished(&self) -> DomainResult<Vec<TaskRecord>>;
}
