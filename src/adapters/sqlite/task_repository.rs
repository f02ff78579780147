//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{format_datetime, parse_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TaskRecord, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn insert(&self, task: &TaskRecord) -> DomainResult<()> {
        let params = serde_json::to_string(&task.params)?;
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO tasks_tbl (id, task_name, obj_type, obj_id, obj_name, stage, status,
               params, result, reason, parent_task_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&task.id)
        .bind(&task.task_name)
        .bind(&task.obj_type)
        .bind(&task.obj_id)
        .bind(&task.obj_name)
        .bind(&task.stage)
        .bind(task.status.as_str())
        .bind(&params)
        .bind(&result)
        .bind(&task.reason)
        .bind(&task.parent_task_id)
        .bind(format_datetime(&task.created_at))
        .bind(format_datetime(&task.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<TaskRecord>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks_tbl WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, task: &TaskRecord) -> DomainResult<()> {
        let params = serde_json::to_string(&task.params)?;
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;

        let outcome = sqlx::query(
            r#"UPDATE tasks_tbl SET stage = ?, status = ?, params = ?, result = ?, reason = ?,
               obj_name = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&task.stage)
        .bind(task.status.as_str())
        .bind(&params)
        .bind(&result)
        .bind(&task.reason)
        .bind(&task.obj_name)
        .bind(format_datetime(&task.updated_at))
        .bind(&task.id)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(DomainError::not_found("task", &task.id));
        }
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> DomainResult<Vec<TaskRecord>> {
        let mut query = String::from("SELECT * FROM tasks_tbl WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(obj_type) = &filter.obj_type {
            query.push_str(" AND obj_type = ?");
            bindings.push(obj_type.clone());
        }
        if let Some(obj_id) = &filter.obj_id {
            query.push_str(" AND obj_id = ?");
            bindings.push(obj_id.clone());
        }
        if let Some(task_name) = &filter.task_name {
            query.push_str(" AND task_name = ?");
            bindings.push(task_name.clone());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }

        query.push_str(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_children(&self, parent_id: &str) -> DomainResult<Vec<TaskRecord>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks_tbl WHERE parent_task_id = ? ORDER BY created_at, rowid",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_unfinished(&self) -> DomainResult<Vec<TaskRecord>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks_tbl WHERE status NOT IN ('complete', 'failed') ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    task_name: String,
    obj_type: String,
    obj_id: String,
    obj_name: String,
    stage: String,
    status: String,
    params: String,
    result: Option<String>,
    reason: Option<String>,
    parent_task_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid task status: {}", row.status)))?;

        let params = serde_json::from_str(&row.params)?;
        let result = row.result.map(|s| serde_json::from_str(&s)).transpose()?;

        Ok(TaskRecord {
            id: row.id,
            task_name: row.task_name,
            obj_type: row.obj_type,
            obj_id: row.obj_id,
            obj_name: row.obj_name,
            stage: row.stage,
            status,
            params,
            result,
            reason: row.reason,
            parent_task_id: row.parent_task_id,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use serde_json::json;

    async fn setup() -> SqliteTaskRepository {
        SqliteTaskRepository::new(create_migrated_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = setup().await;
        let task = TaskRecord::new("LlmCreateTask", "llm", "llm-1", "test", json!({"a": 1}), None);
        repo.insert(&task).await.unwrap();

        let fetched = repo.get(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.task_name, "LlmCreateTask");
        assert_eq!(fetched.params, json!({"a": 1}));
        assert_eq!(fetched.status, TaskStatus::Queued);
        assert!(fetched.result.is_none());
    }

    #[tokio::test]
    async fn test_update_stage_and_status() {
        let repo = setup().await;
        let mut task = TaskRecord::new("LlmStartTask", "llm", "llm-1", "test", json!({}), None);
        repo.insert(&task).await.unwrap();

        task.stage = "on_started".into();
        task.status = TaskStatus::Complete;
        task.result = Some(json!({"ok": true}));
        repo.update(&task).await.unwrap();

        let fetched = repo.get(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.stage, "on_started");
        assert_eq!(fetched.status, TaskStatus::Complete);
        assert_eq!(fetched.result, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_update_missing_task() {
        let repo = setup().await;
        let task = TaskRecord::new("LlmStopTask", "llm", "x", "x", json!({}), None);
        assert!(repo.update(&task).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_children_and_unfinished() {
        let repo = setup().await;
        let parent = TaskRecord::new("LlmBatchCreateTask", "llm", "a", "a", json!({}), None);
        repo.insert(&parent).await.unwrap();

        let child1 = TaskRecord::new("LlmCreateTask", "llm", "a", "a", json!({}), Some(parent.id.clone()));
        let mut child2 = TaskRecord::new("LlmCreateTask", "llm", "b", "b", json!({}), Some(parent.id.clone()));
        repo.insert(&child1).await.unwrap();
        repo.insert(&child2).await.unwrap();

        child2.status = TaskStatus::Failed;
        repo.update(&child2).await.unwrap();

        assert_eq!(repo.list_children(&parent.id).await.unwrap().len(), 2);
        let unfinished = repo.list_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 2);
        assert!(unfinished.iter().all(|t| t.id != child2.id));

        let filtered = repo
            .list(&TaskFilter {
                obj_id: Some("b".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, child2.id);
    }
}
