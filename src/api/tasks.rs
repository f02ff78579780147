use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{object, ApiResult, SharedState};
use crate::domain::errors::DomainError;
use crate::domain::models::TaskStatus;
use crate::domain::ports::TaskFilter;

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    obj_type: Option<String>,
    obj_id: Option<String>,
    task_name: Option<String>,
    status: Option<String>,
    limit: Option<i64>,
}

pub async fn list(State(state): State<SharedState>, Query(query): Query<TaskQuery>) -> ApiResult<Json<Value>> {
    let status = match query.status.as_deref() {
        Some(s) => Some(TaskStatus::from_str(s).ok_or_else(|| DomainError::Validation(format!("invalid task status {s}")))?),
        None => None,
    };
    let filter = TaskFilter {
        obj_type: query.obj_type,
        obj_id: query.obj_id,
        task_name: query.task_name,
        status,
        limit: query.limit,
    };
    let tasks = state.tasks.app().repos.tasks.list(&filter).await?;
    Ok(Json(json!({ "total": tasks.len(), "tasks": tasks })))
}

pub async fn show(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object("task", &state.tasks.get(&id).await?)
}
