use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde_json::{json, Value};

use super::{list as list_envelope, object, take, ApiResult, SharedState};
use crate::domain::models::{Dify, DifyCreateInput, Resource, ResourceListInput};

pub async fn list(State(state): State<SharedState>, Query(input): Query<ResourceListInput>) -> ApiResult<Json<Value>> {
    list_envelope(Dify::KEYWORD_PLURAL, &state.difys.list(&input).await?)
}

pub async fn show(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(Dify::KEYWORD, &state.difys.show(&id).await?)
}

pub async fn create(State(state): State<SharedState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let input: DifyCreateInput = take(body, Dify::KEYWORD)?;
    let (dify, task) = state.difys.create(input).await?;
    let mut out = object(Dify::KEYWORD, &dify)?;
    out.0["task_id"] = json!(task.id);
    Ok(out)
}

pub async fn delete(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object("task", &state.difys.delete(&id).await?)
}

pub async fn url(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    Ok(Json(serde_json::to_value(state.difys.get_url(&id).await?)?))
}
