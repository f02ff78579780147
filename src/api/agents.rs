use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde_json::Value;

use super::{list as list_envelope, object, take, ApiResult, SharedState};
use crate::domain::models::{McpAgent, McpAgentChatInput, McpAgentCreateInput, Resource, ResourceListInput};

pub async fn list(State(state): State<SharedState>, Query(input): Query<ResourceListInput>) -> ApiResult<Json<Value>> {
    list_envelope(McpAgent::KEYWORD_PLURAL, &state.agents.list(&input).await?)
}

pub async fn show(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(McpAgent::KEYWORD, &state.agents.get(&id).await?)
}

pub async fn create(State(state): State<SharedState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let input: McpAgentCreateInput = take(body, McpAgent::KEYWORD)?;
    object(McpAgent::KEYWORD, &state.agents.create(input).await?)
}

pub async fn delete(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let agent = state.agents.get(&id).await?;
    state.agents.delete(&agent.base.id).await?;
    object(McpAgent::KEYWORD, &agent)
}

pub async fn chat(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let input: McpAgentChatInput = take(body, McpAgent::KEYWORD)?;
    Ok(Json(serde_json::to_value(state.agents.chat(&id, input).await?)?))
}
