use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{list as list_envelope, object, take, ApiResult, SharedState};
use crate::domain::models::{
    Llm, LlmCreateInput, LlmListInput, LlmPerformQuickModelsInput, LlmUpdateInput, ListOutput, Resource,
};

const KEYWORD: &str = Llm::KEYWORD;

pub async fn list(State(state): State<SharedState>, Query(input): Query<LlmListInput>) -> ApiResult<Json<Value>> {
    let output = state.llms.list(&input).await?;
    list_envelope(Llm::KEYWORD_PLURAL, &output)
}

pub async fn show(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(KEYWORD, &state.llms.show(&id).await?)
}

/// Accepts `count` beside the keyword for batch creation.
pub async fn create(State(state): State<SharedState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let count = body.get("count").and_then(Value::as_u64);
    let mut input: LlmCreateInput = take(body, KEYWORD)?;
    if let Some(count) = count {
        input.count = Some(u32::try_from(count).unwrap_or(u32::MAX));
    }
    let (llms, task) = state.llms.create(input).await?;
    if let [llm] = llms.as_slice() {
        let mut out = object(KEYWORD, llm)?;
        out.0["task_id"] = json!(task.id);
        return Ok(out);
    }
    let total = i64::try_from(llms.len()).unwrap_or(i64::MAX);
    let mut out = list_envelope(
        Llm::KEYWORD_PLURAL,
        &ListOutput {
            data: llms,
            total,
            limit: 0,
            offset: 0,
        },
    )?;
    out.0["task_id"] = json!(task.id);
    Ok(out)
}

pub async fn update(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let input: LlmUpdateInput = take(body, KEYWORD)?;
    object(KEYWORD, &state.llms.update(&id, input).await?)
}

pub async fn delete(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let task = state.llms.delete(&id).await?;
    object("task", &task)
}

pub async fn start(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object("task", &state.llms.perform_start(&id).await?)
}

pub async fn stop(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object("task", &state.llms.perform_stop(&id).await?)
}

pub async fn syncstatus(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object("task", &state.llms.perform_syncstatus(&id).await?)
}

#[derive(Debug, Deserialize)]
pub struct PullModelBody {
    #[serde(default)]
    model: String,
}

pub async fn pull_model(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let input: PullModelBody = take(body, KEYWORD)?;
    object("task", &state.llms.perform_pull_model(&id, &input.model).await?)
}

pub async fn quick_models(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let input: LlmPerformQuickModelsInput = take(body, KEYWORD)?;
    let output = state.llms.perform_quick_models(&id, input).await?;
    Ok(Json(serde_json::to_value(output)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    force: bool,
}

pub async fn refresh_instant_models(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<Value>> {
    let rows = state.llms.refresh_instant_models(&id, query.force).await?;
    let total = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    list_envelope(
        "llm_instant_models",
        &ListOutput {
            data: rows,
            total,
            limit: 0,
            offset: 0,
        },
    )
}

pub async fn url(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    Ok(Json(serde_json::to_value(state.llms.get_url(&id).await?)?))
}

pub async fn available_network(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    Ok(Json(serde_json::to_value(state.llms.available_network().await)?))
}

#[derive(Debug, Deserialize)]
pub struct InstantModelsQuery {
    /// LLM id or name.
    llm: String,
    probed: Option<bool>,
    mounted: Option<bool>,
    system: Option<bool>,
}

pub async fn instant_models(
    State(state): State<SharedState>,
    Query(query): Query<InstantModelsQuery>,
) -> ApiResult<Json<Value>> {
    let rows = state
        .llms
        .instant_models(&query.llm, query.probed, query.mounted, query.system)
        .await?;
    let total = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    list_envelope(
        "llm_instant_models",
        &ListOutput {
            data: rows,
            total,
            limit: 0,
            offset: 0,
        },
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::api::test_helpers::test_api;
    use crate::domain::models::TaskStatus;
    use crate::test_support::{seed_llm_image, seed_llm_sku};

    #[tokio::test]
    async fn test_create_show_and_list() {
        let api = test_api().await;
        let image = seed_llm_image(&api.env.app).await;
        seed_llm_sku(&api.env.app, &image).await;

        let (status, body) = api
            .call(
                Method::POST,
                "/llms",
                Some(json!({"llm": {"name": "llm-a", "llm_sku_id": "ollama-small"}})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["llm"]["name"], "llm-a");
        let task_id = body["task_id"].as_str().unwrap().to_string();
        let task = api.state.tasks.wait_task(&task_id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Complete, "{:?}", task.reason);

        let (status, body) = api.call(Method::GET, "/llms/llm-a", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["llm"]["llm_sku"], "ollama-small");
        assert_eq!(body["llm"]["llm_status"], "running");

        let (_, body) = api.call(Method::GET, "/llms?status=running&limit=10", None).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["llms"][0]["name"], "llm-a");

        let (status, body) = api.call(Method::GET, "/llms/llm-a/url", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["access_url"], "http://10.0.0.1:20000");

        let (status, body) = api.call(Method::POST, "/llms/llm-a/start", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["class"], "InvalidStatusError");
    }

    #[tokio::test]
    async fn test_batch_create() {
        let api = test_api().await;
        let image = seed_llm_image(&api.env.app).await;
        seed_llm_sku(&api.env.app, &image).await;

        let (status, body) = api
            .call(
                Method::POST,
                "/llms",
                Some(json!({"llm": {"name": "batch", "llm_sku_id": "ollama-small"}, "count": 2})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["total"], 2);
        assert_eq!(body["llms"][1]["name"], "batch-2");
        let task_id = body["task_id"].as_str().unwrap().to_string();
        api.state.tasks.wait_task(&task_id, Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_llm_and_quick_models_validation() {
        let api = test_api().await;
        let (status, body) = api.call(Method::GET, "/llms/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 404);

        let (status, _) = api
            .call(Method::POST, "/llms/nope/quick-models", Some(json!({"models": []})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_available_network() {
        let api = test_api().await;
        let (status, body) = api.call(Method::GET, "/llms/available-network", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("auto_alloc_network_hostlocal_count").is_none());
    }
}
