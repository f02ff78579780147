//! HTTP surface of the LLM service.
//!
//! Bodies follow the platform envelope: a single object travels under its
//! singular keyword (`{"llm": {...}}`), a list under the plural keyword
//! with `total`, `limit` and `offset` beside it.

mod agents;
mod catalog;
mod difys;
pub mod error;
mod llms;
mod tasks;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::domain::models::ListOutput;
use crate::services::{CatalogService, DifyService, LlmService, McpAgentService, TaskManager};

pub use error::{ApiError, ApiResult};

pub struct ApiState {
    pub llms: LlmService,
    pub difys: DifyService,
    pub catalog: CatalogService,
    pub agents: McpAgentService,
    pub tasks: TaskManager,
}

impl ApiState {
    pub fn new(tasks: TaskManager) -> Self {
        let app = tasks.app().clone();
        Self {
            llms: LlmService::new(tasks.clone()),
            difys: DifyService::new(tasks.clone()),
            catalog: CatalogService::new(tasks.clone()),
            agents: McpAgentService::new(app),
            tasks,
        }
    }
}

pub type SharedState = Arc<ApiState>;

/// Request body, with or without the keyword wrapper.
pub(crate) fn take<T: DeserializeOwned>(body: Value, keyword: &str) -> ApiResult<T> {
    let inner = match body {
        Value::Object(mut map) if map.contains_key(keyword) => map.remove(keyword).unwrap_or(Value::Null),
        other => other,
    };
    Ok(serde_json::from_value(inner)?)
}

pub(crate) fn object<T: Serialize>(keyword: &str, value: &T) -> ApiResult<Json<Value>> {
    let mut map = Map::new();
    map.insert(keyword.to_string(), serde_json::to_value(value)?);
    Ok(Json(Value::Object(map)))
}

pub(crate) fn list<T: Serialize>(keyword_plural: &str, output: &ListOutput<T>) -> ApiResult<Json<Value>> {
    let mut map = Map::new();
    map.insert(keyword_plural.to_string(), serde_json::to_value(&output.data)?);
    map.insert("total".into(), json!(output.total));
    map.insert("limit".into(), json!(output.limit));
    map.insert("offset".into(), json!(output.offset));
    Ok(Json(Value::Object(map)))
}

/// Comma separated query value as a list.
pub(crate) fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        // llms
        .route("/llms", get(llms::list).post(llms::create))
        .route("/llms/available-network", get(llms::available_network))
        .route("/llms/{id}", get(llms::show).put(llms::update).delete(llms::delete))
        .route("/llms/{id}/start", post(llms::start))
        .route("/llms/{id}/stop", post(llms::stop))
        .route("/llms/{id}/syncstatus", post(llms::syncstatus))
        .route("/llms/{id}/pull-model", post(llms::pull_model))
        .route("/llms/{id}/quick-models", post(llms::quick_models))
        .route("/llms/{id}/refresh-instant-models", post(llms::refresh_instant_models))
        .route("/llms/{id}/url", get(llms::url))
        .route("/llm_instant_models", get(llms::instant_models))
        // catalog
        .route("/llm_skus", get(catalog::list_skus).post(catalog::create_sku))
        .route(
            "/llm_skus/{id}",
            get(catalog::show_sku).put(catalog::update_sku).delete(catalog::delete_sku),
        )
        .route("/llm_images", get(catalog::list_images).post(catalog::create_image))
        .route("/llm_images/{id}", get(catalog::show_image).delete(catalog::delete_image))
        .route("/dify_skus", get(catalog::list_dify_skus).post(catalog::create_dify_sku))
        .route("/dify_skus/{id}", get(catalog::show_dify_sku).delete(catalog::delete_dify_sku))
        .route("/instant_models", get(catalog::list_models).post(catalog::create_model))
        .route("/instant_models/import", post(catalog::import_model))
        .route(
            "/instant_models/{id}",
            get(catalog::show_model).put(catalog::update_model).delete(catalog::delete_model),
        )
        .route("/instant_models/{id}/enable", post(catalog::enable_model))
        .route("/instant_models/{id}/disable", post(catalog::disable_model))
        .route("/instant_models/{id}/syncstatus", post(catalog::syncstatus_model))
        .route("/instant_models/{id}/enable-auto-cache", post(catalog::enable_auto_cache))
        .route("/instant_models/{id}/public", post(catalog::public_model))
        .route("/instant_models/{id}/private", post(catalog::private_model))
        .route("/instant_models/{id}/change-owner", post(catalog::change_owner))
        // difys
        .route("/difys", get(difys::list).post(difys::create))
        .route("/difys/{id}", get(difys::show).delete(difys::delete))
        .route("/difys/{id}/url", get(difys::url))
        // agents
        .route("/mcp_agents", get(agents::list).post(agents::create))
        .route("/mcp_agents/{id}", get(agents::show).delete(agents::delete))
        .route("/mcp_agents/{id}/chat", post(agents::chat))
        // tasks
        .route("/tasks", get(tasks::list))
        .route("/tasks/{id}", get(tasks::show))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(state: SharedState, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "llm service listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
