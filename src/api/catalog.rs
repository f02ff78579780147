use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{list, object, split_csv, take, ApiResult, SharedState};
use crate::domain::models::{
    DifySku, DifySkuCreateInput, InstantModel, InstantModelChangeOwnerInput, InstantModelCreateInput,
    InstantModelEnableAutoCacheInput, InstantModelImportInput, InstantModelListInput,
    InstantModelUpdateInput, ListOutput, LlmImage, LlmImageCreateInput, LlmSku, LlmSkuCreateInput,
    LlmSkuUpdateInput, Resource, ResourceListInput,
};

// llm skus

pub async fn list_skus(
    State(state): State<SharedState>,
    Query(input): Query<ResourceListInput>,
) -> ApiResult<Json<Value>> {
    list(LlmSku::KEYWORD_PLURAL, &state.catalog.list_llm_skus(&input).await?)
}

pub async fn show_sku(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(LlmSku::KEYWORD, &state.catalog.get_llm_sku(&id).await?)
}

pub async fn create_sku(State(state): State<SharedState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let input: LlmSkuCreateInput = take(body, LlmSku::KEYWORD)?;
    object(LlmSku::KEYWORD, &state.catalog.create_llm_sku(input).await?)
}

pub async fn update_sku(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let input: LlmSkuUpdateInput = take(body, LlmSku::KEYWORD)?;
    object(LlmSku::KEYWORD, &state.catalog.update_llm_sku(&id, input).await?)
}

pub async fn delete_sku(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let sku = state.catalog.get_llm_sku(&id).await?;
    state.catalog.delete_llm_sku(&sku.base.id).await?;
    object(LlmSku::KEYWORD, &sku)
}

// llm images

pub async fn list_images(
    State(state): State<SharedState>,
    Query(input): Query<ResourceListInput>,
) -> ApiResult<Json<Value>> {
    list(LlmImage::KEYWORD_PLURAL, &state.catalog.list_llm_images(&input).await?)
}

pub async fn show_image(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(LlmImage::KEYWORD, &state.catalog.get_llm_image(&id).await?)
}

pub async fn create_image(State(state): State<SharedState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let input: LlmImageCreateInput = take(body, LlmImage::KEYWORD)?;
    object(LlmImage::KEYWORD, &state.catalog.create_llm_image(input).await?)
}

pub async fn delete_image(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let image = state.catalog.get_llm_image(&id).await?;
    state.catalog.delete_llm_image(&image.base.id).await?;
    object(LlmImage::KEYWORD, &image)
}

// dify skus

pub async fn list_dify_skus(
    State(state): State<SharedState>,
    Query(input): Query<ResourceListInput>,
) -> ApiResult<Json<Value>> {
    list(DifySku::KEYWORD_PLURAL, &state.catalog.list_dify_skus(&input).await?)
}

pub async fn show_dify_sku(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(DifySku::KEYWORD, &state.catalog.get_dify_sku(&id).await?)
}

pub async fn create_dify_sku(State(state): State<SharedState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let input: DifySkuCreateInput = take(body, DifySku::KEYWORD)?;
    object(DifySku::KEYWORD, &state.catalog.create_dify_sku(input).await?)
}

pub async fn delete_dify_sku(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let sku = state.catalog.get_dify_sku(&id).await?;
    state.catalog.delete_dify_sku(&sku.base.id).await?;
    object(DifySku::KEYWORD, &sku)
}

// instant models

/// List filters; multi-valued fields are comma separated.
#[derive(Debug, Default, Deserialize)]
pub struct InstantModelQuery {
    model_name: Option<String>,
    model_tag: Option<String>,
    model_id: Option<String>,
    llm_type: Option<String>,
    enabled: Option<bool>,
    auto_cache: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
    #[serde(default)]
    details: bool,
}

impl From<InstantModelQuery> for InstantModelListInput {
    fn from(q: InstantModelQuery) -> Self {
        Self {
            model_name: split_csv(q.model_name.as_deref()),
            model_tag: split_csv(q.model_tag.as_deref()),
            model_id: split_csv(q.model_id.as_deref()),
            llm_type: q.llm_type,
            enabled: q.enabled,
            auto_cache: q.auto_cache,
            limit: q.limit,
            offset: q.offset,
        }
    }
}

pub async fn list_models(
    State(state): State<SharedState>,
    Query(query): Query<InstantModelQuery>,
) -> ApiResult<Json<Value>> {
    let details = query.details;
    let output = state.catalog.list_instant_models(&query.into()).await?;
    if !details {
        return list(InstantModel::KEYWORD_PLURAL, &output);
    }
    let data = state.catalog.instant_model_details(output.data).await?;
    list(
        InstantModel::KEYWORD_PLURAL,
        &ListOutput {
            data,
            total: output.total,
            limit: output.limit,
            offset: output.offset,
        },
    )
}

pub async fn show_model(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(InstantModel::KEYWORD, &state.catalog.show_instant_model(&id).await?)
}

pub async fn create_model(State(state): State<SharedState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let input: InstantModelCreateInput = take(body, InstantModel::KEYWORD)?;
    object(InstantModel::KEYWORD, &state.catalog.create_instant_model(input).await?)
}

/// Start a registry import; answers with the placeholder model and the task id.
pub async fn import_model(State(state): State<SharedState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let input: InstantModelImportInput = take(body, InstantModel::KEYWORD)?;
    let (model, task) = state.catalog.import_instant_model(input).await?;
    let mut out = object(InstantModel::KEYWORD, &model)?;
    out.0["task_id"] = json!(task.id);
    Ok(out)
}

pub async fn change_owner(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let input: InstantModelChangeOwnerInput = take(body, InstantModel::KEYWORD)?;
    object(InstantModel::KEYWORD, &state.catalog.change_owner(&id, &input.project_id).await?)
}

pub async fn update_model(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let input: InstantModelUpdateInput = take(body, InstantModel::KEYWORD)?;
    object(InstantModel::KEYWORD, &state.catalog.update_instant_model(&id, input).await?)
}

pub async fn delete_model(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let model = state.catalog.get_instant_model(&id).await?;
    state.catalog.delete_instant_model(&model.base.id).await?;
    object(InstantModel::KEYWORD, &model)
}

pub async fn enable_model(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(InstantModel::KEYWORD, &state.catalog.enable_instant_model(&id).await?)
}

pub async fn disable_model(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(InstantModel::KEYWORD, &state.catalog.disable_instant_model(&id).await?)
}

pub async fn syncstatus_model(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(InstantModel::KEYWORD, &state.catalog.syncstatus_instant_model(&id).await?)
}

pub async fn enable_auto_cache(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let input: InstantModelEnableAutoCacheInput = take(body, InstantModel::KEYWORD)?;
    object(
        InstantModel::KEYWORD,
        &state.catalog.enable_auto_cache(&id, input.auto_cache).await?,
    )
}

pub async fn public_model(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(InstantModel::KEYWORD, &state.catalog.set_instant_model_public(&id, true).await?)
}

pub async fn private_model(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    object(InstantModel::KEYWORD, &state.catalog.set_instant_model_public(&id, false).await?)
}
