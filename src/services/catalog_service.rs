//! Catalog resources: LLM skus, container images, Dify skus and instant
//! models.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{
    image_status, CacheImageInput, ImageDetails, CACHED_IMAGE_STATUS_ACTIVE, HOST_TYPE_CONTAINER,
};
use crate::domain::models::{
    DifySku, DifySkuCreateInput, InstantModel, InstantModelCreateInput, InstantModelDetails,
    InstantModelImportInput, InstantModelListInput, InstantModelUpdateInput, ListOutput,
    LlmContainerType, LlmImage, LlmImageCreateInput, LlmSku, LlmSkuCreateInput, LlmSkuUpdateInput,
    MountedByLlmInfo, PortMappingSpec, Resource, ResourceBase, ResourceListInput, TaskRecord,
    VolumeSpec,
};
use crate::domain::ports::{ResourceFilter, ResourceRepository};
use crate::services::context::AppContext;
use crate::services::task_manager::{TaskHandler, TaskManager};
use crate::services::tasks::{InstantModelImportTask, OBJ_INSTANT_MODEL};

/// Status of an instant model that has no image yet.
pub const INSTANT_MODEL_STATUS_INIT: &str = "init";
pub const INSTANT_MODEL_STATUS_IMPORTING: &str = "importing";
pub const INSTANT_MODEL_STATUS_IMPORT_FAILED: &str = "import_failed";

const PROP_INTERNAL_PATH_MAP: &str = "internal_path_map";
const PROP_USED_BY_POST_OVERLAY: &str = "used_by_post_overlay";

/// Active catalog entry for `model_id`, preferring the given tag and the
/// newest entry otherwise.
pub async fn find_instant_model(
    app: &AppContext,
    model_id: &str,
    tag: &str,
    enabled_only: bool,
) -> DomainResult<Option<InstantModel>> {
    let mut filter = ResourceFilter::new()
        .eq("model_id", model_id)
        .status(image_status::ACTIVE)
        .newest_first();
    if enabled_only {
        filter = filter.eq("enabled", true);
    }
    let mut models = app.repos.instant_models.list(&filter).await?;
    if models.is_empty() {
        return Ok(None);
    }
    let idx = if tag.is_empty() {
        0
    } else {
        models.iter().position(|m| m.model_tag == tag).unwrap_or(0)
    };
    Ok(Some(models.swap_remove(idx)))
}

fn parse_llm_type(s: &str) -> DomainResult<LlmContainerType> {
    LlmContainerType::from_str(s).ok_or_else(|| DomainError::Validation(format!("invalid llm_type {s}")))
}

fn validate_shape(cpu: i64, memory_mb: i64, volumes: &[VolumeSpec], ports: &[PortMappingSpec]) -> DomainResult<()> {
    if cpu <= 0 || memory_mb <= 0 {
        return Err(DomainError::Validation("cpu and memory_mb must be positive".into()));
    }
    if volumes.is_empty() || volumes.iter().any(|v| v.size_mb <= 0) {
        return Err(DomainError::Validation("at least one volume with a positive size is required".into()));
    }
    for pm in ports {
        if !(1..=65535).contains(&pm.container_port) {
            return Err(DomainError::Validation(format!("invalid container port {}", pm.container_port)));
        }
        if !matches!(pm.protocol.as_str(), "tcp" | "udp") {
            return Err(DomainError::Validation(format!("invalid protocol {}", pm.protocol)));
        }
    }
    Ok(())
}

async fn list_page<T: Resource>(
    repo: &dyn ResourceRepository<T>,
    filter: ResourceFilter,
    limit: Option<i64>,
    offset: Option<i64>,
) -> DomainResult<ListOutput<T>> {
    let total = repo.count(&filter).await?;
    let data = repo.list(&filter.page(limit, offset)).await?;
    Ok(ListOutput {
        data,
        total,
        limit: limit.unwrap_or(0),
        offset: offset.unwrap_or(0),
    })
}

fn name_filter(input: &ResourceListInput) -> ResourceFilter {
    let filter = ResourceFilter::new().newest_first();
    match input.name.as_deref() {
        Some(name) if !name.is_empty() => filter.name(name),
        _ => filter,
    }
}

/// Tell the image service where each package path lands in a container.
async fn sync_image_path_map(app: &AppContext, model: &InstantModel) -> DomainResult<()> {
    if model.image_id.is_empty() {
        return Ok(());
    }
    let Some(driver) = app.drivers.get(model.llm_type) else {
        return Ok(());
    };
    let paths = driver.image_internal_path_mounts(model);
    if paths.is_empty() {
        return Ok(());
    }
    let mut properties = BTreeMap::new();
    properties.insert(PROP_INTERNAL_PATH_MAP.to_string(), serde_json::to_string(&paths)?);
    properties.insert(PROP_USED_BY_POST_OVERLAY.to_string(), "true".to_string());
    app.images
        .update_image_properties(&model.image_id, properties)
        .await
        .map_err(|e| e.context(format!("update properties of image {}", model.image_id)))
}

/// Copy status and size of the backing image onto the model.
pub async fn sync_image_status(app: &AppContext, model: &mut InstantModel) -> DomainResult<()> {
    let Some(image) = app.images.get_image(&model.image_id).await? else {
        model.set_status(image_status::DELETED);
        app.repos.instant_models.update(model).await?;
        return Ok(());
    };
    model.set_status(&image.status);
    if image.status == image_status::ACTIVE {
        model.size = image.size;
        model.actual_size_mb = image.min_disk;
    }
    app.repos.instant_models.update(model).await?;
    sync_image_path_map(app, model).await
}

/// Placeholder name of an imported model, e.g. `tmp-instant-model-250714.3f9a1c`.
fn import_model_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("tmp-instant-model-{}.{}", Utc::now().format("%y%m%d"), &suffix[..6])
}

pub struct CatalogService {
    app: Arc<AppContext>,
    tasks: TaskManager,
}

impl CatalogService {
    pub fn new(tasks: TaskManager) -> Self {
        Self {
            app: tasks.app().clone(),
            tasks,
        }
    }

    // LLM images

    pub async fn create_llm_image(&self, input: LlmImageCreateInput) -> DomainResult<LlmImage> {
        if input.name.is_empty() || input.image_name.is_empty() {
            return Err(DomainError::Validation("name and image_name are required".into()));
        }
        let llm_type = parse_llm_type(&input.llm_type)?;
        let mut base = ResourceBase::new(input.name, "ready");
        base.description = input.description;
        let image = LlmImage {
            base,
            image_name: input.image_name,
            image_label: input.image_label,
            credential_id: input.credential_id,
            llm_type,
        };
        self.app.repos.llm_images.insert(&image).await?;
        info!(image_id = %image.base.id, image = %image.image_ref(), "llm image created");
        Ok(image)
    }

    pub async fn get_llm_image(&self, ident: &str) -> DomainResult<LlmImage> {
        self.app.repos.llm_images.fetch_by_id_or_name(ident).await
    }

    pub async fn list_llm_images(&self, input: &ResourceListInput) -> DomainResult<ListOutput<LlmImage>> {
        list_page(self.app.repos.llm_images.as_ref(), name_filter(input), input.limit, input.offset).await
    }

    pub async fn delete_llm_image(&self, ident: &str) -> DomainResult<()> {
        let image = self.get_llm_image(ident).await?;
        let filter = ResourceFilter::new().eq("llm_image_id", image.base.id.as_str());
        if self.app.repos.llm_skus.count(&filter).await? > 0 {
            return Err(DomainError::InvalidStatus(format!("llm image {} is used by skus", image.base.name)));
        }
        self.app.repos.llm_images.delete(&image.base.id).await
    }

    // LLM skus

    async fn validate_mounted_models(&self, names: &[String]) -> DomainResult<()> {
        let enabled = self
            .app
            .repos
            .instant_models
            .list(&ResourceFilter::new().eq("enabled", true))
            .await?;
        let missing: Vec<&str> = names
            .iter()
            .filter(|name| !enabled.iter().any(|m| &m.full_name() == *name))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::not_found("instant_model", missing.join(", ")))
        }
    }

    pub async fn create_llm_sku(&self, input: LlmSkuCreateInput) -> DomainResult<LlmSku> {
        if input.name.is_empty() {
            return Err(DomainError::Validation("name is required".into()));
        }
        let llm_type = parse_llm_type(&input.llm_type)?;
        if !llm_type.is_llm_container_type() {
            return Err(DomainError::Validation(format!("{} does not serve models", llm_type.as_str())));
        }
        validate_shape(input.cpu, input.memory_mb, &input.volumes, &input.port_mappings)?;
        let image = self
            .app
            .repos
            .llm_images
            .fetch_by_id_or_name(&input.llm_image_id)
            .await
            .map_err(|e| e.context("fetch llm image"))?;
        if image.llm_type != llm_type {
            return Err(DomainError::Validation(format!(
                "image {} is {}, not {}",
                image.base.name,
                image.llm_type.as_str(),
                llm_type.as_str()
            )));
        }
        self.validate_mounted_models(&input.mounted_models).await?;

        let mut base = ResourceBase::new(input.name, "ready");
        base.description = input.description;
        let sku = LlmSku {
            base,
            cpu: input.cpu,
            memory_mb: input.memory_mb,
            volumes: input.volumes,
            port_mappings: input.port_mappings,
            devices: input.devices,
            envs: input.envs,
            bandwidth_mb: input.bandwidth_mb,
            llm_type,
            llm_image_id: image.base.id,
            llm_model_name: input.llm_model_name,
            mounted_models: input.mounted_models,
        };
        self.app.repos.llm_skus.insert(&sku).await?;
        info!(sku_id = %sku.base.id, name = %sku.base.name, "llm sku created");
        Ok(sku)
    }

    pub async fn update_llm_sku(&self, ident: &str, input: LlmSkuUpdateInput) -> DomainResult<LlmSku> {
        let mut sku = self.get_llm_sku(ident).await?;
        if let Some(name) = input.name.filter(|n| !n.is_empty()) {
            sku.base.name = name;
        }
        if let Some(description) = input.description {
            sku.base.description = description;
        }
        if let Some(cpu) = input.cpu {
            sku.cpu = cpu;
        }
        if let Some(memory_mb) = input.memory_mb {
            sku.memory_mb = memory_mb;
        }
        if let Some(bandwidth_mb) = input.bandwidth_mb {
            sku.bandwidth_mb = bandwidth_mb;
        }
        if let Some(model) = input.llm_model_name {
            sku.llm_model_name = model;
        }
        if let Some(mounted) = input.mounted_models {
            self.validate_mounted_models(&mounted).await?;
            sku.mounted_models = mounted;
        }
        validate_shape(sku.cpu, sku.memory_mb, &sku.volumes, &sku.port_mappings)?;
        sku.base.touch();
        self.app.repos.llm_skus.update(&sku).await?;
        Ok(sku)
    }

    pub async fn get_llm_sku(&self, ident: &str) -> DomainResult<LlmSku> {
        self.app.repos.llm_skus.fetch_by_id_or_name(ident).await
    }

    pub async fn list_llm_skus(&self, input: &ResourceListInput) -> DomainResult<ListOutput<LlmSku>> {
        list_page(self.app.repos.llm_skus.as_ref(), name_filter(input), input.limit, input.offset).await
    }

    pub async fn delete_llm_sku(&self, ident: &str) -> DomainResult<()> {
        let sku = self.get_llm_sku(ident).await?;
        let filter = ResourceFilter::new().eq("llm_sku_id", sku.base.id.as_str());
        if self.app.repos.llms.count(&filter).await? > 0 {
            return Err(DomainError::InvalidStatus(format!("llm sku {} is used by llms", sku.base.name)));
        }
        self.app.repos.llm_skus.delete(&sku.base.id).await
    }

    // Dify skus

    pub async fn create_dify_sku(&self, input: DifySkuCreateInput) -> DomainResult<DifySku> {
        if input.name.is_empty() {
            return Err(DomainError::Validation("name is required".into()));
        }
        validate_shape(input.cpu, input.memory_mb, &input.volumes, &input.port_mappings)?;
        let mut images = input.images;
        for (component, image_id) in [
            ("postgres", &mut images.postgres_image_id),
            ("redis", &mut images.redis_image_id),
            ("nginx", &mut images.nginx_image_id),
            ("api", &mut images.dify_api_image_id),
            ("plugin", &mut images.dify_plugin_image_id),
            ("web", &mut images.dify_web_image_id),
            ("sandbox", &mut images.dify_sandbox_image_id),
            ("ssrf", &mut images.dify_ssrf_image_id),
        ] {
            if image_id.is_empty() {
                return Err(DomainError::Validation(format!("{component} image is required")));
            }
            let image = self
                .app
                .repos
                .llm_images
                .fetch_by_id_or_name(image_id)
                .await
                .map_err(|e| e.context(format!("{component} image")))?;
            *image_id = image.base.id;
        }
        let mut base = ResourceBase::new(input.name, "ready");
        base.description = input.description;
        let sku = DifySku {
            base,
            cpu: input.cpu,
            memory_mb: input.memory_mb,
            volumes: input.volumes,
            port_mappings: input.port_mappings,
            envs: input.envs,
            bandwidth_mb: input.bandwidth_mb,
            images,
        };
        self.app.repos.dify_skus.insert(&sku).await?;
        info!(sku_id = %sku.base.id, name = %sku.base.name, "dify sku created");
        Ok(sku)
    }

    pub async fn get_dify_sku(&self, ident: &str) -> DomainResult<DifySku> {
        self.app.repos.dify_skus.fetch_by_id_or_name(ident).await
    }

    pub async fn list_dify_skus(&self, input: &ResourceListInput) -> DomainResult<ListOutput<DifySku>> {
        list_page(self.app.repos.dify_skus.as_ref(), name_filter(input), input.limit, input.offset).await
    }

    pub async fn delete_dify_sku(&self, ident: &str) -> DomainResult<()> {
        let sku = self.get_dify_sku(ident).await?;
        let filter = ResourceFilter::new().eq("dify_sku_id", sku.base.id.as_str());
        if self.app.repos.difys.count(&filter).await? > 0 {
            return Err(DomainError::InvalidStatus(format!("dify sku {} is used by difys", sku.base.name)));
        }
        self.app.repos.dify_skus.delete(&sku.base.id).await
    }

    // Instant models

    /// The image a model is built from: it must exist, be a `tgz` package
    /// and not back another model.
    async fn model_image(&self, image_id: &str, model_id: Option<&str>) -> DomainResult<ImageDetails> {
        let image = self
            .app
            .images
            .get_image(image_id)
            .await?
            .ok_or_else(|| DomainError::not_found("image", image_id))?;
        if image.disk_format != image_status::DISK_FORMAT_TGZ {
            return Err(DomainError::Validation(format!(
                "cannot use image of format {} as a model package",
                image.disk_format
            )));
        }
        let users = self
            .app
            .repos
            .instant_models
            .list(&ResourceFilter::new().eq("image_id", image.id.as_str()))
            .await?;
        if users.iter().any(|m| Some(m.base.id.as_str()) != model_id) {
            return Err(DomainError::Conflict(format!("image {image_id} has been used by other model")));
        }
        Ok(image)
    }

    pub async fn create_instant_model(&self, input: InstantModelCreateInput) -> DomainResult<InstantModel> {
        if input.name.is_empty() || input.model_name.is_empty() || input.model_tag.is_empty() {
            return Err(DomainError::Validation("name, model_name and model_tag are required".into()));
        }
        let llm_type = parse_llm_type(&input.llm_type)?;
        let mut base = ResourceBase::new(input.name, INSTANT_MODEL_STATUS_INIT);
        base.description = input.description;
        let mut model = InstantModel {
            base,
            llm_type,
            model_id: input.model_id,
            model_name: input.model_name,
            model_tag: input.model_tag,
            image_id: String::new(),
            mounts: Vec::new(),
            size: 0,
            actual_size_mb: 0,
            enabled: false,
            auto_cache: false,
        };
        if !input.image_id.is_empty() {
            let image = self.model_image(&input.image_id, None).await?;
            model.image_id = image.id;
            model.size = image.size;
            model.actual_size_mb = image.min_disk;
            model.base.status = image.status;
        }
        if !input.mounts.is_empty() {
            let driver = self.app.drivers.get_or_err(llm_type)?;
            model.mounts = driver.validate_mounts(&input.mounts, &model.model_name, &model.model_tag)?;
        }
        let import = model.image_id.is_empty() && !input.do_not_import;
        if import {
            model.base.status = INSTANT_MODEL_STATUS_IMPORTING.to_string();
        }
        self.app.repos.instant_models.insert(&model).await?;
        sync_image_path_map(&self.app, &model).await?;
        info!(model_id = %model.base.id, name = %model.full_name(), "instant model created");
        if import {
            self.start_import(&mut model).await?;
        }
        Ok(model)
    }

    /// Create a placeholder model and import `model_name:model_tag` into it
    /// from the model registry.
    pub async fn import_instant_model(&self, input: InstantModelImportInput) -> DomainResult<(InstantModel, TaskRecord)> {
        if input.model_name.is_empty() || input.model_tag.is_empty() {
            return Err(DomainError::Validation("model_name and model_tag are required".into()));
        }
        let llm_type = parse_llm_type(&input.llm_type)?;
        self.app.drivers.get_or_err(llm_type)?;

        let mut base = ResourceBase::new(import_model_name(), INSTANT_MODEL_STATUS_IMPORTING);
        base.project_id = input.project_id;
        let mut model = InstantModel {
            base,
            llm_type,
            model_id: String::new(),
            model_name: input.model_name,
            model_tag: input.model_tag,
            image_id: String::new(),
            mounts: Vec::new(),
            size: 0,
            actual_size_mb: 0,
            enabled: false,
            auto_cache: false,
        };
        self.app.repos.instant_models.insert(&model).await?;
        let task = self.start_import(&mut model).await?;
        Ok((model, task))
    }

    async fn start_import(&self, model: &mut InstantModel) -> DomainResult<TaskRecord> {
        let params = serde_json::to_value(InstantModelImportInput {
            llm_type: model.llm_type.as_str().to_string(),
            model_name: model.model_name.clone(),
            model_tag: model.model_tag.clone(),
            project_id: model.base.project_id.clone(),
        })?;
        let started = self
            .tasks
            .start_task(
                InstantModelImportTask.name(),
                OBJ_INSTANT_MODEL,
                &model.base.id,
                &model.base.name,
                params,
                None,
            )
            .await;
        match started {
            Ok(task) => {
                info!(model_id = %model.base.id, task_id = %task.id, "instant model import started");
                Ok(task)
            }
            Err(err) => {
                model.set_status(INSTANT_MODEL_STATUS_IMPORT_FAILED);
                self.app.repos.instant_models.update(model).await?;
                Err(err)
            }
        }
    }

    /// Move a model and its image to another project.
    pub async fn change_owner(&self, ident: &str, project_id: &str) -> DomainResult<InstantModel> {
        if project_id.is_empty() {
            return Err(DomainError::Validation("project_id is required".into()));
        }
        let mut model = self.get_instant_model(ident).await?;
        if !model.image_id.is_empty() {
            self.app
                .images
                .perform_image_action(&model.image_id, "change-owner", json!({ "project_id": project_id }))
                .await
                .map_err(|e| e.context("image change-owner"))?;
        }
        model.base.project_id = project_id.to_string();
        model.base.touch();
        self.app.repos.instant_models.update(&model).await?;
        Ok(model)
    }

    pub async fn update_instant_model(&self, ident: &str, input: InstantModelUpdateInput) -> DomainResult<InstantModel> {
        let mut model = self.get_instant_model(ident).await?;
        if model.enabled {
            return Err(DomainError::InvalidStatus("cannot update when enabled".into()));
        }
        if let Some(name) = input.name.filter(|n| !n.is_empty()) {
            model.base.name = name;
        }
        if let Some(description) = input.description {
            model.base.description = description;
        }
        if let Some(image_id) = input.image_id.filter(|i| !i.is_empty()) {
            let image = self.model_image(&image_id, Some(&model.base.id)).await?;
            model.image_id = image.id;
            model.size = image.size;
            model.actual_size_mb = image.min_disk;
        }
        if let Some(mounts) = input.mounts.filter(|m| !m.is_empty()) {
            let driver = self.app.drivers.get_or_err(model.llm_type)?;
            model.mounts = driver.validate_mounts(&mounts, &model.model_name, &model.model_tag)?;
            if model.mounts.is_empty() {
                return Err(DomainError::Validation("empty mounts".into()));
            }
        }
        model.base.touch();
        self.app.repos.instant_models.update(&model).await?;
        sync_image_path_map(&self.app, &model).await?;
        Ok(model)
    }

    pub async fn get_instant_model(&self, ident: &str) -> DomainResult<InstantModel> {
        self.app.repos.instant_models.fetch_by_id_or_name(ident).await
    }

    pub async fn list_instant_models(&self, input: &InstantModelListInput) -> DomainResult<ListOutput<InstantModel>> {
        let mut filter = ResourceFilter::new().newest_first();
        for (field, values) in [
            ("model_name", &input.model_name),
            ("model_tag", &input.model_tag),
            ("model_id", &input.model_id),
        ] {
            if !values.is_empty() {
                filter = filter.in_values(field, values.clone());
            }
        }
        if let Some(llm_type) = input.llm_type.as_deref() {
            filter = filter.eq("llm_type", parse_llm_type(llm_type)?.as_str());
        }
        if let Some(enabled) = input.enabled {
            filter = filter.eq("enabled", enabled);
        }
        if let Some(auto_cache) = input.auto_cache {
            filter = filter.eq("auto_cache", auto_cache);
        }
        list_page(self.app.repos.instant_models.as_ref(), filter, input.limit, input.offset).await
    }

    /// Image name, storage cache counts and the LLMs holding each model.
    pub async fn instant_model_details(&self, models: Vec<InstantModel>) -> DomainResult<Vec<InstantModelDetails>> {
        let image_ids: Vec<String> = models
            .iter()
            .filter(|m| !m.image_id.is_empty())
            .map(|m| m.image_id.clone())
            .collect();

        let mut image_names = HashMap::new();
        for id in &image_ids {
            match self.app.images.get_image(id).await {
                Ok(Some(image)) => {
                    image_names.insert(id.clone(), image.name);
                }
                Ok(None) => {}
                Err(err) => warn!(image_id = %id, error = %err, "fetch image failed"),
            }
        }

        let mut cache_counts: HashMap<String, (i64, i64)> = HashMap::new();
        if !image_ids.is_empty() {
            match self.app.compute.list_storage_cached_images(&image_ids).await {
                Ok(cached) => {
                    for copy in cached {
                        let entry = cache_counts.entry(copy.cachedimage_id).or_default();
                        entry.0 += 1;
                        if copy.status == CACHED_IMAGE_STATUS_ACTIVE {
                            entry.1 += 1;
                        }
                    }
                }
                Err(err) => warn!(error = %err, "list storage cached images failed"),
            }
        }

        let model_ids: Vec<String> = models.iter().map(|m| m.model_id.clone()).collect();
        let rows = self
            .app
            .repos
            .llm_instant_models
            .list(&ResourceFilter::new().in_values("model_id", model_ids))
            .await?;
        let mut mounted_by: HashMap<String, Vec<MountedByLlmInfo>> = HashMap::new();
        let mut llm_names = HashMap::new();
        for row in rows {
            if !llm_names.contains_key(&row.llm_id) {
                let name = self.app.repos.llms.get(&row.llm_id).await?.map(|l| l.base.name);
                llm_names.insert(row.llm_id.clone(), name);
            }
            if let Some(Some(name)) = llm_names.get(&row.llm_id) {
                mounted_by.entry(row.model_id).or_default().push(MountedByLlmInfo {
                    llm_id: row.llm_id,
                    llm_name: name.clone(),
                });
            }
        }

        Ok(models
            .into_iter()
            .map(|model| {
                let (cache_count, cached_count) = cache_counts.get(&model.image_id).copied().unwrap_or_default();
                InstantModelDetails {
                    image: image_names.get(&model.image_id).cloned().unwrap_or_default(),
                    cache_count,
                    cached_count,
                    mounted_by_llms: mounted_by.get(&model.model_id).cloned().unwrap_or_default(),
                    model,
                }
            })
            .collect())
    }

    pub async fn show_instant_model(&self, ident: &str) -> DomainResult<InstantModelDetails> {
        let model = self.get_instant_model(ident).await?;
        let mut rows = self.instant_model_details(vec![model]).await?;
        rows.pop().ok_or_else(|| DomainError::not_found("instant_model", ident))
    }

    pub async fn syncstatus_instant_model(&self, ident: &str) -> DomainResult<InstantModel> {
        let mut model = self.get_instant_model(ident).await?;
        sync_image_status(&self.app, &mut model).await?;
        Ok(model)
    }

    pub async fn enable_instant_model(&self, ident: &str) -> DomainResult<InstantModel> {
        let mut model = self.get_instant_model(ident).await?;
        if model.image_id.is_empty() {
            return Err(DomainError::InvalidStatus("empty image_id".into()));
        }
        if model.mounts.is_empty() {
            return Err(DomainError::InvalidStatus("empty mounts".into()));
        }
        sync_image_status(&self.app, &mut model).await?;
        if model.base.status != image_status::ACTIVE {
            return Err(DomainError::InvalidStatus(format!(
                "cannot enable model of status {}",
                model.base.status
            )));
        }
        if let Some(existing) = find_instant_model(&self.app, &model.model_id, &model.model_tag, true).await? {
            if existing.base.id != model.base.id && existing.model_tag == model.model_tag {
                return Err(DomainError::duplicate(
                    "instant_model",
                    format!("model {} tag {} has been enabled", model.model_id, model.model_tag),
                ));
            }
        }
        model.enabled = true;
        model.base.touch();
        self.app.repos.instant_models.update(&model).await?;
        info!(model_id = %model.base.id, "instant model enabled");
        Ok(model)
    }

    pub async fn disable_instant_model(&self, ident: &str) -> DomainResult<InstantModel> {
        let mut model = self.get_instant_model(ident).await?;
        model.enabled = false;
        model.auto_cache = false;
        model.base.touch();
        self.app.repos.instant_models.update(&model).await?;
        Ok(model)
    }

    pub async fn enable_auto_cache(&self, ident: &str, auto_cache: bool) -> DomainResult<InstantModel> {
        let mut model = self.get_instant_model(ident).await?;
        if auto_cache && !model.enabled {
            return Err(DomainError::InvalidStatus("cannot enable auto_cache for a disabled model".into()));
        }
        model.auto_cache = auto_cache;
        model.base.touch();
        self.app.repos.instant_models.update(&model).await?;
        if auto_cache {
            let input = CacheImageInput {
                image_id: model.image_id.clone(),
                auto_cache: true,
                host_type: vec![HOST_TYPE_CONTAINER.to_string()],
            };
            self.app
                .compute
                .cache_image(&input)
                .await
                .map_err(|e| e.context("cache image"))?;
        }
        Ok(model)
    }

    /// Share or unshare a model together with its image.
    pub async fn set_instant_model_public(&self, ident: &str, public: bool) -> DomainResult<InstantModel> {
        let mut model = self.get_instant_model(ident).await?;
        if !model.image_id.is_empty() {
            let action = if public { "public" } else { "private" };
            self.app
                .images
                .perform_image_action(&model.image_id, action, json!({}))
                .await
                .map_err(|e| e.context(format!("image {action}")))?;
        }
        model.base.is_public = public;
        model.base.touch();
        self.app.repos.instant_models.update(&model).await?;
        Ok(model)
    }

    /// An enabled model that a sku premounts or a volume holds cannot go.
    pub async fn delete_instant_model(&self, ident: &str) -> DomainResult<()> {
        let model = self.get_instant_model(ident).await?;
        if model.enabled {
            let full_name = model.full_name();
            let skus = self.app.repos.llm_skus.list(&ResourceFilter::new()).await?;
            let volumes = self.app.repos.volumes.list(&ResourceFilter::new()).await?;
            let used = skus.iter().any(|s| s.mounted_models.contains(&full_name))
                || volumes.iter().any(|v| v.mounted_models.contains(&full_name));
            if used {
                return Err(DomainError::InvalidStatus(
                    "cannot delete when model is used by other resources".into(),
                ));
            }
        }
        self.app.repos.instant_models.delete(&model.base.id).await
    }
}
