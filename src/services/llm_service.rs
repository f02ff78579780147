//! LLM operations exposed through the API: create, list, power actions,
//! model installs and lookups.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{
    NetworkQuery, ServerDetails, DEFAULT_VPC_ID, NETWORK_STATUS_AVAILABLE,
    NETWORK_TYPE_GUEST, NETWORK_TYPE_HOSTLOCAL,
};
use crate::domain::models::{
    AvailableNetworkOutput, ListOutput, Llm, LlmAccessUrl, LlmBatchPerformOutput,
    LlmCreateInput, LlmInstantModel, LlmListDetails, LlmListInput, LlmPerformOutput,
    LlmPerformQuickModelsInput, LlmSku, LlmStatus, LlmSyncModelTaskInput, LlmUpdateInput, ModelInfo,
    QuickModelMethod, Resource, ResourceBase, TaskRecord,
};
use crate::domain::ports::ResourceFilter;
use crate::services::catalog_service::find_instant_model;
use crate::services::context::AppContext;
use crate::services::instant_model_sync::{
    fetch_models, installed_size_gb, mounted_model_full_names, refresh_instant_models,
};
use crate::services::llm_runtime::{llm_url, pod_status, set_llm_status};
use crate::services::task_manager::{TaskHandler, TaskManager};
use crate::services::tasks::{
    LlmBatchCreateTask, LlmCreateTask, LlmDeleteTask, LlmInstantModelsSyncTask, LlmPullModelTask,
    LlmStartTask, LlmStopTask, LlmSyncStatusTask, OBJ_LLM,
};

/// Servers are looked up in pages of this size.
const SERVER_PAGE_SIZE: usize = 1000;

pub struct LlmService {
    tasks: TaskManager,
}

impl LlmService {
    pub fn new(tasks: TaskManager) -> Self {
        Self { tasks }
    }

    fn app(&self) -> &Arc<AppContext> {
        self.tasks.app()
    }

    pub async fn get(&self, ident: &str) -> DomainResult<Llm> {
        self.app().repos.llms.fetch_by_id_or_name(ident).await
    }

    /// Resolve the sku, copy its image and fill defaults.
    pub async fn validate_create(&self, mut input: LlmCreateInput) -> DomainResult<(LlmCreateInput, LlmSku)> {
        let app = self.app();
        let sku = app
            .repos
            .llm_skus
            .fetch_by_id_or_name(&input.llm_sku_id)
            .await
            .map_err(|e| e.context("fetch llm sku"))?;
        let image = app
            .repos
            .llm_images
            .fetch(&sku.llm_image_id)
            .await
            .map_err(|e| e.context(format!("image of llm sku {}", sku.base.name)))?;
        if image.llm_type != sku.llm_type {
            return Err(DomainError::Validation(format!(
                "image {} is {}, sku {} is {}",
                image.base.name,
                image.llm_type.as_str(),
                sku.base.name,
                sku.llm_type.as_str()
            )));
        }
        if !matches!(input.network_type.as_str(), "" | NETWORK_TYPE_HOSTLOCAL | NETWORK_TYPE_GUEST) {
            return Err(DomainError::Validation(format!("unsupported network type {}", input.network_type)));
        }
        if input.bandwidth_mb < 0 || input.instant_model_quota_gb < 0 {
            return Err(DomainError::Validation("bandwidth and quota must not be negative".into()));
        }
        if input.bandwidth_mb == 0 {
            input.bandwidth_mb = sku.bandwidth_mb;
        }
        if input.name.is_empty() {
            let suffix = Uuid::new_v4().simple().to_string();
            input.name = format!("{}-{}", sku.base.name, &suffix[..8]);
        }
        input.llm_sku_id.clone_from(&sku.base.id);
        input.llm_image_id.clone_from(&sku.llm_image_id);
        Ok((input, sku))
    }

    /// Insert the LLMs and start provisioning. More than one instance is
    /// driven by a batch task whose children create each LLM.
    pub async fn create(&self, input: LlmCreateInput) -> DomainResult<(Vec<Llm>, TaskRecord)> {
        let (input, sku) = self.validate_create(input).await?;
        let count = input.count.unwrap_or(1).max(1);
        let mut llms = Vec::new();
        for idx in 0..count {
            let name = if count > 1 {
                format!("{}-{}", input.name, idx + 1)
            } else {
                input.name.clone()
            };
            let mut base = ResourceBase::new(name, LlmStatus::Creating.as_str());
            base.project_id.clone_from(&input.project_id);
            base.description.clone_from(&input.description);
            let llm = Llm {
                base,
                llm_sku_id: input.llm_sku_id.clone(),
                llm_image_id: input.llm_image_id.clone(),
                llm_type: sku.llm_type,
                svr_id: String::new(),
                network_type: input.network_type.clone(),
                network_id: input.network_id.clone(),
                bandwidth_mb: input.bandwidth_mb,
                instant_model_quota_gb: input.instant_model_quota_gb,
                prefer_host: input.prefer_host.clone(),
                last_instant_model_probe: None,
            };
            self.app().repos.llms.insert(&llm).await?;
            llms.push(llm);
        }

        let task = if let [llm] = llms.as_slice() {
            self.tasks
                .start_task(LlmCreateTask.name(), OBJ_LLM, llm.id(), llm.name(), json!({}), None)
                .await
        } else {
            let ids: Vec<&str> = llms.iter().map(Resource::id).collect();
            // Each batch locks its own object key.
            let batch_id = format!("batch-{}", Uuid::new_v4());
            self.tasks
                .start_task(LlmBatchCreateTask.name(), OBJ_LLM, &batch_id, &input.name, json!({ "llm_ids": ids }), None)
                .await
        };
        let task = match task {
            Ok(task) => task,
            Err(err) => {
                for llm in &llms {
                    set_llm_status(self.app(), llm.id(), LlmStatus::CreateFail).await?;
                }
                return Err(err.context("start create task"));
            }
        };
        info!(count, sku = %sku.base.name, task_id = %task.id, "llm create accepted");
        Ok((llms, task))
    }

    pub async fn list(&self, input: &LlmListInput) -> DomainResult<ListOutput<LlmListDetails>> {
        let app = self.app();
        let mut filter = ResourceFilter::new().newest_first();
        if let Some(sku) = input.llm_sku.as_deref().filter(|s| !s.is_empty()) {
            let sku = app
                .repos
                .llm_skus
                .fetch_by_id_or_name(sku)
                .await
                .map_err(|e| e.context("filter by llm sku"))?;
            filter = filter.eq("llm_sku_id", sku.base.id);
        }
        if let Some(image) = input.llm_image.as_deref().filter(|s| !s.is_empty()) {
            let image = app
                .repos
                .llm_images
                .fetch_by_id_or_name(image)
                .await
                .map_err(|e| e.context("filter by llm image"))?;
            filter = filter.eq("llm_image_id", image.base.id);
        }
        if let Some(status) = input.status.as_deref().filter(|s| !s.is_empty()) {
            filter = filter.status(status);
        }
        if let Some(name) = input.name.as_deref().filter(|s| !s.is_empty()) {
            filter = filter.name(name);
        }
        let total = app.repos.llms.count(&filter).await?;
        let filter = filter.page(input.limit, input.offset);
        let llms = app.repos.llms.list(&filter).await?;
        let data = if input.details {
            self.details(llms).await?
        } else {
            llms.into_iter().map(LlmListDetails::new).collect()
        };
        Ok(ListOutput {
            data,
            total,
            limit: input.limit.unwrap_or(0),
            offset: input.offset.unwrap_or(0),
        })
    }

    pub async fn show(&self, ident: &str) -> DomainResult<LlmListDetails> {
        let llm = self.get(ident).await?;
        let mut rows = self.details(vec![llm]).await?;
        rows.pop().ok_or_else(|| DomainError::not_found("llm", ident))
    }

    /// Enrich LLM rows with sku, image, volume, network and pod data.
    /// Remote lookups that fail are logged and leave the fields empty.
    pub async fn details(&self, llms: Vec<Llm>) -> DomainResult<Vec<LlmListDetails>> {
        if llms.is_empty() {
            return Ok(Vec::new());
        }
        let app = self.app();
        let mut skus: HashMap<String, Option<LlmSku>> = HashMap::new();
        let mut images = HashMap::new();
        let mut networks = HashMap::new();
        for llm in &llms {
            if !skus.contains_key(&llm.llm_sku_id) {
                skus.insert(llm.llm_sku_id.clone(), app.repos.llm_skus.get(&llm.llm_sku_id).await?);
            }
            if !images.contains_key(&llm.llm_image_id) {
                images.insert(llm.llm_image_id.clone(), app.repos.llm_images.get(&llm.llm_image_id).await?);
            }
            if !llm.network_id.is_empty() && !networks.contains_key(&llm.network_id) {
                match app.compute.get_network(&llm.network_id).await {
                    Ok(net) => {
                        networks.insert(llm.network_id.clone(), net);
                    }
                    Err(err) => warn!(network_id = %llm.network_id, error = %err, "fetch network failed"),
                }
            }
        }

        let ids: Vec<String> = llms.iter().map(|l| l.base.id.clone()).collect();
        let volumes = app
            .repos
            .volumes
            .list(&ResourceFilter::new().in_values("llm_id", ids))
            .await?;
        let servers = self.fetch_servers(&llms).await;

        let mut rows = Vec::with_capacity(llms.len());
        for llm in llms {
            let mounted_models = mounted_model_full_names(app, llm.id()).await?;
            let mut row = LlmListDetails::new(llm);
            let llm = &row.llm;
            if let Some(Some(sku)) = skus.get(&llm.llm_sku_id) {
                row.llm_sku.clone_from(&sku.base.name);
                row.cpu = sku.cpu;
                row.memory_mb = sku.memory_mb;
                row.devices = sku
                    .devices
                    .iter()
                    .map(|d| if d.model.is_empty() { d.path.clone() } else { d.model.clone() })
                    .collect();
                if llm.bandwidth_mb == 0 {
                    row.bandwidth_mb = sku.bandwidth_mb;
                }
            }
            if let Some(Some(image)) = images.get(&llm.llm_image_id) {
                row.llm_image.clone_from(&image.base.name);
                row.llm_image_label.clone_from(&image.image_label);
            }
            if let Some(volume) = volumes.iter().find(|v| v.llm_id == llm.base.id) {
                row.volume.clone_from(&volume.base.name);
                row.volume_used_mb = volume.size_mb;
            }
            if let Some(Some(net)) = networks.get(&llm.network_id) {
                row.network.clone_from(&net.name);
            }
            let server = servers.get(&llm.svr_id);
            row.llm_status = pod_status(server);
            if let Some(server) = server {
                row.server.clone_from(&server.name);
                row.host.clone_from(&server.host);
                row.host_id.clone_from(&server.host_id);
                row.host_access_ip.clone_from(&server.host_access_ip);
                row.host_eip.clone_from(&server.host_eip);
                row.zone.clone_from(&server.zone);
                row.zone_id.clone_from(&server.zone_id);
                row.start_time = server.last_start_at;
            }
            row.mounted_models = mounted_models;
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_servers(&self, llms: &[Llm]) -> HashMap<String, ServerDetails> {
        let mut ids: Vec<String> = llms
            .iter()
            .filter(|l| !l.svr_id.is_empty())
            .map(|l| l.svr_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        let mut servers = HashMap::new();
        for page in ids.chunks(SERVER_PAGE_SIZE) {
            match self.app().compute.list_servers(page).await {
                Ok(found) => servers.extend(found.into_iter().map(|s| (s.id.clone(), s))),
                Err(err) => {
                    warn!(error = %err, "list servers failed");
                    break;
                }
            }
        }
        servers
    }

    pub async fn update(&self, ident: &str, input: LlmUpdateInput) -> DomainResult<Llm> {
        let mut llm = self.get(ident).await?;
        if let Some(name) = input.name {
            if name.is_empty() {
                return Err(DomainError::Validation("name must not be empty".into()));
            }
            llm.base.name = name;
        }
        if let Some(description) = input.description {
            llm.base.description = description;
        }
        if let Some(bandwidth) = input.bandwidth_mb {
            if bandwidth < 0 {
                return Err(DomainError::Validation("bandwidth must not be negative".into()));
            }
            llm.bandwidth_mb = bandwidth;
        }
        if let Some(quota) = input.instant_model_quota_gb {
            if quota < 0 {
                return Err(DomainError::Validation("instant model quota must not be negative".into()));
            }
            llm.instant_model_quota_gb = quota;
        }
        llm.base.touch();
        self.app().repos.llms.update(&llm).await?;
        Ok(llm)
    }

    async fn start_llm_task(&self, llm: &Llm, handler: &dyn TaskHandler, pending: LlmStatus) -> DomainResult<TaskRecord> {
        set_llm_status(self.app(), llm.id(), pending).await?;
        self.tasks
            .start_task(handler.name(), OBJ_LLM, llm.id(), llm.name(), json!({}), None)
            .await
    }

    pub async fn perform_start(&self, ident: &str) -> DomainResult<TaskRecord> {
        let llm = self.get(ident).await?;
        if llm.llm_status().is_running_like() {
            return Err(DomainError::InvalidStatus(format!("llm {} is {}", llm.base.id, llm.base.status)));
        }
        self.start_llm_task(&llm, &LlmStartTask, LlmStatus::StartStart).await
    }

    pub async fn perform_stop(&self, ident: &str) -> DomainResult<TaskRecord> {
        let llm = self.get(ident).await?;
        if llm.llm_status() == LlmStatus::Ready {
            return Err(DomainError::InvalidStatus(format!("llm {} is {}", llm.base.id, llm.base.status)));
        }
        self.start_llm_task(&llm, &LlmStopTask, LlmStatus::StartStop).await
    }

    pub async fn perform_syncstatus(&self, ident: &str) -> DomainResult<TaskRecord> {
        let llm = self.get(ident).await?;
        self.start_llm_task(&llm, &LlmSyncStatusTask, LlmStatus::StartSyncstatus).await
    }

    pub async fn delete(&self, ident: &str) -> DomainResult<TaskRecord> {
        let llm = self.get(ident).await?;
        self.start_llm_task(&llm, &LlmDeleteTask, LlmStatus::StartDelete).await
    }

    pub async fn perform_pull_model(&self, ident: &str, model: &str) -> DomainResult<TaskRecord> {
        if model.is_empty() {
            return Err(DomainError::Validation("model is required".into()));
        }
        let llm = self.get(ident).await?;
        if llm.llm_status() != LlmStatus::Running {
            return Err(DomainError::InvalidStatus(format!(
                "llm {} must be running to pull, it is {}",
                llm.base.id, llm.base.status
            )));
        }
        self.tasks
            .start_task(LlmPullModelTask.name(), OBJ_LLM, llm.id(), llm.name(), json!({ "model": model }), None)
            .await
    }

    /// Install, uninstall or reinstall instant models on an LLM.
    ///
    /// Every model is resolved before anything starts, and all unknown
    /// models are reported together. Installs are checked against the
    /// quota, counting what other accepted requests are still installing.
    pub async fn perform_quick_models(
        &self,
        ident: &str,
        input: LlmPerformQuickModelsInput,
    ) -> DomainResult<LlmBatchPerformOutput> {
        let app = self.app();
        let llm = self.get(ident).await?;
        let status = llm.llm_status();
        if !status.accepts_model_changes() {
            return Err(DomainError::InvalidStatus(format!(
                "llm {}({}) status {}",
                llm.base.name, llm.base.id, llm.base.status
            )));
        }
        if input.models.is_empty() {
            return Err(DomainError::Validation("no models given".into()));
        }
        let method = input.method.unwrap_or_default();

        let mut models = Vec::with_capacity(input.models.len());
        let mut missing = Vec::new();
        let mut to_install_gb = 0.0;
        for requested in &input.models {
            let found = if requested.id.is_empty() {
                find_instant_model(app, &requested.model_id, &requested.tag, true).await?
            } else {
                match app.repos.instant_models.fetch_by_id_or_name(&requested.id).await {
                    Ok(model) => Some(model),
                    Err(err) if err.is_not_found() => None,
                    Err(err) => return Err(err.context(format!("fetch instant model {}", requested.id))),
                }
            };
            let Some(model) = found else {
                missing.push(if requested.id.is_empty() {
                    requested.model_id.clone()
                } else {
                    requested.id.clone()
                });
                continue;
            };
            if method == QuickModelMethod::Install {
                to_install_gb += model.actual_size_gb();
            }
            models.push(ModelInfo {
                id: model.base.id.clone(),
                model_id: model.model_id.clone(),
                display_name: model.model_name.clone(),
                tag: model.model_tag.clone(),
            });
        }
        if !missing.is_empty() {
            return Err(DomainError::not_found("instant_model", missing.join(", ")));
        }

        let reservation = Uuid::new_v4().to_string();
        if method == QuickModelMethod::Install {
            self.reserve_quota(&reservation, &llm, to_install_gb).await?;
        }

        let params = serde_json::to_value(LlmSyncModelTaskInput {
            models,
            method,
            llm_status: status.as_str().to_string(),
        })?;
        let task = match self
            .tasks
            .new_task(LlmInstantModelsSyncTask.name(), OBJ_LLM, llm.id(), llm.name(), params, None)
            .await
        {
            Ok(task) => task,
            Err(err) => {
                app.pending_quota.remove(&reservation);
                return Err(err);
            }
        };
        app.pending_quota.rekey(&reservation, &task.id);
        self.tasks.schedule_run(&task.id);
        info!(llm_id = %llm.base.id, method = method.as_str(), task_id = %task.id, "quick models accepted");

        Ok(LlmBatchPerformOutput {
            data: vec![LlmPerformOutput {
                id: llm.base.id.clone(),
                name: llm.base.name.clone(),
                request_status: 200,
                task_id: task.id,
            }],
        })
    }

    /// Reserve quota for an install, then re-check the reservation against
    /// a second reading of the installed size.
    async fn reserve_quota(&self, reservation: &str, llm: &Llm, to_install_gb: f64) -> DomainResult<()> {
        let app = self.app();
        let quota = llm.instant_model_quota_gb;
        let installed = installed_size_gb(app, llm.id()).await?;
        app.pending_quota
            .try_reserve(reservation, llm.id(), quota, installed, to_install_gb)?;
        match installed_size_gb(app, llm.id()).await {
            Ok(installed) => app.pending_quota.confirm(reservation, llm.id(), quota, installed),
            Err(err) => {
                app.pending_quota.remove(reservation);
                Err(err)
            }
        }
    }

    pub async fn get_url(&self, ident: &str) -> DomainResult<LlmAccessUrl> {
        let llm = self.get(ident).await?;
        Ok(LlmAccessUrl {
            access_url: llm_url(self.app(), &llm).await?,
        })
    }

    /// Count auto-allocatable host-local and default-VPC guest networks.
    /// A failed lookup leaves the count out.
    pub async fn available_network(&self) -> AvailableNetworkOutput {
        let compute = &self.app().compute;
        let mut query = NetworkQuery {
            server_type: NETWORK_TYPE_HOSTLOCAL.to_string(),
            vpc_id: None,
            is_auto_alloc: true,
            status: NETWORK_STATUS_AVAILABLE.to_string(),
            limit: 1,
        };
        let mut output = AvailableNetworkOutput::default();
        match compute.list_networks(&query).await {
            Ok((_, total)) if total > 0 => output.auto_alloc_network_hostlocal_count = Some(total),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "list hostlocal networks failed"),
        }
        query.server_type = NETWORK_TYPE_GUEST.to_string();
        query.vpc_id = Some(DEFAULT_VPC_ID.to_string());
        match compute.list_networks(&query).await {
            Ok((_, total)) if total > 0 => output.auto_alloc_network_guest_count = Some(total),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "list guest networks failed"),
        }
        output
    }

    /// Reconcile the per-LLM model rows with the running server.
    pub async fn refresh_instant_models(&self, ident: &str, force: bool) -> DomainResult<Vec<LlmInstantModel>> {
        let llm = self.get(ident).await?;
        refresh_instant_models(self.app(), &llm, force).await?;
        fetch_models(self.app(), llm.id(), None, None, None).await
    }

    pub async fn instant_models(
        &self,
        ident: &str,
        probed: Option<bool>,
        mounted: Option<bool>,
        system: Option<bool>,
    ) -> DomainResult<Vec<LlmInstantModel>> {
        let llm = self.get(ident).await?;
        fetch_models(self.app(), llm.id(), probed, mounted, system).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::models::compute::NetworkDetails;
    use crate::domain::models::TaskStatus;
    use crate::domain::ports::ServedModel;
    use crate::services::tasks::all_handlers;
    use crate::test_support::{seed_instant_model, seed_llm_image, seed_llm_sku, test_env, TestEnv};

    struct Fixture {
        env: TestEnv,
        service: LlmService,
        tasks: TaskManager,
    }

    async fn fixture() -> Fixture {
        let env = test_env().await;
        let image = seed_llm_image(&env.app).await;
        seed_llm_sku(&env.app, &image).await;
        let tasks = TaskManager::new(env.app.clone(), all_handlers());
        Fixture {
            service: LlmService::new(tasks.clone()),
            tasks,
            env,
        }
    }

    fn create_input(name: &str) -> LlmCreateInput {
        LlmCreateInput {
            name: name.into(),
            llm_sku_id: "ollama-small".into(),
            ..Default::default()
        }
    }

    async fn wait(fx: &Fixture, task: &TaskRecord) -> TaskRecord {
        let task = fx.tasks.wait_task(&task.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Complete, "{:?}", task.reason);
        task
    }

    async fn running_llm(fx: &Fixture, name: &str) -> Llm {
        let (llms, task) = fx.service.create(create_input(name)).await.unwrap();
        wait(fx, &task).await;
        fx.service.get(&llms[0].base.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_validate_create_fills_defaults() {
        let fx = fixture().await;
        let (input, sku) = fx
            .service
            .validate_create(LlmCreateInput {
                llm_sku_id: "ollama-small".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(input.llm_sku_id, sku.base.id);
        assert_eq!(input.llm_image_id, sku.llm_image_id);
        assert_eq!(input.bandwidth_mb, 100);
        assert!(input.name.starts_with("ollama-small-"));
    }

    #[tokio::test]
    async fn test_create_unknown_sku() {
        let fx = fixture().await;
        let mut input = create_input("y");
        input.llm_sku_id = "missing".into();
        let err = fx.service.create(input).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_and_show_details() {
        let fx = fixture().await;
        let llm = running_llm(&fx, "llm-a").await;
        assert_eq!(llm.base.status, "running");

        let details = fx.service.show("llm-a").await.unwrap();
        assert_eq!(details.llm_sku, "ollama-small");
        assert_eq!(details.llm_image, "ollama");
        assert_eq!(details.llm_image_label, "0.5.7");
        assert_eq!(details.cpu, 4);
        assert_eq!(details.bandwidth_mb, 100);
        assert_eq!(details.volume_used_mb, 20480);
        assert_eq!(details.host_access_ip, "10.0.0.1");
        assert_eq!(details.llm_status, "running");

        let url = fx.service.get_url("llm-a").await.unwrap();
        assert_eq!(url.access_url, "http://10.0.0.1:20000");
    }

    #[tokio::test]
    async fn test_batch_create() {
        let fx = fixture().await;
        let mut input = create_input("pool");
        input.count = Some(2);
        let (llms, task) = fx.service.create(input).await.unwrap();
        assert_eq!(llms.len(), 2);
        assert_eq!(llms[0].base.name, "pool-1");
        assert_eq!(llms[1].base.name, "pool-2");
        wait(&fx, &task).await;
        for llm in &llms {
            assert_eq!(fx.service.get(&llm.base.id).await.unwrap().base.status, "running");
        }
    }

    #[tokio::test]
    async fn test_batches_lock_separate_objects() {
        let fx = fixture().await;
        let mut first = create_input("pool-a");
        first.count = Some(2);
        let mut second = create_input("pool-b");
        second.count = Some(2);

        let (_, a) = fx.service.create(first).await.unwrap();
        let (_, b) = fx.service.create(second).await.unwrap();
        assert!(a.obj_id.starts_with("batch-"), "{}", a.obj_id);
        assert_ne!(a.obj_id, b.obj_id);
        wait(&fx, &a).await;
        wait(&fx, &b).await;
    }

    #[tokio::test]
    async fn test_list_filters() {
        let fx = fixture().await;
        running_llm(&fx, "llm-a").await;

        let all = fx
            .service
            .list(&LlmListInput {
                llm_sku: Some("ollama-small".into()),
                details: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.total, 1);
        assert_eq!(all.data[0].server, "llm-a");

        let err = fx
            .service
            .list(&LlmListInput {
                llm_image: Some("nope".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let none = fx
            .service
            .list(&LlmListInput {
                status: Some("ready".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(none.total, 0);
    }

    #[tokio::test]
    async fn test_power_actions_check_status() {
        let fx = fixture().await;
        let llm = running_llm(&fx, "llm-a").await;

        let err = fx.service.perform_start(&llm.base.id).await.unwrap_err();
        assert!(err.is_invalid_status());

        let task = fx.service.perform_stop(&llm.base.id).await.unwrap();
        wait(&fx, &task).await;
        assert_eq!(fx.service.get(&llm.base.id).await.unwrap().base.status, "ready");

        let err = fx.service.perform_stop(&llm.base.id).await.unwrap_err();
        assert!(err.is_invalid_status());

        let task = fx.service.perform_start(&llm.base.id).await.unwrap();
        wait(&fx, &task).await;
        assert_eq!(fx.service.get(&llm.base.id).await.unwrap().base.status, "running");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let fx = fixture().await;
        let llm = running_llm(&fx, "llm-a").await;
        let updated = fx
            .service
            .update(
                &llm.base.id,
                LlmUpdateInput {
                    instant_model_quota_gb: Some(20),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.instant_model_quota_gb, 20);
        let err = fx
            .service
            .update(
                &llm.base.id,
                LlmUpdateInput {
                    bandwidth_mb: Some(-1),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let task = fx.service.delete(&llm.base.id).await.unwrap();
        wait(&fx, &task).await;
        assert!(fx.service.get(&llm.base.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_quick_models_rejects_busy_llm() {
        let fx = fixture().await;
        let llm = running_llm(&fx, "llm-a").await;
        set_llm_status(&fx.env.app, &llm.base.id, LlmStatus::Starting).await.unwrap();
        let input = LlmPerformQuickModelsInput {
            models: vec![ModelInfo {
                model_id: "6a0746a1ec1a".into(),
                ..Default::default()
            }],
            method: None,
        };
        let err = fx.service.perform_quick_models(&llm.base.id, input).await.unwrap_err();
        assert!(err.is_invalid_status());
    }

    #[tokio::test]
    async fn test_quick_models_reports_every_missing_model() {
        let fx = fixture().await;
        let llm = running_llm(&fx, "llm-a").await;
        let input = LlmPerformQuickModelsInput {
            models: vec![
                ModelInfo {
                    id: "no-such-id".into(),
                    ..Default::default()
                },
                ModelInfo {
                    model_id: "no-such-model".into(),
                    tag: "7b".into(),
                    ..Default::default()
                },
            ],
            method: Some(QuickModelMethod::Install),
        };
        let err = fx.service.perform_quick_models(&llm.base.id, input).await.unwrap_err();
        assert!(err.is_not_found());
        let msg = err.to_string();
        assert!(msg.contains("no-such-id") && msg.contains("no-such-model"), "{msg}");
    }

    #[tokio::test]
    async fn test_quick_models_quota_counts_pending_installs() {
        let fx = fixture().await;
        let llm = running_llm(&fx, "llm-a").await;
        fx.service
            .update(
                &llm.base.id,
                LlmUpdateInput {
                    instant_model_quota_gb: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        seed_instant_model(&fx.env.app, "llama3", "8b", "6a0746a1ec1a", 4000).await;
        fx.env.app.pending_quota.insert("other-task", &llm.base.id, 7.0);

        let input = LlmPerformQuickModelsInput {
            models: vec![ModelInfo {
                model_id: "6a0746a1ec1a".into(),
                tag: "8b".into(),
                ..Default::default()
            }],
            method: None,
        };
        let err = fx.service.perform_quick_models(&llm.base.id, input).await.unwrap_err();
        assert!(matches!(err.root(), DomainError::OutOfQuota(_)), "{err}");
        assert_eq!(err.http_status(), 406);
    }

    #[tokio::test]
    async fn test_concurrent_installs_share_quota() {
        let fx = fixture().await;
        let llm = running_llm(&fx, "llm-a").await;
        fx.service
            .update(
                &llm.base.id,
                LlmUpdateInput {
                    instant_model_quota_gb: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let llama = seed_instant_model(&fx.env.app, "llama3", "8b", "6a0746a1ec1a", 6000).await;
        let qwen = seed_instant_model(&fx.env.app, "qwen2", "7b", "dd314f039b9d", 6000).await;
        let install = |name: &str| LlmPerformQuickModelsInput {
            models: vec![ModelInfo {
                id: name.to_string(),
                ..Default::default()
            }],
            method: Some(QuickModelMethod::Install),
        };

        let (first, second) = tokio::join!(
            fx.service.perform_quick_models(&llm.base.id, install(&llama.base.name)),
            fx.service.perform_quick_models(&llm.base.id, install(&qwen.base.name)),
        );
        let (accepted, rejected) = match (first, second) {
            (Ok(out), Err(err)) | (Err(err), Ok(out)) => (out, err),
            (first, second) => panic!("exactly one install must fit: {first:?} {second:?}"),
        };
        assert!(matches!(rejected.root(), DomainError::OutOfQuota(_)), "{rejected}");
        assert!(fx.env.app.pending_quota.pending_gb(&llm.base.id) <= 10.0);

        let task = fx.tasks.get(&accepted.data[0].task_id).await.unwrap();
        wait(&fx, &task).await;
        assert!(fx.env.app.pending_quota.is_empty());
    }

    #[tokio::test]
    async fn test_quick_models_install_on_ready_llm() {
        let fx = fixture().await;
        let llm = running_llm(&fx, "llm-a").await;
        let task = fx.service.perform_stop(&llm.base.id).await.unwrap();
        wait(&fx, &task).await;
        let model = seed_instant_model(&fx.env.app, "llama3", "8b", "6a0746a1ec1a", 4000).await;

        let output = fx
            .service
            .perform_quick_models(
                &llm.base.id,
                LlmPerformQuickModelsInput {
                    models: vec![ModelInfo {
                        id: model.base.name.clone(),
                        ..Default::default()
                    }],
                    method: Some(QuickModelMethod::Install),
                },
            )
            .await
            .unwrap();
        assert_eq!(output.data.len(), 1);
        assert_eq!(output.data[0].request_status, 200);

        let task = fx.tasks.get(&output.data[0].task_id).await.unwrap();
        wait(&fx, &task).await;
        assert!(fx.env.app.pending_quota.is_empty());
        let mounted = fx
            .service
            .instant_models(&llm.base.id, None, Some(true), None)
            .await
            .unwrap();
        assert_eq!(mounted.len(), 1);
        assert_eq!(mounted[0].full_name(), "llama3:8b-6a0746a1ec1a");
        assert_eq!(fx.service.get(&llm.base.id).await.unwrap().base.status, "ready");
    }

    #[tokio::test]
    async fn test_refresh_records_served_models() {
        let fx = fixture().await;
        let llm = running_llm(&fx, "llm-a").await;
        seed_instant_model(&fx.env.app, "llama3", "8b", "6a0746a1ec1a", 4000).await;
        fx.env.models.serve(
            "http://10.0.0.1:20000",
            ServedModel {
                name: "llama3:8b".into(),
                digest: "sha256:6a0746a1ec1a0000".into(),
                size: 0,
            },
        );
        let rows = fx.service.refresh_instant_models(&llm.base.id, true).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_probed);
        assert!(!rows[0].is_mounted);
    }

    #[tokio::test]
    async fn test_available_network() {
        let fx = fixture().await;
        assert!(fx.service.available_network().await.auto_alloc_network_hostlocal_count.is_none());
        {
            let mut state = fx.env.compute.state();
            for (id, server_type, vpc) in [("n1", "hostlocal", ""), ("n2", "hostlocal", ""), ("n3", "guest", "default")] {
                state.networks.push(NetworkDetails {
                    id: id.into(),
                    name: id.into(),
                    status: "available".into(),
                    server_type: server_type.into(),
                    vpc_id: vpc.into(),
                });
            }
        }
        let output = fx.service.available_network().await;
        assert_eq!(output.auto_alloc_network_hostlocal_count, Some(2));
        assert_eq!(output.auto_alloc_network_guest_count, Some(1));
    }
}
