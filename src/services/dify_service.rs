//! Dify stack deployments.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{NETWORK_TYPE_GUEST, NETWORK_TYPE_HOSTLOCAL};
use crate::domain::models::{
    Dify, DifyCreateInput, DifyListDetails, DifySku, LlmAccessUrl, LlmStatus, ListOutput, Resource,
    ResourceBase, ResourceListInput, TaskRecord,
};
use crate::domain::ports::ResourceFilter;
use crate::services::context::AppContext;
use crate::services::llm_runtime::{dify_url, set_dify_status};
use crate::services::task_manager::{TaskHandler, TaskManager};
use crate::services::tasks::{dify_images, DifyCreateTask, DifyDeleteTask, OBJ_DIFY};

pub struct DifyService {
    tasks: TaskManager,
}

impl DifyService {
    pub fn new(tasks: TaskManager) -> Self {
        Self { tasks }
    }

    fn app(&self) -> &Arc<AppContext> {
        self.tasks.app()
    }

    pub async fn get(&self, ident: &str) -> DomainResult<Dify> {
        self.app().repos.difys.fetch_by_id_or_name(ident).await
    }

    pub async fn validate_create(&self, mut input: DifyCreateInput) -> DomainResult<(DifyCreateInput, DifySku)> {
        let sku = self
            .app()
            .repos
            .dify_skus
            .fetch_by_id_or_name(&input.dify_sku_id)
            .await
            .map_err(|e| e.context("fetch dify sku"))?;
        dify_images(self.app(), &sku).await?;
        if !matches!(input.network_type.as_str(), "" | NETWORK_TYPE_HOSTLOCAL | NETWORK_TYPE_GUEST) {
            return Err(DomainError::Validation(format!("unsupported network type {}", input.network_type)));
        }
        if input.bandwidth_mb < 0 {
            return Err(DomainError::Validation("bandwidth must not be negative".into()));
        }
        if input.bandwidth_mb == 0 {
            input.bandwidth_mb = sku.bandwidth_mb;
        }
        if input.name.is_empty() {
            let suffix = Uuid::new_v4().simple().to_string();
            input.name = format!("{}-{}", sku.base.name, &suffix[..8]);
        }
        input.dify_sku_id.clone_from(&sku.base.id);
        Ok((input, sku))
    }

    pub async fn create(&self, input: DifyCreateInput) -> DomainResult<(Dify, TaskRecord)> {
        let (input, sku) = self.validate_create(input).await?;
        let mut base = ResourceBase::new(input.name, LlmStatus::Creating.as_str());
        base.project_id = input.project_id;
        base.description = input.description;
        let dify = Dify {
            base,
            dify_sku_id: input.dify_sku_id,
            svr_id: String::new(),
            network_type: input.network_type,
            network_id: input.network_id,
            bandwidth_mb: input.bandwidth_mb,
            prefer_host: input.prefer_host,
        };
        self.app().repos.difys.insert(&dify).await?;

        let task = match self
            .tasks
            .start_task(DifyCreateTask.name(), OBJ_DIFY, dify.id(), dify.name(), json!({}), None)
            .await
        {
            Ok(task) => task,
            Err(err) => {
                set_dify_status(self.app(), dify.id(), LlmStatus::CreateFail).await?;
                return Err(err.context("start create task"));
            }
        };
        info!(dify_id = %dify.base.id, sku = %sku.base.name, task_id = %task.id, "dify create accepted");
        Ok((dify, task))
    }

    pub async fn list(&self, input: &ResourceListInput) -> DomainResult<ListOutput<DifyListDetails>> {
        let mut filter = ResourceFilter::new().newest_first();
        if let Some(name) = input.name.as_deref().filter(|n| !n.is_empty()) {
            filter = filter.name(name);
        }
        let repo = &self.app().repos.difys;
        let total = repo.count(&filter).await?;
        let difys = repo.list(&filter.page(input.limit, input.offset)).await?;
        Ok(ListOutput {
            data: self.details(difys).await?,
            total,
            limit: input.limit.unwrap_or(0),
            offset: input.offset.unwrap_or(0),
        })
    }

    pub async fn show(&self, ident: &str) -> DomainResult<DifyListDetails> {
        let dify = self.get(ident).await?;
        let mut rows = self.details(vec![dify]).await?;
        rows.pop().ok_or_else(|| DomainError::not_found("dify", ident))
    }

    /// Sku name, pod placement and the nginx endpoint of each stack.
    pub async fn details(&self, difys: Vec<Dify>) -> DomainResult<Vec<DifyListDetails>> {
        let app = self.app();
        if difys.is_empty() {
            return Ok(Vec::new());
        }
        let sku_ids: Vec<String> = difys.iter().map(|d| d.dify_sku_id.clone()).collect();
        let skus: HashMap<String, String> = app
            .repos
            .dify_skus
            .list(&ResourceFilter::new().in_values("id", sku_ids))
            .await?
            .into_iter()
            .map(|s| (s.base.id, s.base.name))
            .collect();

        let svr_ids: Vec<String> = difys
            .iter()
            .filter(|d| !d.svr_id.is_empty())
            .map(|d| d.svr_id.clone())
            .collect();
        let servers: HashMap<String, _> = if svr_ids.is_empty() {
            HashMap::new()
        } else {
            match app.compute.list_servers(&svr_ids).await {
                Ok(servers) => servers.into_iter().map(|s| (s.id.clone(), s)).collect(),
                Err(err) => {
                    warn!(error = %err, "list dify servers failed");
                    HashMap::new()
                }
            }
        };

        let mut rows = Vec::with_capacity(difys.len());
        for dify in difys {
            let server = servers.get(&dify.svr_id);
            let access_url = if server.is_some() {
                dify_url(app, &dify).await.unwrap_or_default()
            } else {
                String::new()
            };
            rows.push(DifyListDetails {
                dify_sku: skus.get(&dify.dify_sku_id).cloned().unwrap_or_default(),
                server: server.map(|s| s.name.clone()).unwrap_or_default(),
                host: server.map(|s| s.host.clone()).unwrap_or_default(),
                host_access_ip: server.map(|s| s.host_access_ip.clone()).unwrap_or_default(),
                access_url,
                dify,
            });
        }
        Ok(rows)
    }

    pub async fn delete(&self, ident: &str) -> DomainResult<TaskRecord> {
        let dify = self.get(ident).await?;
        set_dify_status(self.app(), dify.id(), LlmStatus::StartDelete).await?;
        self.tasks
            .start_task(DifyDeleteTask.name(), OBJ_DIFY, dify.id(), dify.name(), json!({}), None)
            .await
    }

    pub async fn get_url(&self, ident: &str) -> DomainResult<LlmAccessUrl> {
        let dify = self.get(ident).await?;
        Ok(LlmAccessUrl {
            access_url: dify_url(self.app(), &dify).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::models::{DifyImages, LlmContainerType, LlmImage, TaskStatus, VolumeSpec};
    use crate::services::tasks::all_handlers;
    use crate::test_support::{test_env, TestEnv};

    struct Fixture {
        env: TestEnv,
        service: DifyService,
        tasks: TaskManager,
    }

    async fn fixture() -> Fixture {
        let env = test_env().await;
        let mut images = DifyImages::default();
        for (idx, field) in [
            &mut images.postgres_image_id,
            &mut images.redis_image_id,
            &mut images.nginx_image_id,
            &mut images.dify_api_image_id,
            &mut images.dify_plugin_image_id,
            &mut images.dify_web_image_id,
            &mut images.dify_sandbox_image_id,
            &mut images.dify_ssrf_image_id,
        ]
        .into_iter()
        .enumerate()
        {
            let image = LlmImage {
                base: ResourceBase::new(format!("dify-component-{idx}"), "ready"),
                image_name: "registry.local/langgenius/dify".into(),
                image_label: "1.0.0".into(),
                credential_id: String::new(),
                llm_type: LlmContainerType::Dify,
            };
            env.app.repos.llm_images.insert(&image).await.unwrap();
            *field = image.base.id;
        }
        let sku = DifySku {
            base: ResourceBase::new("dify-standard", "ready"),
            cpu: 8,
            memory_mb: 16384,
            volumes: vec![VolumeSpec {
                size_mb: 102_400,
                ..Default::default()
            }],
            port_mappings: vec![],
            envs: vec![],
            bandwidth_mb: 50,
            images,
        };
        env.app.repos.dify_skus.insert(&sku).await.unwrap();
        let tasks = TaskManager::new(env.app.clone(), all_handlers());
        Fixture {
            service: DifyService::new(tasks.clone()),
            tasks,
            env,
        }
    }

    async fn wait(fx: &Fixture, task: &TaskRecord) {
        let task = fx.tasks.wait_task(&task.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Complete, "{:?}", task.reason);
    }

    #[tokio::test]
    async fn test_validate_create_defaults() {
        let fx = fixture().await;
        let (input, sku) = fx
            .service
            .validate_create(DifyCreateInput {
                dify_sku_id: "dify-standard".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(input.dify_sku_id, sku.base.id);
        assert_eq!(input.bandwidth_mb, 50);
        assert!(input.name.starts_with("dify-standard-"));

        let err = fx
            .service
            .validate_create(DifyCreateInput {
                dify_sku_id: "dify-standard".into(),
                network_type: "eip".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_show_and_delete() {
        let fx = fixture().await;
        let (dify, task) = fx
            .service
            .create(DifyCreateInput {
                name: "dify-a".into(),
                dify_sku_id: "dify-standard".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        wait(&fx, &task).await;

        let details = fx.service.show("dify-a").await.unwrap();
        assert_eq!(details.dify.base.status, "running");
        assert_eq!(details.dify_sku, "dify-standard");
        assert_eq!(details.server, "dify-a");
        assert_eq!(details.host_access_ip, "10.0.0.1");
        assert!(details.access_url.starts_with("http://10.0.0.1:"));
        assert_eq!(fx.service.get_url(&dify.base.id).await.unwrap().access_url, details.access_url);

        let listed = fx.service.list(&ResourceListInput::default()).await.unwrap();
        assert_eq!(listed.total, 1);

        let task = fx.service.delete("dify-a").await.unwrap();
        wait(&fx, &task).await;
        assert!(fx.env.app.repos.difys.get(&dify.base.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_unknown_sku() {
        let fx = fixture().await;
        let err = fx
            .service
            .create(DifyCreateInput {
                dify_sku_id: "nope".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
