//! Shared fixtures for integration tests: the LLM service wired to an
//! in-memory database and the memory platform adapters.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use onecloud_llm::adapters::sqlite::create_migrated_test_pool;
use onecloud_llm::adapters::{MemoryCompute, MemoryImages, MemoryModelServer, MemoryRegistry};
use onecloud_llm::api::{router, ApiState, SharedState};
use onecloud_llm::domain::models::compute::image_status;
use onecloud_llm::domain::models::{
    InstantModel, LlmContainerType, LlmImage, LlmSku, PortMappingSpec, ResourceBase, TaskConfig,
    VolumeSpec,
};
use onecloud_llm::services::tasks::all_handlers;
use onecloud_llm::services::{AppContext, Repositories, TaskManager};

pub struct Service {
    pub app: Arc<AppContext>,
    pub compute: Arc<MemoryCompute>,
    pub images: Arc<MemoryImages>,
    pub models: Arc<MemoryModelServer>,
    pub registry: Arc<MemoryRegistry>,
    pub state: SharedState,
}

fn fast_tasks() -> TaskConfig {
    TaskConfig {
        workers: 4,
        poll_interval_secs: 0,
        server_timeout_secs: 2,
        model_pull_timeout_secs: 2,
        mount_timeout_secs: 1,
        mount_retry_interval_secs: 0,
        instant_model_probe_interval_secs: 60,
        working_dir: std::env::temp_dir().join("onecloud-llm-test"),
        import_timeout_secs: 2,
    }
}

pub async fn service() -> Service {
    let pool = create_migrated_test_pool().await.expect("test pool");
    let compute = Arc::new(MemoryCompute::new());
    let images = Arc::new(MemoryImages::new());
    let models = Arc::new(MemoryModelServer::new());
    let registry = Arc::new(MemoryRegistry::new());
    let app = Arc::new(AppContext::new(
        Repositories::sqlite(&pool),
        compute.clone(),
        images.clone(),
        models.clone(),
        registry.clone(),
        fast_tasks(),
    ));
    let tasks = TaskManager::new(app.clone(), all_handlers());
    Service {
        app,
        compute,
        images,
        models,
        registry,
        state: Arc::new(ApiState::new(tasks)),
    }
}

impl Service {
    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .expect("request");
        let response = router(self.state.clone()).oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    pub async fn seed_catalog(&self) -> (LlmImage, LlmSku) {
        let image = LlmImage {
            base: ResourceBase::new("ollama", "ready"),
            image_name: "registry.local/ollama/ollama".into(),
            image_label: "0.5.7".into(),
            credential_id: String::new(),
            llm_type: LlmContainerType::Ollama,
        };
        self.app.repos.llm_images.insert(&image).await.expect("insert image");

        let sku = LlmSku {
            base: ResourceBase::new("ollama-small", "ready"),
            cpu: 4,
            memory_mb: 8192,
            volumes: vec![VolumeSpec {
                size_mb: 20480,
                storage_type: "local".into(),
                template_id: String::new(),
            }],
            port_mappings: vec![PortMappingSpec {
                protocol: "tcp".into(),
                container_port: 11434,
                remote_ips: vec![],
            }],
            devices: vec![],
            envs: vec![],
            bandwidth_mb: 100,
            llm_type: LlmContainerType::Ollama,
            llm_image_id: image.base.id.clone(),
            llm_model_name: String::new(),
            mounted_models: vec![],
        };
        self.app.repos.llm_skus.insert(&sku).await.expect("insert sku");
        (image, sku)
    }

    pub async fn seed_instant_model(&self, name: &str, tag: &str, model_id: &str, size_mb: i64) -> InstantModel {
        let model = InstantModel {
            base: ResourceBase::new(format!("{name}-{tag}"), image_status::ACTIVE),
            llm_type: LlmContainerType::Ollama,
            model_id: model_id.into(),
            model_name: name.into(),
            model_tag: tag.into(),
            image_id: format!("img-{model_id}"),
            mounts: vec![
                format!("manifests/registry.ollama.ai/library/{name}/{tag}"),
                format!("blobs/sha256-{model_id}"),
            ],
            size: size_mb * 1024 * 1024,
            actual_size_mb: size_mb,
            enabled: true,
            auto_cache: false,
        };
        self.app
            .repos
            .instant_models
            .insert(&model)
            .await
            .expect("insert instant model");
        model
    }

    pub async fn wait_task(&self, task_id: &str) -> onecloud_llm::domain::models::TaskRecord {
        self.state
            .tasks
            .wait_task(task_id, std::time::Duration::from_secs(5))
            .await
            .expect("task finished")
    }
}
