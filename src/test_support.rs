//! Fixtures shared by unit tests: an in-memory database plus the memory
//! adapters, wired into an [`AppContext`].

use std::sync::Arc;

use crate::adapters::sqlite::create_migrated_test_pool;
use crate::adapters::{MemoryCompute, MemoryImages, MemoryModelServer, MemoryRegistry};
use crate::domain::models::compute::image_status;
use crate::domain::models::{
    InstantModel, LlmContainerType, LlmImage, LlmSku, PortMappingSpec, ResourceBase, TaskConfig,
    VolumeSpec,
};
use crate::services::context::{AppContext, Repositories};

pub struct TestEnv {
    pub app: Arc<AppContext>,
    pub compute: Arc<MemoryCompute>,
    pub images: Arc<MemoryImages>,
    pub models: Arc<MemoryModelServer>,
    pub registry: Arc<MemoryRegistry>,
}

pub fn test_task_config() -> TaskConfig {
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

pub async fn test_env() -> TestEnv {
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
        test_task_config(),
    ));
    TestEnv {
        app,
        compute,
        images,
        models,
        registry,
    }
}

pub async fn test_app() -> Arc<AppContext> {
    test_env().await.app
}

pub async fn seed_llm_image(app: &AppContext) -> LlmImage {
    let image = LlmImage {
        base: ResourceBase::new("ollama", "ready"),
        image_name: "registry.local/ollama/ollama".into(),
        image_label: "0.5.7".into(),
        credential_id: String::new(),
        llm_type: LlmContainerType::Ollama,
    };
    app.repos.llm_images.insert(&image).await.expect("insert image");
    image
}

pub async fn seed_llm_sku(app: &AppContext, image: &LlmImage) -> LlmSku {
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
    app.repos.llm_skus.insert(&sku).await.expect("insert sku");
    sku
}

/// Enabled catalog model backed by a `tgz` image.
pub async fn seed_instant_model(app: &AppContext, name: &str, tag: &str, model_id: &str, size_mb: i64) -> InstantModel {
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
    app.repos.instant_models.insert(&model).await.expect("insert instant model");
    model
}
