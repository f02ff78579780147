//! Shared handles every service and task works with.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::adapters::sqlite::{SqliteResourceRepository, SqliteTaskRepository};
use crate::domain::models::{
    AccessInfo, Dify, DifySku, InstantModel, Llm, LlmContainer, LlmImage, LlmInstantModel, LlmSku,
    McpAgent, TaskConfig, Volume,
};
use crate::domain::ports::{
    ComputeClient, ImageClient, LlmClientDriver, ModelRegistry, ResourceRepository, TaskRepository,
};
use crate::drivers::DriverRegistry;
use crate::services::pending_quota::PendingQuotaLedger;
use crate::services::wait::PollConfig;

#[derive(Clone)]
pub struct Repositories {
    pub llms: Arc<dyn ResourceRepository<Llm>>,
    pub llm_skus: Arc<dyn ResourceRepository<LlmSku>>,
    pub llm_images: Arc<dyn ResourceRepository<LlmImage>>,
    pub dify_skus: Arc<dyn ResourceRepository<DifySku>>,
    pub difys: Arc<dyn ResourceRepository<Dify>>,
    pub instant_models: Arc<dyn ResourceRepository<InstantModel>>,
    pub llm_instant_models: Arc<dyn ResourceRepository<LlmInstantModel>>,
    pub volumes: Arc<dyn ResourceRepository<Volume>>,
    pub access_infos: Arc<dyn ResourceRepository<AccessInfo>>,
    pub llm_containers: Arc<dyn ResourceRepository<LlmContainer>>,
    pub mcp_agents: Arc<dyn ResourceRepository<McpAgent>>,
    pub tasks: Arc<dyn TaskRepository>,
}

impl Repositories {
    pub fn sqlite(pool: &SqlitePool) -> Self {
        Self {
            llms: Arc::new(SqliteResourceRepository::new(pool.clone())),
            llm_skus: Arc::new(SqliteResourceRepository::new(pool.clone())),
            llm_images: Arc::new(SqliteResourceRepository::new(pool.clone())),
            dify_skus: Arc::new(SqliteResourceRepository::new(pool.clone())),
            difys: Arc::new(SqliteResourceRepository::new(pool.clone())),
            instant_models: Arc::new(SqliteResourceRepository::new(pool.clone())),
            llm_instant_models: Arc::new(SqliteResourceRepository::new(pool.clone())),
            volumes: Arc::new(SqliteResourceRepository::new(pool.clone())),
            access_infos: Arc::new(SqliteResourceRepository::new(pool.clone())),
            llm_containers: Arc::new(SqliteResourceRepository::new(pool.clone())),
            mcp_agents: Arc::new(SqliteResourceRepository::new(pool.clone())),
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
        }
    }
}

pub struct AppContext {
    pub repos: Repositories,
    pub compute: Arc<dyn ComputeClient>,
    pub images: Arc<dyn ImageClient>,
    pub llm_client: Arc<dyn LlmClientDriver>,
    pub drivers: DriverRegistry,
    pub pending_quota: PendingQuotaLedger,
    pub config: TaskConfig,
}

impl AppContext {
    pub fn new(
        repos: Repositories,
        compute: Arc<dyn ComputeClient>,
        images: Arc<dyn ImageClient>,
        llm_client: Arc<dyn LlmClientDriver>,
        registry: Arc<dyn ModelRegistry>,
        config: TaskConfig,
    ) -> Self {
        let drivers = DriverRegistry::with_defaults(llm_client.clone(), registry);
        Self {
            repos,
            compute,
            images,
            llm_client,
            drivers,
            pending_quota: PendingQuotaLedger::new(),
            config,
        }
    }

    pub fn server_poll(&self) -> PollConfig {
        PollConfig::from_secs(self.config.poll_interval_secs, self.config.server_timeout_secs)
    }

    pub fn image_poll(&self, timeout_secs: u64) -> PollConfig {
        PollConfig::new(Duration::from_secs(2), Duration::from_secs(timeout_secs))
    }

    pub fn import_poll(&self) -> PollConfig {
        self.image_poll(self.config.import_timeout_secs)
    }

    pub fn mount_poll(&self) -> PollConfig {
        PollConfig::from_secs(self.config.mount_retry_interval_secs, self.config.mount_timeout_secs)
    }

    pub fn probe_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.config.instant_model_probe_interval_secs).unwrap_or(i64::MAX))
    }
}
