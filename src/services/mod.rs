//! Service layer of the LLM service: resource operations, the task runner
//! and the task handlers it drives.

pub mod catalog_service;
pub mod context;
pub mod dify_service;
pub mod instant_model_sync;
pub mod llm_runtime;
pub mod llm_service;
pub mod mcp_agent_service;
pub mod pending_quota;
pub mod task_manager;
pub mod tasks;
pub mod wait;

pub use catalog_service::CatalogService;
pub use context::{AppContext, Repositories};
pub use dify_service::DifyService;
pub use llm_service::LlmService;
pub use mcp_agent_service::McpAgentService;
pub use pending_quota::PendingQuotaLedger;
pub use task_manager::{TaskHandler, TaskManager};
