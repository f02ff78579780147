//! Port trait definitions (Hexagonal Architecture)
//!
//! - ResourceRepository / TaskRepository: persistence
//! - ComputeClient / ImageClient: remote platform services
//! - LlmClientDriver: model server HTTP API
//! - ModelRegistry: model package downloads

pub mod compute;
pub mod llm_client;
pub mod resource_repository;
pub mod task_repository;

pub use compute::{ComputeClient, ImageClient};
pub use llm_client::{ChatRequest, ChatResponse, LlmClientDriver, ModelRegistry, ServedModel};
pub use resource_repository::{ResourceFilter, ResourceRepository};
pub use task_repository::{TaskFilter, TaskRepository};
