//! Domain models for the LLM service and the monitor client.

pub mod compute;
pub mod config;
pub mod dify;
pub mod instant_model;
pub mod llm;
pub mod mcp_agent;
pub mod monitor;
pub mod resource;
pub mod sku;
pub mod task;
pub mod volume;

pub use config::{Config, DatabaseConfig, EndpointsConfig, TaskConfig};
pub use dify::{Dify, DifyCreateInput, DifyListDetails};
pub use instant_model::{
    InstantModel, InstantModelChangeOwnerInput, InstantModelCreateInput, InstantModelDetails,
    InstantModelEnableAutoCacheInput, InstantModelImportInput, InstantModelListInput,
    InstantModelUpdateInput, InternalInstantModelInfo, LlmInstantModel,
    LlmPerformQuickModelsInput, LlmSyncModelTaskInput, ModelInfo, MountDirInfo, MountedByLlmInfo,
    QuickModelMethod,
};
pub use llm::{
    AvailableNetworkOutput, Llm, LlmAccessUrl, LlmBatchPerformOutput, LlmContainerType,
    LlmCreateInput, LlmListDetails, LlmListInput, LlmPerformOutput, LlmStatus, LlmUpdateInput,
};
pub use mcp_agent::{ChatMessage, McpAgent, McpAgentChatInput, McpAgentChatOutput, McpAgentCreateInput};
pub use resource::{ListOutput, Resource, ResourceBase, ResourceListInput};
pub use sku::{
    DeviceSpec, DifyImages, DifySku, DifySkuCreateInput, EnvVar, LlmImage, LlmImageCreateInput,
    LlmSku, LlmSkuCreateInput, LlmSkuUpdateInput, PortMappingSpec, VolumeSpec,
};
pub use task::{TaskRecord, TaskStatus, INIT_STAGE};
pub use volume::{AccessInfo, LlmContainer, Volume};
