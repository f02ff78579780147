use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::ChatMessage;

/// A model known to a model server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedModel {
    /// `name:tag`
    pub name: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
}

/// HTTP API of a model server running inside an LLM container.
#[async_trait]
pub trait LlmClientDriver: Send + Sync {
    async fn list_models(&self, base_url: &str) -> DomainResult<Vec<ServedModel>>;

    /// Pull a model and wait for the pull to finish
    async fn pull_model(&self, base_url: &str, name: &str) -> DomainResult<()>;

    async fn delete_model(&self, base_url: &str, name: &str) -> DomainResult<()>;

    async fn chat(&self, base_url: &str, request: &ChatRequest) -> DomainResult<ChatResponse>;
}

/// Model registry the Ollama server pulls from, e.g. `registry.ollama.ai`.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Raw manifest of `name:tag`
    async fn fetch_manifest(&self, name: &str, tag: &str) -> DomainResult<Vec<u8>>;

    /// Write blob `digest` of `name` to `dest`, checking its digest.
    /// Returns the number of bytes written.
    async fn download_blob(&self, name: &str, digest: &str, dest: &Path) -> DomainResult<u64>;
}
