use serde::{Deserialize, Serialize};

use crate::domain::models::resource::ResourceBase;
use crate::impl_resource;

/// Chat agent bound to an LLM endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpAgent {
    #[serde(flatten)]
    pub base: ResourceBase,
    #[serde(default)]
    pub llm_id: String,
    /// Explicit endpoint, used when no LLM is referenced.
    #[serde(default)]
    pub llm_url: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub mcp_server_url: String,
}

impl_resource!(McpAgent, "mcp_agents_tbl", "mcp_agent", "mcp_agents");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpAgentCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// LLM id or name.
    #[serde(default)]
    pub llm_id: String,
    #[serde(default)]
    pub llm_url: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub mcp_server_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpAgentChatInput {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpAgentChatOutput {
    pub message: ChatMessage,
    #[serde(default)]
    pub model: String,
}
