//! Chat agents bound to an LLM endpoint.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ChatMessage, ListOutput, McpAgent, McpAgentChatInput, McpAgentChatOutput, McpAgentCreateInput,
    ResourceBase, ResourceListInput,
};
use crate::domain::ports::{ChatRequest, ResourceFilter};
use crate::services::context::AppContext;
use crate::services::llm_runtime::llm_url;

pub struct McpAgentService {
    app: Arc<AppContext>,
}

impl McpAgentService {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self { app }
    }

    pub async fn create(&self, input: McpAgentCreateInput) -> DomainResult<McpAgent> {
        if input.name.is_empty() || input.model.is_empty() {
            return Err(DomainError::Validation("name and model are required".into()));
        }
        let llm_id = if input.llm_id.is_empty() {
            if input.llm_url.is_empty() {
                return Err(DomainError::Validation("either llm_id or llm_url is required".into()));
            }
            String::new()
        } else {
            self.app.repos.llms.fetch_by_id_or_name(&input.llm_id).await?.base.id
        };
        let mut base = ResourceBase::new(input.name, "ready");
        base.description = input.description;
        let agent = McpAgent {
            base,
            llm_id,
            llm_url: input.llm_url,
            model: input.model,
            system_prompt: input.system_prompt,
            mcp_server_url: input.mcp_server_url,
        };
        self.app.repos.mcp_agents.insert(&agent).await?;
        info!(agent_id = %agent.base.id, name = %agent.base.name, "mcp agent created");
        Ok(agent)
    }

    pub async fn get(&self, ident: &str) -> DomainResult<McpAgent> {
        self.app.repos.mcp_agents.fetch_by_id_or_name(ident).await
    }

    pub async fn list(&self, input: &ResourceListInput) -> DomainResult<ListOutput<McpAgent>> {
        let mut filter = ResourceFilter::new().newest_first();
        if let Some(name) = input.name.as_deref().filter(|n| !n.is_empty()) {
            filter = filter.name(name);
        }
        let total = self.app.repos.mcp_agents.count(&filter).await?;
        let data = self.app.repos.mcp_agents.list(&filter.page(input.limit, input.offset)).await?;
        Ok(ListOutput {
            data,
            total,
            limit: input.limit.unwrap_or(0),
            offset: input.offset.unwrap_or(0),
        })
    }

    pub async fn delete(&self, ident: &str) -> DomainResult<()> {
        let agent = self.get(ident).await?;
        self.app.repos.mcp_agents.delete(&agent.base.id).await
    }

    /// The explicit url wins over the referenced LLM.
    async fn endpoint(&self, agent: &McpAgent) -> DomainResult<String> {
        if !agent.llm_url.is_empty() {
            return Ok(agent.llm_url.clone());
        }
        let llm = self
            .app
            .repos
            .llms
            .fetch(&agent.llm_id)
            .await
            .map_err(|e| e.context(format!("llm of agent {}", agent.base.name)))?;
        llm_url(&self.app, &llm).await
    }

    pub async fn chat(&self, ident: &str, input: McpAgentChatInput) -> DomainResult<McpAgentChatOutput> {
        if input.message.is_empty() {
            return Err(DomainError::Validation("empty message".into()));
        }
        let agent = self.get(ident).await?;
        let url = self.endpoint(&agent).await?;

        let mut messages = Vec::with_capacity(input.history.len() + 2);
        if !agent.system_prompt.is_empty() {
            messages.push(ChatMessage::new("system", agent.system_prompt.clone()));
        }
        messages.extend(input.history);
        messages.push(ChatMessage::new("user", input.message));

        debug!(agent = %agent.base.name, url = %url, turns = messages.len(), "chat request");
        let request = ChatRequest {
            model: agent.model.clone(),
            messages,
            stream: false,
        };
        let response = self
            .app
            .llm_client
            .chat(&url, &request)
            .await
            .map_err(|e| e.context(format!("chat with {url}")))?;
        Ok(McpAgentChatOutput {
            message: response.message,
            model: response.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::models::{LlmCreateInput, TaskStatus};
    use crate::services::llm_service::LlmService;
    use crate::services::task_manager::TaskManager;
    use crate::services::tasks::all_handlers;
    use crate::test_support::{seed_llm_image, seed_llm_sku, test_env};

    fn agent_input(name: &str) -> McpAgentCreateInput {
        McpAgentCreateInput {
            name: name.into(),
            model: "qwen2:7b".into(),
            system_prompt: "You are a helpful operator.".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_requires_endpoint() {
        let env = test_env().await;
        let service = McpAgentService::new(env.app.clone());
        let err = service.create(agent_input("a")).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut input = agent_input("a");
        input.llm_id = "missing".into();
        assert!(service.create(input).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_chat_with_explicit_url() {
        let env = test_env().await;
        let service = McpAgentService::new(env.app.clone());
        let mut input = agent_input("ops");
        input.llm_url = "http://127.0.0.1:11434".into();
        service.create(input).await.unwrap();

        let out = service
            .chat(
                "ops",
                McpAgentChatInput {
                    message: "list servers".into(),
                    history: vec![ChatMessage::new("user", "hi"), ChatMessage::new("assistant", "hello")],
                },
            )
            .await
            .unwrap();
        assert_eq!(out.message.role, "assistant");
        assert_eq!(out.message.content, "echo: list servers");
        assert_eq!(out.model, "qwen2:7b");

        assert_eq!(service.list(&ResourceListInput::default()).await.unwrap().total, 1);
        service.delete("ops").await.unwrap();
        assert!(service.get("ops").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_chat_through_llm() {
        let env = test_env().await;
        let image = seed_llm_image(&env.app).await;
        seed_llm_sku(&env.app, &image).await;
        let tasks = TaskManager::new(env.app.clone(), all_handlers());
        let llms = LlmService::new(tasks.clone());
        let (created, task) = llms
            .create(LlmCreateInput {
                name: "llm-a".into(),
                llm_sku_id: "ollama-small".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let task = tasks.wait_task(&task.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Complete, "{:?}", task.reason);

        let service = McpAgentService::new(env.app.clone());
        let mut input = agent_input("ops");
        input.llm_id = "llm-a".into();
        let agent = service.create(input).await.unwrap();
        assert_eq!(agent.llm_id, created[0].base.id);

        let out = service
            .chat(
                &agent.base.id,
                McpAgentChatInput {
                    message: "ping".into(),
                    history: vec![],
                },
            )
            .await
            .unwrap();
        assert_eq!(out.message.content, "echo: ping");
    }
}
