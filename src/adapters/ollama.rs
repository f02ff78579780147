//! Ollama HTTP API client and registry download client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{ChatRequest, ChatResponse, LlmClientDriver, ModelRegistry, ServedModel};

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.ollama.ai";
const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ServedModel>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

pub struct OllamaClient {
    http: ReqwestClient,
}

impl OllamaClient {
    /// `timeout` bounds every call, model pulls included.
    pub fn new(timeout: Duration) -> DomainResult<Self> {
        let http = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::Remote(format!("build ollama client: {e}")))?;
        Ok(Self { http })
    }

    async fn call(&self, method: Method, base_url: &str, path: &str, body: Option<Value>) -> DomainResult<String> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), path);
        debug!(%method, %url, "ollama request");

        let mut builder = self.http.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                DomainError::Timeout(format!("{url}: {e}"))
            } else {
                DomainError::Remote(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DomainError::Remote(format!("{url}: read body: {e}")))?;
        match status {
            s if s.is_success() => Ok(text),
            StatusCode::NOT_FOUND => Err(DomainError::not_found("model", text.trim())),
            s => Err(DomainError::Remote(format!("{url}: {s}: {}", text.trim()))),
        }
    }
}

#[async_trait]
impl LlmClientDriver for OllamaClient {
    async fn list_models(&self, base_url: &str) -> DomainResult<Vec<ServedModel>> {
        let text = self.call(Method::GET, base_url, "/api/tags", None).await?;
        let tags: TagsResponse = serde_json::from_str(&text)?;
        Ok(tags.models)
    }

    async fn pull_model(&self, base_url: &str, name: &str) -> DomainResult<()> {
        info!(model = name, "pulling model");
        let text = self
            .call(
                Method::POST,
                base_url,
                "/api/pull",
                Some(json!({"model": name, "stream": false})),
            )
            .await?;
        let resp: PullResponse = serde_json::from_str(&text)?;
        if let Some(error) = resp.error {
            return Err(DomainError::Remote(format!("pull {name}: {error}")));
        }
        if resp.status != "success" {
            return Err(DomainError::Remote(format!("pull {name}: status {}", resp.status)));
        }
        Ok(())
    }

    async fn delete_model(&self, base_url: &str, name: &str) -> DomainResult<()> {
        self.call(Method::DELETE, base_url, "/api/delete", Some(json!({"model": name})))
            .await?;
        Ok(())
    }

    async fn chat(&self, base_url: &str, request: &ChatRequest) -> DomainResult<ChatResponse> {
        let mut body = serde_json::to_value(request)?;
        body["stream"] = Value::Bool(false);
        let text = self.call(Method::POST, base_url, "/api/chat", Some(body)).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Pulls manifests and blobs from an Ollama model registry.
pub struct OllamaRegistryClient {
    http: ReqwestClient,
    base_url: String,
}

impl OllamaRegistryClient {
    /// `timeout` bounds a whole blob download.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> DomainResult<Self> {
        let http = ReqwestClient::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::Remote(format!("build registry client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str) -> DomainResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "registry request");
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, MANIFEST_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DomainError::Timeout(format!("{url}: {e}"))
                } else {
                    DomainError::Remote(format!("{url}: {e}"))
                }
            })?;
        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(DomainError::not_found("registry object", path)),
            s => Err(DomainError::Remote(format!("{url}: {s}"))),
        }
    }
}

#[async_trait]
impl ModelRegistry for OllamaRegistryClient {
    async fn fetch_manifest(&self, name: &str, tag: &str) -> DomainResult<Vec<u8>> {
        let response = self.get(&format!("/v2/library/{name}/manifests/{tag}")).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DomainError::Remote(format!("read manifest {name}:{tag}: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn download_blob(&self, name: &str, digest: &str, dest: &Path) -> DomainResult<u64> {
        let expected = digest
            .strip_prefix("sha256:")
            .ok_or_else(|| DomainError::Validation(format!("unsupported digest {digest}")))?;
        let mut response = self.get(&format!("/v2/library/{name}/blobs/{digest}")).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DomainError::Remote(format!("read blob {digest}: {e}")))?
        {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        let actual = format!("{:x}", hasher.finalize());
        if actual != expected {
            if let Err(err) = tokio::fs::remove_file(dest).await {
                warn!(path = %dest.display(), error = %err, "remove corrupt blob");
            }
            return Err(DomainError::Remote(format!("blob {digest} arrived as sha256:{actual}")));
        }
        info!(model = name, digest, bytes = written, "blob downloaded");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ChatMessage;
    use mockito::Matcher;

    fn client() -> OllamaClient {
        OllamaClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"qwen2:7b","digest":"a1b2c3d4e5f6a7b8","size":4400000000}]}"#)
            .create_async()
            .await;

        let models = client().list_models(&server.url()).await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "qwen2:7b");
    }

    #[tokio::test]
    async fn test_pull_model() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/pull")
            .match_body(Matcher::Json(json!({"model": "qwen2:7b", "stream": false})))
            .with_status(200)
            .with_body(r#"{"status":"success"}"#)
            .create_async()
            .await;

        client().pull_model(&server.url(), "qwen2:7b").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_pull_model_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/pull")
            .with_status(200)
            .with_body(r#"{"error":"pull model manifest: file does not exist"}"#)
            .create_async()
            .await;

        let err = client().pull_model(&server.url(), "nope:1").await.unwrap_err();
        assert!(err.to_string().contains("file does not exist"));
    }

    #[tokio::test]
    async fn test_delete_missing_model() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/api/delete")
            .with_status(404)
            .with_body("model not found")
            .create_async()
            .await;

        let err = client().delete_model(&server.url(), "gone:1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_chat() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"model": "qwen2:7b", "stream": false})))
            .with_status(200)
            .with_body(r#"{"model":"qwen2:7b","message":{"role":"assistant","content":"hi"},"done":true}"#)
            .create_async()
            .await;

        let request = ChatRequest {
            model: "qwen2:7b".into(),
            messages: vec![ChatMessage::new("user", "hello")],
            stream: true,
        };
        let resp = client().chat(&server.url(), &request).await.unwrap();
        assert_eq!(resp.message.content, "hi");
        assert!(resp.done);
    }

    fn registry(url: String) -> OllamaRegistryClient {
        OllamaRegistryClient::new(url, Duration::from_secs(5)).unwrap()
    }

    fn sha256(bytes: &[u8]) -> String {
        format!("sha256:{:x}", Sha256::digest(bytes))
    }

    #[tokio::test]
    async fn test_registry_manifest() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/library/qwen2/manifests/7b")
            .match_header("accept", MANIFEST_MEDIA_TYPE)
            .with_status(200)
            .with_body(r#"{"schemaVersion":2,"layers":[]}"#)
            .create_async()
            .await;

        let _missing = server
            .mock("GET", "/v2/library/qwen2/manifests/nope")
            .with_status(404)
            .create_async()
            .await;

        let manifest = registry(server.url()).fetch_manifest("qwen2", "7b").await.unwrap();
        assert!(manifest.starts_with(b"{\"schemaVersion\":2"));
        mock.assert_async().await;

        let err = registry(server.url()).fetch_manifest("qwen2", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_registry_blob_checks_digest() {
        let blob = b"model weights";
        let digest = sha256(blob);
        let mut server = mockito::Server::new_async().await;
        let _good = server
            .mock("GET", format!("/v2/library/qwen2/blobs/{digest}").as_str())
            .with_status(200)
            .with_body(blob)
            .create_async()
            .await;
        let bad_digest = sha256(b"something else");
        let _bad = server
            .mock("GET", format!("/v2/library/qwen2/blobs/{bad_digest}").as_str())
            .with_status(200)
            .with_body(blob)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("blobs/sha256-good");
        let written = registry(server.url()).download_blob("qwen2", &digest, &dest).await.unwrap();
        assert_eq!(written, blob.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), blob);

        let corrupt = dir.path().join("blobs/sha256-bad");
        let err = registry(server.url())
            .download_blob("qwen2", &bad_digest, &corrupt)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Remote(_)), "{err}");
        assert!(!corrupt.exists());
    }
}
