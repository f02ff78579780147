//! Authenticated HTTP session against one platform service endpoint.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Client as ReqwestClient, Method, Response};
use serde_json::Value;
use tracing::debug;

use super::errors::ClientError;

pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// JSON body of a platform answer; an empty success body is `Value::Null`.
async fn decode(response: Response) -> Result<Value, ClientError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ClientError::from_response(status, &text));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

#[derive(Clone)]
pub struct Session {
    http: ReqwestClient,
    endpoint: String,
    token: Option<String>,
}

impl Session {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = ReqwestClient::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.endpoint, path)
        } else {
            format!("{}/{}", self.endpoint, path)
        }
    }

    /// Send a JSON request and decode the JSON answer.
    ///
    /// An empty success body decodes to `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let url = self.url(path);
        debug!(%method, %url, "platform request");

        let mut builder = self.http.request(method, &url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(token) = &self.token {
            builder = builder.header(AUTH_TOKEN_HEADER, token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        decode(builder.send().await?).await
    }

    /// Stream a raw body to `path`, with extra headers carrying its metadata.
    /// `timeout` replaces the session timeout for this call.
    pub async fn upload(
        &self,
        path: &str,
        headers: &[(String, String)],
        body: Body,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let url = self.url(path);
        debug!(%url, "platform upload");

        let mut builder = self
            .http
            .post(&url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/octet-stream");
        if let Some(token) = &self.token {
            builder = builder.header(AUTH_TOKEN_HEADER, token);
        }
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        decode(builder.body(body).send().await?).await
    }

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ClientError> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str, query: &[(String, String)]) -> Result<Value, ClientError> {
        self.request(Method::DELETE, path, query, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_sends_token_and_decodes_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/alerts")
            .match_header(AUTH_TOKEN_HEADER, "secret")
            .match_query(Matcher::UrlEncoded("limit".into(), "10".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"alerts": [], "total": 0}"#)
            .create_async()
            .await;

        let session = Session::new(server.url(), Some("secret".into()), Duration::from_secs(5)).unwrap();
        let body = session
            .get("/alerts", &[("limit".into(), "10".into())])
            .await
            .unwrap();
        assert_eq!(body["total"], 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/alerts/a1")
            .with_status(200)
            .create_async()
            .await;

        let session = Session::new(server.url(), None, Duration::from_secs(5)).unwrap();
        assert_eq!(session.delete("/alerts/a1", &[]).await.unwrap(), Value::Null);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/alerts/missing")
            .with_status(404)
            .with_body(r#"{"error":{"code":404,"class":"ResourceNotFoundError","details":"alert missing not found"}}"#)
            .create_async()
            .await;

        let session = Session::new(server.url(), None, Duration::from_secs(5)).unwrap();
        let err = session.get("/alerts/missing", &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_upload_sends_raw_body_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/images")
            .match_header("content-type", "application/octet-stream")
            .match_header("x-image-meta-disk_format", "tgz")
            .match_body("package-bytes")
            .with_status(200)
            .with_body(r#"{"image":{"id":"img-9"}}"#)
            .create_async()
            .await;

        let session = Session::new(server.url(), None, Duration::from_secs(5)).unwrap();
        let headers = vec![("x-image-meta-disk_format".to_string(), "tgz".to_string())];
        let body = session
            .upload("/images", &headers, Body::from("package-bytes"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(body["image"]["id"], "img-9");
        mock.assert_async().await;
    }
}
