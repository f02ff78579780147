//! Keyword-addressed REST resource manager.
//!
//! Single objects travel under the singular keyword, lists under the plural
//! keyword with `total`, `limit` and `offset` beside them.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::ClientError;
use super::params::struct_to_params;
use super::session::Session;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub data: Vec<Value>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Outcome of one element of a batch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub id: String,
    pub status: u16,
    pub data: Value,
}

impl SubmitResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn from_error(id: &str, err: &ClientError) -> Self {
        let (status, class, details) = match err {
            ClientError::Http { status, class, details } => (*status, class.clone(), details.clone()),
            other => (500, "ClientError".to_string(), other.to_string()),
        };
        Self {
            id: id.to_string(),
            status,
            data: json!({"code": status, "class": class, "details": details}),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceManager {
    pub keyword: &'static str,
    pub keyword_plural: &'static str,
}

fn unwrap_keyword(mut body: Value, key: &str) -> Value {
    match body.get_mut(key) {
        Some(inner) => inner.take(),
        None => body,
    }
}

fn encode(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' | ':' => c.to_string(),
            other => {
                let mut buf = [0u8; 4];
                other
                    .encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{b:02X}"))
                    .collect()
            }
        })
        .collect()
}

impl ResourceManager {
    pub const fn new(keyword: &'static str, keyword_plural: &'static str) -> Self {
        Self {
            keyword,
            keyword_plural,
        }
    }

    fn collection_path(&self) -> String {
        format!("/{}", self.keyword_plural)
    }

    fn object_path(&self, id: &str) -> String {
        format!("/{}/{}", self.keyword_plural, encode(id))
    }

    pub async fn list(&self, session: &Session, params: &Value) -> Result<ListResult, ClientError> {
        let query = struct_to_params(params)?;
        let body = session.get(&self.collection_path(), &query).await?;

        let data = match body.get(self.keyword_plural) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(ClientError::InvalidResponse(format!(
                    "{} is not a list: {other}",
                    self.keyword_plural
                )))
            }
        };
        let number = |key: &str| body.get(key).and_then(Value::as_i64);
        Ok(ListResult {
            total: number("total").unwrap_or(data.len() as i64),
            limit: number("limit").unwrap_or_default(),
            offset: number("offset").unwrap_or_default(),
            data,
        })
    }

    pub async fn get(&self, session: &Session, id: &str, params: &Value) -> Result<Value, ClientError> {
        let query = struct_to_params(params)?;
        let body = session.get(&self.object_path(id), &query).await?;
        Ok(unwrap_keyword(body, self.keyword))
    }

    /// `GET /<plural>/<id>/<spec>`; the body is returned as is.
    pub async fn get_specific(
        &self,
        session: &Session,
        id: &str,
        spec: &str,
        params: &Value,
    ) -> Result<Value, ClientError> {
        let query = struct_to_params(params)?;
        let path = format!("{}/{}", self.object_path(id), encode(spec));
        session.get(&path, &query).await
    }

    pub async fn create(&self, session: &Session, body: &Value) -> Result<Value, ClientError> {
        let body = json!({ self.keyword: body });
        let resp = session.post(&self.collection_path(), &body).await?;
        Ok(unwrap_keyword(resp, self.keyword))
    }

    /// Create `count` objects from one body.
    pub async fn batch_create(
        &self,
        session: &Session,
        body: &Value,
        count: u32,
    ) -> Result<Vec<SubmitResult>, ClientError> {
        let body = json!({ self.keyword: body, "count": count });
        let resp = session.post(&self.collection_path(), &body).await?;

        let items = match resp.get(self.keyword_plural) {
            Some(Value::Array(items)) => items.clone(),
            _ => match resp.get(self.keyword) {
                Some(single) => vec![json!({"status": 200, "body": single})],
                None => Vec::new(),
            },
        };

        Ok(items
            .into_iter()
            .map(|item| {
                let status = item
                    .get("status")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok())
                    .unwrap_or(200);
                let data = item.get("body").cloned().unwrap_or(item);
                let id = data
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                SubmitResult { id, status, data }
            })
            .collect())
    }

    pub async fn update(&self, session: &Session, id: &str, body: &Value) -> Result<Value, ClientError> {
        let body = json!({ self.keyword: body });
        let resp = session.put(&self.object_path(id), &body).await?;
        Ok(unwrap_keyword(resp, self.keyword))
    }

    pub async fn delete(&self, session: &Session, id: &str, params: &Value) -> Result<Value, ClientError> {
        let query = struct_to_params(params)?;
        let resp = session.delete(&self.object_path(id), &query).await?;
        Ok(unwrap_keyword(resp, self.keyword))
    }

    /// Delete every id concurrently, reporting each outcome.
    pub async fn batch_delete(
        &self,
        session: &Session,
        ids: &[String],
        params: &Value,
    ) -> Vec<SubmitResult> {
        let calls = ids.iter().map(|id| async move {
            match self.delete(session, id, params).await {
                Ok(data) => SubmitResult {
                    id: id.clone(),
                    status: 200,
                    data,
                },
                Err(err) => SubmitResult::from_error(id, &err),
            }
        });
        join_all(calls).await
    }

    pub async fn perform_action(
        &self,
        session: &Session,
        id: &str,
        action: &str,
        body: &Value,
    ) -> Result<Value, ClientError> {
        let path = format!("{}/{}", self.object_path(id), encode(action));
        let body = json!({ self.keyword: body });
        let resp = session.post(&path, &body).await?;
        Ok(unwrap_keyword(resp, self.keyword))
    }

    pub async fn batch_perform_action(
        &self,
        session: &Session,
        ids: &[String],
        action: &str,
        body: &Value,
    ) -> Vec<SubmitResult> {
        let calls = ids.iter().map(|id| async move {
            match self.perform_action(session, id, action, body).await {
                Ok(data) => SubmitResult {
                    id: id.clone(),
                    status: 200,
                    data,
                },
                Err(err) => SubmitResult::from_error(id, &err),
            }
        });
        join_all(calls).await
    }

    /// `POST /<plural>/<action>`; the body is returned as is.
    pub async fn perform_class_action(
        &self,
        session: &Session,
        action: &str,
        body: &Value,
    ) -> Result<Value, ClientError> {
        let path = format!("{}/{}", self.collection_path(), encode(action));
        let body = json!({ self.keyword_plural: body });
        session.post(&path, &body).await
    }
}
