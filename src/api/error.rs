//! Typed JSON error bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::domain::errors::DomainError;

/// Wire form: `{"error": {"code": 404, "class": "ResourceNotFoundError", "details": "..."}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub class: &'static str,
    pub details: String,
}

#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self(DomainError::Validation(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.http_status();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code, error = %self.0, "request failed");
        } else {
            warn!(code, error = %self.0, "request rejected");
        }
        let body = ErrorBody {
            code,
            class: self.0.class(),
            details: self.0.to_string(),
        };
        (status, Json(json!({ "error": body }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: DomainError) -> (StatusCode, serde_json::Value) {
        let resp = ApiError(err).into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let (status, body) = render(DomainError::not_found("llm", "x")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 404);
        assert_eq!(body["error"]["details"], "llm x not found");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (DomainError::OutOfQuota("full".into()), 406),
            (DomainError::Conflict("busy".into()), 409),
            (DomainError::InvalidStatus("ready".into()), 400),
            (DomainError::Timeout("slow".into()), 504),
            (DomainError::Remote("down".into()), 502),
            (DomainError::Database("locked".into()).context("insert"), 500),
        ];
        for (err, code) in cases {
            let (status, _) = render(err).await;
            assert_eq!(status.as_u16(), code);
        }
    }
}
