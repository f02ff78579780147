use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::domain::errors::DomainError;

/// Errors returned by the platform REST client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Non-2xx answer, decoded from the platform error body
    #[error("{class} ({status}): {details}")]
    Http {
        status: u16,
        class: String,
        details: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ClientError {
    /// Build an HTTP error from a status and the raw response body.
    ///
    /// The platform answers `{"error": {"code", "class", "details"}}`; older
    /// services put the same keys at the top level.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let error = parsed
            .as_ref()
            .map(|v| v.get("error").filter(|e| e.is_object()).unwrap_or(v));

        let field = |key: &str| {
            error
                .and_then(|e| e.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let class = field("class").unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("HttpError")
                .replace(' ', "")
        });
        let details = field("details").unwrap_or_else(|| body.trim().to_string());

        ClientError::Http {
            status: status.as_u16(),
            class,
            details,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<ClientError> for DomainError {
    fn from(err: ClientError) -> Self {
        match &err {
            ClientError::Http { status: 404, details, .. } => {
                DomainError::not_found("remote resource", details.clone())
            }
            ClientError::Http { class, details, .. } if class == "InvalidStatusError" => {
                DomainError::InvalidStatus(details.clone())
            }
            ClientError::Network(e) if e.is_timeout() => DomainError::Timeout(err.to_string()),
            _ => DomainError::Remote(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_error_body() {
        let err = ClientError::from_response(
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":404,"class":"ResourceNotFoundError","details":"server abc not found"}}"#,
        );
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "ResourceNotFoundError (404): server abc not found");
    }

    #[test]
    fn test_parse_plain_error_body() {
        let err = ClientError::from_response(StatusCode::BAD_GATEWAY, "upstream down");
        match err {
            ClientError::Http { class, details, .. } => {
                assert_eq!(class, "BadGateway");
                assert_eq!(details, "upstream down");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_domain_mapping() {
        let err = ClientError::from_response(
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"class":"InvalidStatusError","details":"container is running"}"#,
        );
        let domain: DomainError = err.into();
        assert!(domain.is_invalid_status());

        let domain: DomainError = ClientError::from_response(StatusCode::NOT_FOUND, "").into();
        assert!(domain.is_not_found());
    }
}
