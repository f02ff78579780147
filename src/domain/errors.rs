//! Domain errors for the LLM service.
//!
//! Every variant maps onto one of the platform's HTTP error classes so the
//! API layer can answer with a typed error body.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    #[error("duplicate {resource}: {details}")]
    Duplicate { resource: String, details: String },

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("input parameter error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("out of quota: {0}")]
    OutOfQuota(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<DomainError>,
    },
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(resource: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Duplicate {
            resource: resource.into(),
            details: details.into(),
        }
    }

    /// Wrap the error with a message, keeping the original error class.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context wrappers.
    pub fn root(&self) -> &DomainError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    pub fn is_invalid_status(&self) -> bool {
        matches!(self.root(), Self::InvalidStatus(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout(_))
    }

    /// Platform error class name reported in the HTTP error body.
    pub fn class(&self) -> &'static str {
        match self.root() {
            Self::NotFound { .. } => "ResourceNotFoundError",
            Self::Duplicate { .. } => "DuplicateResourceError",
            Self::InvalidStatus(_) => "InvalidStatusError",
            Self::Validation(_) => "InputParameterError",
            Self::Conflict(_) => "ConflictError",
            Self::OutOfQuota(_) => "OutOfQuotaError",
            Self::Timeout(_) => "TimeoutError",
            Self::Remote(_) => "BadGatewayError",
            Self::Unsupported(_) => "UnsupportedOperationError",
            Self::Database(_) | Self::Serialization(_) | Self::Io(_) | Self::Context { .. } => {
                "InternalServerError"
            }
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.root() {
            Self::NotFound { .. } => 404,
            Self::Duplicate { .. } | Self::Conflict(_) => 409,
            Self::InvalidStatus(_) | Self::Validation(_) => 400,
            Self::OutOfQuota(_) => 406,
            Self::Timeout(_) => 504,
            Self::Remote(_) => 502,
            Self::Unsupported(_) => 501,
            Self::Database(_) | Self::Serialization(_) | Self::Io(_) | Self::Context { .. } => 500,
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_class() {
        let err = DomainError::not_found("llm", "abc").context("fetch llm");
        assert!(err.is_not_found());
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.class(), "ResourceNotFoundError");
        assert_eq!(err.to_string(), "fetch llm: llm abc not found");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(DomainError::OutOfQuota("x".into()).http_status(), 406);
        assert_eq!(DomainError::InvalidStatus("x".into()).http_status(), 400);
        assert_eq!(DomainError::duplicate("instant_model", "x").http_status(), 409);
        assert_eq!(DomainError::Timeout("x".into()).class(), "TimeoutError");
    }
}
