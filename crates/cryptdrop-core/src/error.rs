use serde::Serialize;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Missing input, password mismatch, wrong encryption state, oversized file
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid bearer credential
    #[error("not authorized: {0}")]
    Auth(String),

    /// The record exists but belongs to another owner
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// AEAD tag did not verify. Wrong password and corrupted data are
    /// reported the same way.
    #[error("wrong password or corrupted file")]
    AuthenticationTag,

    /// A storage or catalog call failed
    #[error("backend error: {0}")]
    Backend(String),

    /// A compensating cleanup after a partial failure itself failed
    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    /// Stable category name, suitable for machine-readable responses.
    pub fn category(&self) -> &'static str {
        match self {
            VaultError::Validation(_) => "validation",
            VaultError::Auth(_) => "auth",
            VaultError::Forbidden(_) => "forbidden",
            VaultError::NotFound(_) => "not_found",
            VaultError::AuthenticationTag => "authentication_tag",
            VaultError::Backend(_) => "backend",
            VaultError::Consistency(_) => "consistency",
            VaultError::Io(_) => "io",
            VaultError::Other(_) => "internal",
        }
    }

    /// HTTP-style status code for the failure category.
    pub fn status(&self) -> u16 {
        match self {
            VaultError::Validation(_) => 400,
            VaultError::Auth(_) => 401,
            VaultError::Forbidden(_) => 403,
            VaultError::NotFound(_) => 404,
            VaultError::AuthenticationTag => 422,
            VaultError::Backend(_)
            | VaultError::Consistency(_)
            | VaultError::Io(_)
            | VaultError::Other(_) => 500,
        }
    }

    pub fn backend(context: &str, err: impl std::fmt::Display) -> Self {
        VaultError::Backend(format!("{context}: {err}"))
    }
}

/// Failure response shape: a message plus its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub category: &'static str,
    pub status: u16,
}

impl From<&VaultError> for ErrorBody {
    fn from(err: &VaultError) -> Self {
        ErrorBody {
            error: err.to_string(),
            category: err.category(),
            status: err.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_failure_is_non_success() {
        let errors = [
            VaultError::Validation("x".into()),
            VaultError::Auth("x".into()),
            VaultError::Forbidden("x".into()),
            VaultError::NotFound("x".into()),
            VaultError::AuthenticationTag,
            VaultError::Backend("x".into()),
            VaultError::Consistency("x".into()),
        ];
        for err in &errors {
            assert!(err.status() >= 400, "{} must map to a failure status", err.category());
        }
    }

    #[test]
    fn test_tag_error_message_does_not_distinguish_cause() {
        let body = ErrorBody::from(&VaultError::AuthenticationTag);
        assert_eq!(body.error, "wrong password or corrupted file");
        assert_eq!(body.category, "authentication_tag");
    }

    #[test]
    fn test_error_body_serializes_message_field() {
        let body = ErrorBody::from(&VaultError::NotFound("record abc".into()));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "not found: record abc");
        assert_eq!(json["category"], "not_found");
        assert_eq!(json["status"], 404);
    }
}
