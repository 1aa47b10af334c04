//! Server error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The resource lister failed for a tenant and kind.
    #[error("lister error for {tenant}/{kind}: {message}")]
    Lister {
        tenant: String,
        kind: String,
        message: String,
    },

    /// The resource lister did not answer in time.
    #[error("lister timed out for {tenant}/{kind}")]
    Timeout { tenant: String, kind: String },

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a lister error.
    pub fn lister(tenant: &str, kind: &str, message: impl Into<String>) -> Self {
        Error::Lister {
            tenant: tenant.to_string(),
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    /// Create a lister timeout error.
    pub fn timeout(tenant: &str, kind: &str) -> Self {
        Error::Timeout {
            tenant: tenant.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Bad request.
    BadRequest(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error flag.
    pub error: bool,
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
        };

        let body = ErrorResponse {
            error: true,
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lister_errors_name_tenant_and_kind() {
        let err = Error::timeout("prod", "HelmRelease");
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(err.to_string(), "lister timed out for prod/HelmRelease");

        let err = Error::lister("prod", "Kustomization", "upstream returned 503");
        assert_eq!(
            err.to_string(),
            "lister error for prod/Kustomization: upstream returned 503"
        );
    }
}
