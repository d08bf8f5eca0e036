//! Error types for the knowledge sharing service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by the controllers and the repository layer.
#[derive(Debug, Error, PartialEq)]
pub enum KnowledgeError {
    /// Unknown article, rejected token, or nothing visible to the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Token route preconditions unmet (missing token, unknown article, sharing disabled).
    #[error("forbidden")]
    Forbidden,

    /// A bearer token was supplied but could not be validated.
    #[error("authentication failed")]
    Unauthorized,

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for KnowledgeError {
    fn from(err: sqlx::Error) -> Self {
        KnowledgeError::Database(err.to_string())
    }
}

impl KnowledgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            KnowledgeError::NotFound(_) => StatusCode::NOT_FOUND,
            KnowledgeError::Forbidden => StatusCode::FORBIDDEN,
            KnowledgeError::Unauthorized => StatusCode::UNAUTHORIZED,
            KnowledgeError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for KnowledgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let KnowledgeError::Database(detail) = &self {
            tracing::error!("request failed: {}", detail);
            return (status, "internal error").into_response();
        }
        (status, self.to_string()).into_response()
    }
}
