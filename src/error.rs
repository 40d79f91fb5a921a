use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Semantic error kinds for the notification delivery core. `TerminalDelivery`
/// is deliberately absent: it is represented as `SendResult::FailedPerm`, data
/// returned by the dispatcher rather than an error propagated up the stack.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("validation error on field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("provider error: {message}")]
    ClientProvider { message: String },

    #[error("transient provider error: {source}")]
    TransientProvider {
        #[source]
        source: anyhow::Error,
    },

    #[error("internal error: {source}")]
    Internal {
        #[source]
        source: anyhow::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            source: source.into(),
        }
    }
}

/// Only the `/health` surface speaks HTTP; the rest of this core returns
/// `CoreResult`/`SendResult` and never an HTTP response.
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            CoreError::Forbidden { .. } => (StatusCode::FORBIDDEN, self.to_string()),
            CoreError::Validation { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            CoreError::ClientProvider { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            CoreError::TransientProvider { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
