use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::errors::TokenError;

/// Failures surfaced by the route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The e-signature API answered a resource call with a non-success status.
    #[error("e-signature API returned {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
        body: Value,
    },

    #[error("e-signature API call failed: {0}")]
    Transport(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("history store failure: {0}")]
    History(#[source] anyhow::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Token(TokenError::Configuration { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Token(TokenError::Transient(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Token(_) => StatusCode::BAD_GATEWAY,
            ApiError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ApiError::Transport(_) => StatusCode::BAD_GATEWAY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::History(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Value {
        match self {
            ApiError::Token(TokenError::Configuration { missing }) => json!({ "missing": missing }),
            ApiError::Token(TokenError::UpstreamRejected { status, code, body, .. }) => {
                json!({ "status": status, "code": code, "body": body })
            }
            ApiError::Token(TokenError::MalformedResponse { status, body, .. }) => {
                json!({ "status": status, "body": body })
            }
            ApiError::Upstream { status, body, .. } => json!({ "status": status, "body": body }),
            _ => Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        let body = json!({
            "error": self.to_string(),
            "details": self.details(),
        });
        (status, Json(body)).into_response()
    }
}
