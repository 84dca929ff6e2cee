//! Classified failures of the token lifecycle.
//!
//! Every caller that joined the same refresh attempt receives a clone of the
//! same `TokenError`, so the type carries owned diagnostics only.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// One or more of the required credential fields is absent.
    #[error("credentials are not configured, missing: {}", missing.join(", "))]
    Configuration { missing: Vec<&'static str> },

    /// The authorization server answered with an error body.
    #[error("authorization server rejected the refresh exchange ({status}): {message}")]
    UpstreamRejected {
        status: u16,
        code: Option<String>,
        message: String,
        body: Value,
    },

    /// Connection failure, timeout, unavailable upstream. Safe to retry on the next call.
    #[error("token exchange failed: {0}")]
    Transient(String),

    /// HTTP success but the body is not JSON or carries no `access_token`.
    #[error("authorization server returned a malformed response ({status}): {message}")]
    MalformedResponse {
        status: u16,
        message: String,
        body: String,
    },
}

impl TokenError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TokenError::Transient(_))
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Configuration { .. } => "configuration",
            TokenError::UpstreamRejected { .. } => "rejected",
            TokenError::Transient(_) => "transient",
            TokenError::MalformedResponse { .. } => "malformed",
        }
    }
}

impl From<reqwest::Error> for TokenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TokenError::Transient(format!("request timed out: {err}"))
        } else if err.is_connect() {
            TokenError::Transient(format!("connection failed: {err}"))
        } else {
            TokenError::Transient(err.to_string())
        }
    }
}
