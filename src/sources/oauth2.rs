use std::time::Duration;

use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::token::{AccessToken, RefreshOutcome};
use crate::config::credentials::ClientCredentials;
use crate::errors::TokenError;
use crate::sources::AcquireToken;

/// `grant_type=refresh_token` exchange against `{accounts_base}/oauth/v2/token`.
#[derive(Debug, Clone)]
pub struct RefreshTokenSource {
    client: Client,
    token_url: Url,
    default_lifetime: Duration,
}

impl RefreshTokenSource {
    pub fn new(client: Client, token_url: Url, default_lifetime: Duration) -> Self {
        Self {
            client,
            token_url,
            default_lifetime,
        }
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }
}

impl AcquireToken for RefreshTokenSource {
    async fn acquire(&self, credentials: &ClientCredentials) -> Result<RefreshOutcome, TokenError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", credentials.refresh_token.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        info!("token endpoint responded with status {}", status);

        classify_token_response(status, &body, self.default_lifetime)
    }
}

/// Map a token endpoint response to an outcome.
///
/// Success requires both a 2xx status and a non-empty `access_token`.
pub fn classify_token_response(
    status: u16,
    body: &str,
    default_lifetime: Duration,
) -> Result<RefreshOutcome, TokenError> {
    let success = (200..300).contains(&status);
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if !success {
        if status >= 500 || status == 429 {
            warn!("token endpoint unavailable, status {}", status);
            return Err(TokenError::Transient(format!(
                "authorization server returned {}: {}",
                status,
                preview(body)
            )));
        }
        let body_value = parsed.unwrap_or_else(|| Value::String(body.to_owned()));
        return Err(rejected(status, body_value));
    }

    let Some(json) = parsed else {
        return Err(TokenError::MalformedResponse {
            status,
            message: "body is not valid JSON".to_owned(),
            body: body.to_owned(),
        });
    };

    match json.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => {
            let lifetime = declared_lifetime(&json).unwrap_or(default_lifetime);
            debug!("token exchange succeeded, declared lifetime {:?}", lifetime);
            Ok(RefreshOutcome {
                access_token: AccessToken::new(token),
                lifetime,
                scope: json.get("scope").and_then(Value::as_str).map(str::to_owned),
                api_domain: json.get("api_domain").and_then(Value::as_str).map(str::to_owned),
            })
        }
        // HTTP-OK but semantically failed
        _ if json.get("error").is_some() => Err(rejected(status, json)),
        _ => Err(TokenError::MalformedResponse {
            status,
            message: "response carries no access_token".to_owned(),
            body: body.to_owned(),
        }),
    }
}

/// `expires_in_sec` wins over `expires_in` when both carry a usable number.
fn declared_lifetime(json: &Value) -> Option<Duration> {
    lifetime_secs(json.get("expires_in_sec"))
        .or_else(|| lifetime_secs(json.get("expires_in")))
        .map(Duration::from_secs)
}

fn lifetime_secs(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    value.as_u64().or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn rejected(status: u16, body: Value) -> TokenError {
    let code = body.get("error").and_then(Value::as_str).map(str::to_owned);
    let message = body
        .get("message")
        .or_else(|| body.get("error_description"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| code.clone())
        .unwrap_or_else(|| format!("status {}", status));
    TokenError::UpstreamRejected {
        status,
        code,
        message,
        body,
    }
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Duration = Duration::from_secs(3600);

    #[test]
    fn ok_with_token_is_success() {
        let body = r#"{"access_token":"1000.abc","expires_in":3600,"api_domain":"https://www.zohoapis.com","token_type":"Bearer"}"#;
        let outcome = classify_token_response(200, body, DEFAULT).unwrap();
        assert_eq!(outcome.access_token.secret(), "1000.abc");
        assert_eq!(outcome.lifetime, Duration::from_secs(3600));
        assert_eq!(outcome.api_domain.as_deref(), Some("https://www.zohoapis.com"));
    }

    #[test]
    fn ok_with_error_body_is_rejected() {
        let err = classify_token_response(200, r#"{"error":"invalid_grant"}"#, DEFAULT).unwrap_err();
        match err {
            TokenError::UpstreamRejected { status, code, .. } => {
                assert_eq!(status, 200);
                assert_eq!(code.as_deref(), Some("invalid_grant"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn ok_without_token_or_error_is_malformed() {
        let err = classify_token_response(200, r#"{"status":"ok"}"#, DEFAULT).unwrap_err();
        assert!(matches!(err, TokenError::MalformedResponse { status: 200, .. }));

        let err = classify_token_response(200, "<html>oops</html>", DEFAULT).unwrap_err();
        assert!(matches!(err, TokenError::MalformedResponse { .. }));
    }

    #[test]
    fn missing_lifetime_falls_back_to_default() {
        let outcome = classify_token_response(200, r#"{"access_token":"t"}"#, DEFAULT).unwrap();
        assert_eq!(outcome.lifetime, DEFAULT);
    }

    #[test]
    fn unusable_expires_in_sec_falls_back_to_expires_in() {
        let body = r#"{"access_token":"t","expires_in_sec":null,"expires_in":1800}"#;
        let outcome = classify_token_response(200, body, DEFAULT).unwrap();
        assert_eq!(outcome.lifetime, Duration::from_secs(1800));

        let body = r#"{"access_token":"t","expires_in_sec":"abc","expires_in":"1800"}"#;
        let outcome = classify_token_response(200, body, DEFAULT).unwrap();
        assert_eq!(outcome.lifetime, Duration::from_secs(1800));

        let body = r#"{"access_token":"t","expires_in_sec":-5}"#;
        let outcome = classify_token_response(200, body, DEFAULT).unwrap();
        assert_eq!(outcome.lifetime, DEFAULT);
    }

    #[test]
    fn expires_in_sec_wins_when_usable() {
        let body = r#"{"access_token":"t","expires_in_sec":"3000","expires_in":1800}"#;
        let outcome = classify_token_response(200, body, DEFAULT).unwrap();
        assert_eq!(outcome.lifetime, Duration::from_secs(3000));
    }

    #[test]
    fn seconds_field_preferred_over_legacy_millis() {
        let body = r#"{"access_token":"t","expires_in":3600000,"expires_in_sec":3600}"#;
        let outcome = classify_token_response(200, body, DEFAULT).unwrap();
        assert_eq!(outcome.lifetime, Duration::from_secs(3600));
    }

    #[test]
    fn client_errors_are_rejections_server_errors_are_transient() {
        let err = classify_token_response(400, r#"{"error":"invalid_client"}"#, DEFAULT).unwrap_err();
        assert!(matches!(err, TokenError::UpstreamRejected { status: 400, .. }));
        assert!(!err.is_retryable());

        let err = classify_token_response(503, "unavailable", DEFAULT).unwrap_err();
        assert!(err.is_retryable());
    }
}
