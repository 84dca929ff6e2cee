//! Credential store: client identity, long-lived refresh grant and endpoint roots.
//!
//! Sourced from the process environment at startup and read-only afterwards.

use anyhow::{anyhow, Result};
use reqwest::Url;
use serde::Serialize;
use std::{env, fmt};

use crate::errors::TokenError;
use crate::utils::constants::*;

#[derive(Clone)]
pub struct CredentialConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    /// authorization server root, e.g. https://accounts.zoho.eu
    pub accounts_base_url: Url,
    /// resource API root; must be the same regional deployment as `accounts_base_url`
    pub api_base_url: Url,
}

/// Complete credentials, only obtainable through [`CredentialConfig::validate`].
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Which credential fields are set, never their values.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialPresence {
    pub client_id: bool,
    pub client_secret: bool,
    pub refresh_token: bool,
}

impl CredentialConfig {
    pub fn new(
        client_id: Option<String>,
        client_secret: Option<String>,
        refresh_token: Option<String>,
        accounts_base_url: Url,
        api_base_url: Url,
    ) -> Self {
        Self {
            client_id: non_empty(client_id),
            client_secret: non_empty(client_secret),
            refresh_token: non_empty(refresh_token),
            accounts_base_url,
            api_base_url,
        }
    }

    /// Missing secrets are not an error here, token acquisition reports them.
    /// A malformed endpoint base is.
    pub fn from_env() -> Result<Self> {
        let accounts_base_url = base_url_from_env(ENV_ACCOUNTS_BASE, DEFAULT_ACCOUNTS_BASE)?;
        let api_base_url = base_url_from_env(ENV_SIGN_BASE, DEFAULT_SIGN_BASE)?;
        Ok(Self::new(
            env::var(ENV_CLIENT_ID).ok(),
            env::var(ENV_CLIENT_SECRET).ok(),
            env::var(ENV_REFRESH_TOKEN).ok(),
            accounts_base_url,
            api_base_url,
        ))
    }

    /// All three credential fields or a configuration error naming every missing one.
    pub fn validate(&self) -> Result<ClientCredentials, TokenError> {
        match (&self.client_id, &self.client_secret, &self.refresh_token) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(ClientCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                refresh_token: refresh_token.clone(),
            }),
            _ => {
                let presence = self.presence();
                let missing = [
                    (ENV_CLIENT_ID, presence.client_id),
                    (ENV_CLIENT_SECRET, presence.client_secret),
                    (ENV_REFRESH_TOKEN, presence.refresh_token),
                ]
                .into_iter()
                .filter(|(_, present)| !present)
                .map(|(name, _)| name)
                .collect();
                Err(TokenError::Configuration { missing })
            }
        }
    }

    pub fn presence(&self) -> CredentialPresence {
        CredentialPresence {
            client_id: self.client_id.is_some(),
            client_secret: self.client_secret.is_some(),
            refresh_token: self.refresh_token.is_some(),
        }
    }

    pub fn token_url(&self) -> Result<Url> {
        join_base(&self.accounts_base_url, TOKEN_PATH)
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("presence", &self.presence())
            .field("accounts_base_url", &self.accounts_base_url.as_str())
            .field("api_base_url", &self.api_base_url.as_str())
            .finish()
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Append an absolute path to a base that may itself carry a path prefix.
pub fn join_base(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| anyhow!("invalid url '{}': {}", joined, e))
}

fn base_url_from_env(var: &str, default: &str) -> Result<Url> {
    let raw = non_empty(env::var(var).ok()).unwrap_or_else(|| default.to_owned());
    Url::parse(&raw).map_err(|e| anyhow!("{} '{}' is not a valid url: {}", var, raw, e))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://accounts.zoho.com").unwrap()
    }

    #[test]
    fn complete_credentials_validate() {
        let cfg = CredentialConfig::new(
            Some("id".into()),
            Some("secret".into()),
            Some("refresh".into()),
            base(),
            base(),
        );
        let creds = cfg.validate().unwrap();
        assert_eq!(creds.client_id, "id");
        assert!(!format!("{:?}", creds).contains("secret\""));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let cfg = CredentialConfig::new(Some("id".into()), Some("  ".into()), None, base(), base());
        match cfg.validate() {
            Err(TokenError::Configuration { missing }) => {
                assert_eq!(missing, vec![ENV_CLIENT_SECRET, ENV_REFRESH_TOKEN]);
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn token_url_respects_base_path() {
        let cfg = CredentialConfig::new(
            None,
            None,
            None,
            Url::parse("http://127.0.0.1:8080/mock/").unwrap(),
            base(),
        );
        assert_eq!(
            cfg.token_url().unwrap().as_str(),
            "http://127.0.0.1:8080/mock/oauth/v2/token"
        );
    }
}
