use std::fmt;
use std::time::Duration;

/// Short-lived bearer credential for the resource API.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header, e.g. `Zoho-oauthtoken 1000.abc`.
    pub fn authorization_value(&self, scheme: &str) -> String {
        format!("{} {}", scheme, self.0)
    }

    /// First characters only, for debug logging.
    pub fn preview(&self) -> String {
        self.0.chars().take(8).collect()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({}…)", self.preview())
    }
}

/// Result of one successful refresh exchange.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub access_token: AccessToken,
    /// declared by the server, or the assumed default when it declares none
    pub lifetime: Duration,
    pub scope: Option<String>,
    pub api_domain: Option<String>,
}
