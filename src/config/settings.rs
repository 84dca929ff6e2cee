use serde::Deserialize;
use std::time::Duration;

use crate::utils::constants::*;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SettingsConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub token: TokenSettings,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            is_enabled: false,
        }
    }
}

/// ================================
/// Token lifecycle
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct TokenSettings {
    /// upper bound on how long a cached token is served
    /// invariant: < default_lifetime_seconds
    #[serde(default = "default_lifetime_ceiling")]
    pub lifetime_ceiling_seconds: u64,
    /// subtracted from the declared lifetime before the ceiling applies
    #[serde(default = "default_safety_margin")]
    pub safety_margin_seconds: u64,
    /// assumed lifetime when the authorization server declares none
    #[serde(default = "default_lifetime")]
    pub default_lifetime_seconds: u64,
    /// bound on a single refresh exchange
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_ms: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            lifetime_ceiling_seconds: default_lifetime_ceiling(),
            safety_margin_seconds: default_safety_margin(),
            default_lifetime_seconds: default_lifetime(),
            exchange_timeout_ms: default_exchange_timeout(),
        }
    }
}

impl TokenSettings {
    pub fn lifetime_ceiling(&self) -> Duration {
        Duration::from_secs(self.lifetime_ceiling_seconds)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_seconds)
    }

    pub fn default_lifetime(&self) -> Duration {
        Duration::from_secs(self.default_lifetime_seconds)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }
}

/// ================================
/// E-signature API calls
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_timeout")]
    pub timeout_ms: u64,
    /// scheme of the `Authorization` header
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_upstream_timeout(),
            auth_scheme: default_auth_scheme(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> String {
    "3000".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_lifetime_ceiling() -> u64 {
    DEFAULT_LIFETIME_CEILING_SECS
}

fn default_safety_margin() -> u64 {
    DEFAULT_SAFETY_MARGIN_SECS
}

fn default_lifetime() -> u64 {
    DEFAULT_TOKEN_LIFETIME_SECS
}

fn default_exchange_timeout() -> u64 {
    DEFAULT_EXCHANGE_TIMEOUT_MS
}

fn default_upstream_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}

fn default_auth_scheme() -> String {
    DEFAULT_AUTH_SCHEME.to_string()
}

fn default_history_path() -> String {
    DEFAULT_HISTORY_PATH.to_string()
}
