//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Server, logging, token lifecycle, upstream and history invariants

use tracing::{error, info};

use crate::config::settings::{
    HistoryConfig, LoggingConfig, ServerConfig, ServiceConfig, TokenSettings, UpstreamConfig,
};
use crate::observability::metrics::get_metrics;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();
    let settings = &cfg.settings;

    validate_server(&settings.server, &mut errors);
    if let Some(logging) = &settings.logging {
        validate_logging(logging, &mut errors);
    }
    if settings.metrics.is_enabled && !settings.metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            settings.metrics.path
        ));
    }
    validate_token(&settings.token, &mut errors);
    validate_upstream(&settings.upstream, &mut errors);
    validate_history(&settings.history, &mut errors);

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().await.config_validation_errors.inc();
        Err(errors)
    }
}

fn validate_server(server: &ServerConfig, errors: &mut Vec<String>) {
    if server.host.trim().is_empty() {
        errors.push("settings.server.host must not be empty".to_string());
    }
    match server.port.parse::<u16>() {
        Ok(0) | Err(_) => errors.push(format!(
            "settings.server.port '{}' must be a port number in 1..=65535",
            server.port
        )),
        Ok(_) => {}
    }
}

fn validate_logging(logging: &LoggingConfig, errors: &mut Vec<String>) {
    if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
        errors.push(format!(
            "settings.logging.level '{}' must be one of {:?}",
            logging.level, LOG_LEVELS
        ));
    }
}

fn validate_token(token: &TokenSettings, errors: &mut Vec<String>) {
    if token.lifetime_ceiling_seconds == 0 {
        errors.push("settings.token.lifetime_ceiling_seconds must be > 0".to_string());
    }
    if token.lifetime_ceiling_seconds >= token.default_lifetime_seconds {
        errors.push(format!(
            "settings.token.lifetime_ceiling_seconds ({}) must be less than default_lifetime_seconds ({})",
            token.lifetime_ceiling_seconds, token.default_lifetime_seconds
        ));
    }
    if token.safety_margin_seconds >= token.default_lifetime_seconds {
        errors.push(format!(
            "settings.token.safety_margin_seconds ({}) leaves no usable token lifetime",
            token.safety_margin_seconds
        ));
    }
    if token.exchange_timeout_ms == 0 {
        errors.push("settings.token.exchange_timeout_ms must be > 0".to_string());
    }
}

fn validate_upstream(upstream: &UpstreamConfig, errors: &mut Vec<String>) {
    if upstream.timeout_ms == 0 {
        errors.push("settings.upstream.timeout_ms must be > 0".to_string());
    }
    if upstream.auth_scheme.trim().is_empty() || upstream.auth_scheme.contains(' ') {
        errors.push(format!(
            "settings.upstream.auth_scheme '{}' must be a single non-empty word",
            upstream.auth_scheme
        ));
    }
}

fn validate_history(history: &HistoryConfig, errors: &mut Vec<String>) {
    if history.path.trim().is_empty() {
        errors.push("settings.history.path must not be empty".to_string());
    }
}
