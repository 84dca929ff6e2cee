#[cfg(test)]
mod tests {

    use std::path::Path;

    use serial_test::serial;

    use crate::config::proc_loader::{expand_env_vars, file_to_config, parse_config};
    use crate::config::settings::LogFormat;
    use crate::utils::constants::*;
    use crate::ServiceConfig;

    #[tokio::test]
    #[serial]
    async fn repo_config_is_valid() {
        let path = Path::new("sign-proxy.yaml");
        let service_config: ServiceConfig = file_to_config(path)
            .await
            .expect("sign-proxy.yaml must exist in repo root for tests");
        assert_eq!(service_config.settings.token.lifetime_ceiling_seconds, 3300);
        assert!(service_config.settings.metrics.is_enabled);
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let service_config = file_to_config(Path::new("does/not/exist.yaml")).await.unwrap();
        let settings = &service_config.settings;

        assert_eq!(settings.server.port, "3000");
        assert_eq!(settings.token.safety_margin_seconds, DEFAULT_SAFETY_MARGIN_SECS);
        assert_eq!(settings.token.lifetime_ceiling_seconds, DEFAULT_LIFETIME_CEILING_SECS);
        assert_eq!(settings.upstream.auth_scheme, DEFAULT_AUTH_SCHEME);
        assert_eq!(settings.history.path, DEFAULT_HISTORY_PATH);
        let logging = settings.logging.as_ref().unwrap();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, LogFormat::Compact);
    }

    #[tokio::test]
    async fn partial_sections_keep_defaults() {
        let yaml = r#"
settings:
  token:
    exchange_timeout_ms: 2500
  logging:
    level: debug
    format: json
"#;
        let service_config = parse_config(yaml.to_owned()).await.unwrap();
        let token = &service_config.settings.token;
        assert_eq!(token.exchange_timeout_ms, 2500);
        assert_eq!(token.default_lifetime_seconds, DEFAULT_TOKEN_LIFETIME_SECS);
        assert_eq!(service_config.settings.logging.unwrap().format, LogFormat::Json);
    }

    #[tokio::test]
    async fn invalid_config_reports_all_errors() {
        let invalid_yaml = r#"
settings:
  server:
    host: ""
    port: "99999"
  logging:
    level: loud
    format: compact
  token:
    lifetime_ceiling_seconds: 3600
    default_lifetime_seconds: 3600
    exchange_timeout_ms: 0
  upstream:
    auth_scheme: "Zoho oauthtoken"
  history:
    path: " "
"#;
        let err = parse_config(invalid_yaml.to_owned()).await.unwrap_err().to_string();

        assert!(err.starts_with("config is not valid, total errors: 7"), "{}", err);
        assert!(err.contains("settings.server.host"));
        assert!(err.contains("settings.server.port"));
        assert!(err.contains("settings.logging.level 'loud'"));
        assert!(err.contains("lifetime_ceiling_seconds (3600)"));
        assert!(err.contains("exchange_timeout_ms"));
        assert!(err.contains("auth_scheme"));
        assert!(err.contains("settings.history.path"));
    }

    #[tokio::test]
    #[serial]
    async fn env_vars_are_expanded_with_defaults() {
        std::env::set_var("SIGN_PROXY_TEST_PORT", "8088");
        let expanded = expand_env_vars("port: ${SIGN_PROXY_TEST_PORT:3000}\nhost: ${SIGN_PROXY_UNSET_HOST:127.0.0.1}");
        std::env::remove_var("SIGN_PROXY_TEST_PORT");

        assert_eq!(expanded, "port: 8088\nhost: 127.0.0.1");
    }
}
