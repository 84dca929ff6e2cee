use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sign_proxy::config::credentials::CredentialConfig;
use sign_proxy::history::HistoryStore;
use sign_proxy::manager::{TokenManager, TokenPolicy};
use sign_proxy::server;
use sign_proxy::server::server::AppState;
use sign_proxy::sources::RefreshTokenSource;
use sign_proxy::upstream::SignClient;
use sign_proxy::utils::config_loader;
use sign_proxy::utils::logging;
use sign_proxy::utils::logging::LogLevel;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "sign-proxy.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Make preparations
    //
    // read .env, then args
    // -------------------------------

    let dotenv = dotenvy::dotenv();
    let args = Args::parse();

    // -------------------------------
    // 2. Load YAML config
    // -------------------------------

    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level)?;
    if let Ok(path) = dotenv {
        info!("loaded environment from {}", path.display());
    }
    let settings = &service_config.settings;

    // -------------------------------
    // 3. Read credential store
    // -------------------------------

    let credentials = CredentialConfig::from_env()?;
    if let Err(err) = credentials.validate() {
        // not fatal, every token request reports it until fixed
        warn!("{}", err);
    }
    info!("credentials: {:?}", credentials);

    // -------------------------------
    // 4. Create request clients
    // -------------------------------

    // one client for both servers, the exchange timeout is applied by the manager
    let http = SignClient::build_http_client(Duration::from_millis(settings.upstream.timeout_ms))?;

    // -------------------------------
    // 5. Token source and shared manager
    // -------------------------------

    let source = RefreshTokenSource::new(
        http.clone(),
        credentials.token_url()?,
        settings.token.default_lifetime(),
    );
    info!("token endpoint: {}", source.token_url());
    let tokens = Arc::new(TokenManager::new(
        credentials.clone(),
        source,
        TokenPolicy::from_settings(&settings.token),
    ));

    // -------------------------------
    // 6. E-signature client and history store
    // -------------------------------

    let sign = SignClient::new(
        http,
        credentials.api_base_url.clone(),
        credentials.accounts_base_url.clone(),
        settings.upstream.auth_scheme.clone(),
        tokens.clone(),
    );
    let history = HistoryStore::new(&settings.history.path);
    info!("history file: {}", history.path().display());

    // -------------------------------
    // 7. Start http server
    // -------------------------------

    let state = AppState::new(sign, tokens, history, credentials).await;
    info!("Service starting...");
    server::server::start(settings, state).await?;

    Ok(())
}
