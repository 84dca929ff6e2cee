// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};

use crate::cache::token::{AccessToken, RefreshOutcome};
use crate::config::credentials::{ClientCredentials, CredentialConfig};
use crate::errors::TokenError;
use crate::sources::AcquireToken;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

pub fn url(raw: &str) -> Url {
    Url::parse(raw).expect("valid url")
}

pub fn complete_credentials(accounts_base: &str, api_base: &str) -> CredentialConfig {
    CredentialConfig::new(
        Some("client-id".into()),
        Some("client-secret".into()),
        Some("refresh-grant".into()),
        url(accounts_base),
        url(api_base),
    )
}

/// Fake token source: counts exchanges, optionally sleeps and fails the first N.
#[derive(Clone)]
pub struct ScriptedSource {
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
    pub fail_first: usize,
    pub lifetime: Duration,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            fail_first: 0,
            lifetime: Duration::from_secs(3600),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AcquireToken for ScriptedSource {
    fn acquire(
        &self,
        _credentials: &ClientCredentials,
    ) -> impl Future<Output = Result<RefreshOutcome, TokenError>> + Send {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.delay;
        let fail = n <= self.fail_first;
        let lifetime = self.lifetime;
        async move {
            tokio::time::sleep(delay).await;
            if fail {
                Err(TokenError::Transient(format!("scripted failure #{}", n)))
            } else {
                Ok(RefreshOutcome {
                    access_token: AccessToken::new(format!("tok-{}", n)),
                    lifetime,
                    scope: None,
                    api_domain: None,
                })
            }
        }
    }
}
