use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::token::AccessToken;
use crate::cache::token_cache::TokenCache;
use crate::config::credentials::{ClientCredentials, CredentialConfig};
use crate::config::settings::TokenSettings;
use crate::errors::TokenError;
use crate::observability::metrics::get_metrics;
use crate::sources::AcquireToken;

static SUCCESS_MSG: &'static str = "success";

/// Wall-clock source, injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

type RefreshHandle = Shared<BoxFuture<'static, Result<AccessToken, TokenError>>>;

#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub safety_margin: Duration,
    pub lifetime_ceiling: Duration,
    pub exchange_timeout: Duration,
}

impl TokenPolicy {
    pub fn from_settings(settings: &TokenSettings) -> Self {
        Self {
            safety_margin: settings.safety_margin(),
            lifetime_ceiling: settings.lifetime_ceiling(),
            exchange_timeout: settings.exchange_timeout(),
        }
    }

    /// Declared lifetime minus the safety margin; the cache caps it at the ceiling.
    /// A lifetime no longer than the margin keeps half of itself instead of zero.
    pub fn effective_ttl(&self, declared: Duration) -> Duration {
        if declared > self.safety_margin {
            return declared - self.safety_margin;
        }
        let floor = declared / 2;
        warn!(
            "declared token lifetime {:?} does not exceed the safety margin {:?}, caching for {:?}",
            declared, self.safety_margin, floor
        );
        floor
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self::from_settings(&TokenSettings::default())
    }
}

struct ManagerState {
    cache: TokenCache,
    /// at most one refresh exchange at any instant
    in_flight: Option<RefreshHandle>,
}

/// Hands out a currently valid access token to any number of concurrent callers.
///
/// A valid cached token is returned without I/O. Otherwise exactly one refresh
/// exchange runs and every caller arriving meanwhile joins it and receives the
/// same outcome. The exchange runs on its own task, so it completes and clears
/// the in-flight handle even if every waiting caller is dropped.
pub struct TokenManager<A> {
    credentials: Arc<CredentialConfig>,
    acquirer: Arc<A>,
    policy: TokenPolicy,
    clock: Clock,
    state: Arc<Mutex<ManagerState>>,
}

impl<A> TokenManager<A>
where
    A: AcquireToken + Send + Sync + 'static,
{
    pub fn new(credentials: CredentialConfig, acquirer: A, policy: TokenPolicy) -> Self {
        let cache = TokenCache::new(policy.lifetime_ceiling);
        Self {
            credentials: Arc::new(credentials),
            acquirer: Arc::new(acquirer),
            policy,
            clock: Arc::new(Utc::now),
            state: Arc::new(Mutex::new(ManagerState {
                cache,
                in_flight: None,
            })),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn acquire_valid_token(&self) -> Result<AccessToken, TokenError> {
        let credentials = self.credentials.validate().inspect_err(|err| {
            warn!("token requested without complete credentials: {}", err);
        })?;
        let metrics = get_metrics().await;

        let handle = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(token) = state.cache.valid_token((self.clock)()) {
                metrics.token_cache_hits.inc();
                return Ok(token.clone());
            }
            match &state.in_flight {
                Some(handle) => {
                    debug!("joining in-flight token refresh");
                    metrics.token_coalesced_waiters.inc();
                    handle.clone()
                }
                None => {
                    let handle = self.start_refresh(credentials);
                    state.in_flight = Some(handle.clone());
                    handle
                }
            }
        };

        handle.await
    }

    /// Spawn the single exchange and wrap it in a joinable handle.
    /// Must be called with the state lock held, so the handle is published
    /// before the task can clear it.
    fn start_refresh(&self, credentials: ClientCredentials) -> RefreshHandle {
        let acquirer = self.acquirer.clone();
        let shared_state = self.state.clone();
        let clock = self.clock.clone();
        let policy = self.policy.clone();

        let task = tokio::spawn(async move {
            let metrics = get_metrics().await;
            let issued_at = clock();
            let start = Instant::now();
            info!("refreshing access token");

            let result = match tokio::time::timeout(policy.exchange_timeout, acquirer.acquire(&credentials)).await {
                Ok(result) => result,
                Err(_) => Err(TokenError::Transient(format!(
                    "token exchange timed out after {:?}",
                    policy.exchange_timeout
                ))),
            };

            let mut state = shared_state.lock().unwrap_or_else(PoisonError::into_inner);
            let result = match result {
                Ok(outcome) => {
                    state.cache.store(
                        outcome.access_token.clone(),
                        issued_at,
                        policy.effective_ttl(outcome.lifetime),
                    );
                    if let Some(expires_at) = state.cache.expires_at() {
                        metrics.token_expiry_unix.set(expires_at.timestamp());
                        info!(
                            "access token refreshed, valid until {}, api domain {:?}, scope {:?}",
                            expires_at.to_rfc3339(),
                            outcome.api_domain,
                            outcome.scope
                        );
                    }
                    metrics.token_refreshes.with_label_values(&[SUCCESS_MSG]).inc();
                    metrics.token_refresh_duration.with_label_values(&[SUCCESS_MSG]).observe(start.elapsed().as_secs_f64());
                    Ok(outcome.access_token)
                }
                Err(err) => {
                    warn!("access token refresh failed ({}): {}", err.kind(), err);
                    metrics.token_refreshes.with_label_values(&[err.kind()]).inc();
                    metrics.token_refresh_duration.with_label_values(&[err.kind()]).observe(start.elapsed().as_secs_f64());
                    Err(err)
                }
            };
            state.in_flight = None;
            result
        });

        let shared_state = self.state.clone();
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => {
                    // the task never reached its own cleanup
                    shared_state
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .in_flight = None;
                    Err(TokenError::Transient(format!("token refresh task failed: {}", join_err)))
                }
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_ttl_is_strictly_below_declared_lifetime() {
        let policy = TokenPolicy::default();
        let declared = Duration::from_secs(3600);
        let ttl = policy.effective_ttl(declared).min(policy.lifetime_ceiling);
        assert_eq!(ttl, Duration::from_secs(55 * 60));
        assert!(ttl < declared);
    }

    #[test]
    fn short_lifetimes_keep_half_of_declared() {
        let policy = TokenPolicy::default();
        assert_eq!(policy.effective_ttl(Duration::from_secs(60)), Duration::from_secs(30));
        assert_eq!(policy.effective_ttl(Duration::from_secs(300)), Duration::from_secs(150));
        assert_eq!(policy.effective_ttl(Duration::from_secs(301)), Duration::from_secs(1));
        assert_eq!(policy.effective_ttl(Duration::ZERO), Duration::ZERO);
    }
}
