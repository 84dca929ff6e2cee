use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use crate::cache::token::AccessToken;

/// Most recently obtained access token and the instant it stops being usable.
///
/// Invariant: `access_token` is either absent or was obtained strictly before `expires_at`.
/// No locking of its own, the token manager serializes every mutation.
#[derive(Debug, Clone)]
pub struct TokenCache {
    access_token: Option<AccessToken>,
    expires_at: Option<DateTime<Utc>>,
    lifetime_ceiling: Duration,
}

impl TokenCache {
    pub fn new(lifetime_ceiling: Duration) -> Self {
        Self {
            access_token: None,
            expires_at: None,
            lifetime_ceiling,
        }
    }

    /// true iff a token is present and `now < expires_at`
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.valid_token(now).is_some()
    }

    /// Token if it is still usable at `now`
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<&AccessToken> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) if now < expires_at => Some(token),
            _ => None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Replace the cached token. The lifetime is capped by the configured ceiling.
    pub fn store(&mut self, token: AccessToken, issued_at: DateTime<Utc>, ttl: Duration) {
        let ttl = ttl.min(self.lifetime_ceiling);
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::zero());
        self.access_token = Some(token);
        self.expires_at = Some(issued_at + ttl);
    }
}
