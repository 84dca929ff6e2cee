/// Sources module
///
/// Token sources trade the refresh credential for a new access token.
/// A source performs exactly one exchange per call and never touches the cache.

use crate::cache::token::RefreshOutcome;
use crate::config::credentials::ClientCredentials;
use crate::errors::TokenError;

pub mod oauth2;

pub use oauth2::RefreshTokenSource;

pub trait AcquireToken {
    fn acquire(
        &self,
        credentials: &ClientCredentials,
    ) -> impl std::future::Future<Output = Result<RefreshOutcome, TokenError>> + Send;
}
