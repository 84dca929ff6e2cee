//! Upstream callers of the e-signature REST API.

pub mod errors;
pub mod payload;
pub mod sign_client;

pub use errors::ApiError;
pub use sign_client::{SharedTokenManager, SignClient};
