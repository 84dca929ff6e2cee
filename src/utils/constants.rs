//! Shared constants and invariants

pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 300;
pub const DEFAULT_LIFETIME_CEILING_SECS: u64 = 55 * 60;
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 60 * 60;
pub const DEFAULT_EXCHANGE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_AUTH_SCHEME: &str = "Zoho-oauthtoken";
pub const DEFAULT_HISTORY_PATH: &str = "data/sent_requests.json";

// Credential store
pub const ENV_CLIENT_ID: &str = "ZOHO_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "ZOHO_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "ZOHO_REFRESH_TOKEN";
pub const ENV_ACCOUNTS_BASE: &str = "ZOHO_ACCOUNTS_BASE";
pub const ENV_SIGN_BASE: &str = "ZOHO_SIGN_BASE";

pub const DEFAULT_ACCOUNTS_BASE: &str = "https://accounts.zoho.com";
pub const DEFAULT_SIGN_BASE: &str = "https://sign.zoho.com";

pub const TOKEN_PATH: &str = "/oauth/v2/token";
