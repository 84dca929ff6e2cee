//! # Sign Proxy Library
//!
//! Server-side proxy for an e-signature provider's REST API. Every outbound
//! call is authorized with a short-lived OAuth2 access token obtained through
//! one shared, request-coalescing token manager.
//!
//! Modules:
//! - `config`: credential store, YAML settings and their validation
//! - `cache`: access token value and its expiry-tracking cache
//! - `sources`: refresh-token grant exchange with the authorization server
//! - `manager`: cache-or-refresh with single-flight coalescing
//! - `upstream`: e-signature API calls and payload shaping
//! - `history`: append-only log of sent documents
//! - `server`: inbound HTTP routes

pub mod cache;
pub mod config;
pub mod errors;
pub mod history;
pub mod manager;
pub mod observability;
pub mod server;
pub mod sources;
pub mod upstream;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::config::settings::ServiceConfig;
pub use crate::errors::TokenError;
pub use crate::manager::TokenManager;
