//! HTTP client initialization.
//!
//! This module builds the single `reqwest::Client` shared by every provider
//! adapter, so connection pools are reused across requests.

use std::time::Duration;

use crate::config::{AggregatorConfig, POOL_IDLE_TIMEOUT_SECS, TCP_CONNECT_TIMEOUT_SECS};
use reqwest::ClientBuilder;

/// Initializes the shared HTTP client.
///
/// Creates a `reqwest::Client` configured with:
/// - User-Agent header from the configuration
/// - TCP connect timeout (`TCP_CONNECT_TIMEOUT_SECS`)
/// - Idle pool timeout (`POOL_IDLE_TIMEOUT_SECS`)
/// - Rustls TLS backend (no native TLS)
///
/// No global request timeout is set: every adapter call carries its own
/// deadline-derived timeout.
///
/// # Errors
///
/// Returns a `reqwest::Error` if client creation fails.
pub fn init_client(config: &AggregatorConfig) -> Result<reqwest::Client, reqwest::Error> {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(TCP_CONNECT_TIMEOUT_SECS))
        .pool_idle_timeout(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS))
        .user_agent(config.user_agent.clone())
        .use_rustls_tls()
        .build()
}
