//! Error categorization and retry strategy.
//!
//! This module maps transport-level failures onto the provider error taxonomy
//! and configures the retry strategy used by the HTTP adapters.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use tokio_retry::strategy::ExponentialBackoff;

use super::types::ProviderError;
use crate::model::ProviderId;

/// Creates an exponential backoff retry strategy.
///
/// Returns a retry strategy configured with:
/// - Initial delay: `RETRY_INITIAL_DELAY_MS` milliseconds
/// - Backoff factor: `RETRY_FACTOR`
/// - Maximum delay: `RETRY_MAX_DELAY_MS` milliseconds
/// - At most `retries` retries after the initial attempt
///
/// Callers still bound the whole sequence by the provider deadline, so a
/// generous strategy never extends a request past its budget.
pub fn get_retry_strategy(retries: usize) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(crate::config::RETRY_INITIAL_DELAY_MS)
        .factor(crate::config::RETRY_FACTOR)
        .max_delay(Duration::from_millis(crate::config::RETRY_MAX_DELAY_MS))
        .take(retries)
}

/// Categorizes a `reqwest::Error` into a `ProviderError`.
///
/// # Arguments
///
/// * `provider` - Provider the request was sent to
/// * `error` - The transport error
/// * `budget` - Time budget the request was running under, reported on timeouts
pub fn categorize_reqwest_error(
    provider: &ProviderId,
    error: &reqwest::Error,
    budget: Duration,
) -> ProviderError {
    if let Some(status) = error.status() {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return ProviderError::RateLimited {
                provider: provider.clone(),
                retry_after: None,
            };
        }
        return ProviderError::Unavailable {
            provider: provider.clone(),
            status: Some(status.as_u16()),
            reason: format!("HTTP {}", status),
        };
    }

    if error.is_timeout() {
        ProviderError::Timeout {
            provider: provider.clone(),
            after: budget,
        }
    } else if error.is_decode() {
        ProviderError::MalformedResponse {
            provider: provider.clone(),
            reason: error.to_string(),
        }
    } else {
        let kind = if error.is_connect() {
            "connect error"
        } else if error.is_redirect() {
            "redirect error"
        } else if error.is_body() {
            "body error"
        } else if error.is_builder() {
            "request builder error"
        } else {
            "request error"
        };
        ProviderError::Unavailable {
            provider: provider.clone(),
            status: None,
            reason: format!("{}: {}", kind, error),
        }
    }
}

/// Categorizes a non-success HTTP status.
///
/// 429 responses, and 503 responses carrying `Retry-After`, are treated as
/// rate limiting; every other status is unavailability.
pub fn categorize_status(
    provider: &ProviderId,
    status: StatusCode,
    headers: &HeaderMap,
) -> ProviderError {
    let retry_after = parse_retry_after(headers);
    let throttled = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::SERVICE_UNAVAILABLE && retry_after.is_some());

    if throttled {
        ProviderError::RateLimited {
            provider: provider.clone(),
            retry_after,
        }
    } else {
        ProviderError::Unavailable {
            provider: provider.clone(),
            status: Some(status.as_u16()),
            reason: format!("HTTP {}", status),
        }
    }
}

/// Reads a delay-seconds `Retry-After` header.
///
/// HTTP-date values are ignored; providers in practice send seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
