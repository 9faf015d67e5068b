//! Shared HTTP plumbing for provider adapters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reqwest::RequestBuilder;
use tokio::time::Instant;
use tokio_retry::RetryIf;
use url::Url;

use crate::config::ProviderConfig;
use crate::error_handling::{
    categorize_reqwest_error, categorize_status, get_retry_strategy, ConfigError, InfoType,
    ProcessingStats, ProviderError,
};
use crate::model::ProviderId;

/// Sends JSON requests to one provider under a deadline.
pub(crate) struct HttpFetcher {
    client: reqwest::Client,
    provider: ProviderId,
    base_url: Url,
    retries: usize,
    stats: Arc<ProcessingStats>,
}

impl HttpFetcher {
    pub(crate) fn new(
        client: reqwest::Client,
        provider: &ProviderConfig,
        stats: Arc<ProcessingStats>,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&provider.base_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "provider '{}' has invalid base_url '{}': {}",
                provider.id, provider.base_url, e
            ))
        })?;
        Ok(HttpFetcher {
            client,
            provider: provider.provider_id(),
            base_url,
            retries: provider.retry_attempts,
            stats,
        })
    }

    pub(crate) fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub(crate) fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn stats(&self) -> &ProcessingStats {
        &self.stats
    }

    /// Sends the request built by `build` and parses the body as JSON.
    ///
    /// Transient failures (transport errors, 5xx) are retried with
    /// exponential backoff. Each attempt's timeout is the budget left until
    /// `deadline`, and the whole sequence is cut off at `deadline`.
    pub(crate) async fn fetch_json<F>(
        &self,
        deadline: Instant,
        build: F,
    ) -> Result<serde_json::Value, ProviderError>
    where
        F: Fn(&reqwest::Client, &Url) -> RequestBuilder + Sync,
    {
        let budget = deadline.saturating_duration_since(Instant::now());
        let attempts = AtomicUsize::new(0);

        let retrying = RetryIf::start(
            get_retry_strategy(self.retries),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                self.attempt(deadline, &build)
            },
            |e: &ProviderError| {
                let retry = e.is_retriable() && Instant::now() < deadline;
                if retry {
                    log::debug!("{}: retrying after {}", self.provider, e);
                }
                retry
            },
        );

        let result = match tokio::time::timeout_at(deadline, retrying).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: self.provider.clone(),
                after: budget,
            }),
        };

        let retries = attempts.load(Ordering::SeqCst).saturating_sub(1);
        if retries > 0 {
            self.stats.add_info(InfoType::RetryAttempt, retries);
        }
        result
    }

    async fn attempt<F>(
        &self,
        deadline: Instant,
        build: &F,
    ) -> Result<serde_json::Value, ProviderError>
    where
        F: Fn(&reqwest::Client, &Url) -> RequestBuilder,
    {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ProviderError::Timeout {
                provider: self.provider.clone(),
                after: remaining,
            });
        }

        let response = build(&self.client, &self.base_url)
            .timeout(remaining)
            .send()
            .await
            .map_err(|e| categorize_reqwest_error(&self.provider, &e, remaining))?;

        let status = response.status();
        if !status.is_success() {
            return Err(categorize_status(&self.provider, status, response.headers()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| categorize_reqwest_error(&self.provider, &e, remaining))?;

        serde_json::from_slice(&body).map_err(|e| ProviderError::MalformedResponse {
            provider: self.provider.clone(),
            reason: format!("invalid JSON: {}", e),
        })
    }

    /// A malformed-response error for this provider.
    pub(crate) fn malformed(&self, reason: impl Into<String>) -> ProviderError {
        ProviderError::MalformedResponse {
            provider: self.provider.clone(),
            reason: reason.into(),
        }
    }
}
