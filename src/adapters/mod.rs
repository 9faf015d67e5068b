//! Provider adapters.
//!
//! Each adapter translates the common [`BoundingBox`] into one provider's
//! query format and normalises the answer into a [`SourceRecord`]. Adapters
//! are stateless apart from their HTTP plumbing; circuit breaking and
//! fan-out live in the orchestrator.
//!
//! Adapters expect non-wrapping boxes. The orchestrator splits boxes that
//! cross the antimeridian before calling [`SourceAdapter::fetch`].

mod elevation;
mod http;
mod infrastructure;
mod population;
mod precipitation;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::config::{AdapterType, AggregatorConfig};
use crate::error_handling::{ConfigError, ProcessingStats, ProviderError};
use crate::geo::BoundingBox;
use crate::model::{FeatureKind, ProviderId, SourceRecord};

pub use elevation::OpenElevationAdapter;
pub use infrastructure::OverpassAdapter;
pub use population::PopulationGridAdapter;
pub use precipitation::OpenMeteoAdapter;

pub(crate) use http::HttpFetcher;

/// One external data provider.
///
/// `fetch` must resolve before `deadline`; implementations bound their own
/// network calls by the remaining budget.
pub trait SourceAdapter: Send + Sync {
    /// Stable provider id used for health tracking and attribution.
    fn provider_id(&self) -> &ProviderId;

    /// The kind of features this provider serves.
    fn kind(&self) -> FeatureKind;

    /// Fetches and normalises the provider's data for `bbox`.
    fn fetch<'a>(
        &'a self,
        bbox: &'a BoundingBox,
        deadline: Instant,
    ) -> BoxFuture<'a, Result<SourceRecord, ProviderError>>;
}

/// Builds one adapter per enabled provider, paired with its call timeout.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if a provider URL cannot be parsed.
pub fn build_adapters(
    config: &AggregatorConfig,
    client: &reqwest::Client,
    stats: &Arc<ProcessingStats>,
) -> Result<Vec<(Arc<dyn SourceAdapter>, Duration)>, ConfigError> {
    let mut adapters: Vec<(Arc<dyn SourceAdapter>, Duration)> = Vec::new();

    for provider in config.enabled_providers() {
        let fetcher = HttpFetcher::new(client.clone(), provider, Arc::clone(stats))?;
        let adapter: Arc<dyn SourceAdapter> = match provider.adapter {
            AdapterType::OpenMeteo => {
                Arc::new(OpenMeteoAdapter::new(fetcher, config.sample_grid_size))
            }
            AdapterType::Overpass => Arc::new(OverpassAdapter::new(fetcher, provider.timeout())),
            AdapterType::PopulationGrid => {
                Arc::new(PopulationGridAdapter::new(fetcher, provider.crs))
            }
            AdapterType::OpenElevation => {
                Arc::new(OpenElevationAdapter::new(fetcher, config.sample_grid_size))
            }
        };
        log::debug!(
            "Registered {} adapter for {} ({}ms timeout)",
            adapter.kind(),
            provider.id,
            provider.timeout_ms
        );
        adapters.push((adapter, provider.timeout()));
    }

    Ok(adapters)
}

/// Decodes each JSON item independently, skipping the ones that don't fit `T`.
///
/// Returns the decoded items and the number skipped.
pub(crate) fn decode_each<T: DeserializeOwned>(
    provider: &ProviderId,
    items: Vec<serde_json::Value>,
) -> (Vec<T>, usize) {
    let (decoded, dropped) = decode_indexed(provider, items);
    (decoded.into_iter().map(|(_, v)| v).collect(), dropped)
}

/// Like [`decode_each`], keeping each item's position in the provider's
/// answer. Point lookups answer in request order.
pub(crate) fn decode_indexed<T: DeserializeOwned>(
    provider: &ProviderId,
    items: Vec<serde_json::Value>,
) -> (Vec<(usize, T)>, usize) {
    let mut decoded = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<T>(item) {
            Ok(v) => decoded.push((index, v)),
            Err(e) => {
                log::debug!("{}: dropping undecodable record: {}", provider, e);
                dropped += 1;
            }
        }
    }
    (decoded, dropped)
}

/// Formats a coordinate for a query string.
pub(crate) fn fmt_coord(v: f64) -> String {
    format!("{:.5}", v)
}
