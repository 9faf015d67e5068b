//! Request entry point.
//!
//! [`LayerService`] validates a bundle request, resolves the kinds the role
//! may see, and serves the bundle through the response cache. Only the
//! visible kinds are fetched.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use strum::IntoEnumIterator;

use crate::cache::{CacheKey, CacheStats, ResponseCache};
use crate::composer::LayerComposer;
use crate::config::AggregatorConfig;
use crate::error_handling::{ConfigError, ProcessingStats, RequestError};
use crate::geo::BoundingBox;
use crate::health::{ProviderHealth, ProviderHealthSnapshot};
use crate::model::{FeatureKind, LayerBundle};
use crate::orchestrator::FetchOrchestrator;
use crate::visibility::Role;

/// The aggregation layer behind the dashboard.
///
/// # Examples
///
/// ```no_run
/// use flood_layers::{AggregatorConfig, BoundingBox, FeatureKind, LayerService, Role};
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = AggregatorConfig::default();
/// let client = flood_layers::initialization::init_client(&config)?;
/// let service = LayerService::from_config(&config, &client)?;
///
/// let sindh = BoundingBox::from_edges(23.6, 66.6, 28.5, 71.1)?;
/// let bundle = service
///     .request_layer_bundle(&sindh, &Role::new("district"), &[FeatureKind::Precipitation])
///     .await?;
/// println!("{:?}", bundle.health());
/// # Ok(())
/// # }
/// ```
pub struct LayerService {
    orchestrator: Arc<FetchOrchestrator>,
    composer: Arc<LayerComposer>,
    cache: ResponseCache,
}

impl LayerService {
    /// Assembles a service around an existing orchestrator.
    ///
    /// Kinds no registered provider serves are logged; their layers will
    /// always be `unavailable`.
    pub fn new(config: &AggregatorConfig, orchestrator: FetchOrchestrator) -> Self {
        let served = orchestrator.served_kinds();
        for kind in FeatureKind::iter().filter(|k| !served.contains(k)) {
            log::warn!("No provider registered for {}", kind);
        }
        LayerService {
            orchestrator: Arc::new(orchestrator),
            composer: Arc::new(LayerComposer::from_config(config)),
            cache: ResponseCache::from_config(config),
        }
    }

    /// Builds the full pipeline from configuration and a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is inconsistent.
    pub fn from_config(
        config: &AggregatorConfig,
        client: &reqwest::Client,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let health = Arc::new(ProviderHealth::new(config.circuit_breaker.clone()));
        let stats = Arc::new(ProcessingStats::new());
        let orchestrator = FetchOrchestrator::from_config(config, client, health, stats)?;
        Ok(Self::new(config, orchestrator))
    }

    /// Returns the role-filtered layer bundle for `bbox`.
    ///
    /// Provider failures never fail the request; they show up as `degraded`
    /// or `unavailable` layers.
    ///
    /// # Errors
    ///
    /// - `RequestError::InvalidViewport` for out-of-range or inverted boxes
    /// - `RequestError::UnknownRole` if the role has no visibility entry
    /// - `RequestError::NoKindsRequested` if `kinds` is empty
    pub async fn request_layer_bundle(
        &self,
        bbox: &BoundingBox,
        role: &Role,
        kinds: &[FeatureKind],
    ) -> Result<Arc<LayerBundle>, RequestError> {
        bbox.validate()?;
        let policy = self.composer.policy();
        if !policy.knows_role(role) {
            return Err(RequestError::UnknownRole(role.to_string()));
        }
        if kinds.is_empty() {
            return Err(RequestError::NoKindsRequested);
        }

        let requested: BTreeSet<FeatureKind> = kinds.iter().copied().collect();
        let visible: BTreeSet<FeatureKind> = requested
            .iter()
            .copied()
            .filter(|kind| policy.is_visible(role, *kind))
            .collect();
        log::debug!(
            "Bundle request for role {}: {} requested, {} visible",
            role,
            requested.len(),
            visible.len()
        );

        let key = CacheKey::new(bbox, self.cache.grain_degrees(), role, &requested);
        let viewport = *bbox;
        let compute = || {
            let orchestrator = Arc::clone(&self.orchestrator);
            let composer = Arc::clone(&self.composer);
            let role = role.clone();
            let visible = visible.clone();
            let requested = requested.clone();
            async move {
                let gathered = orchestrator.gather(&viewport, &visible).await;
                for outcome in gathered.report.failures() {
                    log::debug!(
                        "{} / {}: {:?} after {}ms",
                        outcome.kind,
                        outcome.provider,
                        outcome.status,
                        outcome.elapsed.as_millis()
                    );
                }
                composer.compose(&viewport, &role, &requested, gathered, Utc::now())
            }
        };
        let bundle = self.cache.get_or_compute(key, compute).await;

        Ok(bundle)
    }

    /// Per-provider circuit breaker state.
    pub fn health_snapshot(&self) -> Vec<ProviderHealthSnapshot> {
        self.orchestrator.health().snapshot()
    }

    /// Response cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drops expired cache entries.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Provider failure statistics.
    pub fn stats(&self) -> &ProcessingStats {
        self.orchestrator.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> LayerService {
        let config = AggregatorConfig::default();
        LayerService::from_config(&config, &reqwest::Client::new()).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_invalid_viewport() {
        let inverted = BoundingBox {
            sw: crate::geo::GeoPoint::new(30.0, 66.0),
            ne: crate::geo::GeoPoint::new(20.0, 68.0),
        };
        let err = service()
            .request_layer_bundle(&inverted, &Role::new("civilian"), &[FeatureKind::Elevation])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidViewport(_)));
    }

    #[tokio::test]
    async fn test_rejects_unknown_role_and_empty_kinds() {
        let service = service();
        let bbox = BoundingBox::from_edges(24.0, 66.0, 26.0, 68.0).unwrap();
        assert_eq!(
            service
                .request_layer_bundle(&bbox, &Role::new("mayor"), &[FeatureKind::Elevation])
                .await
                .unwrap_err(),
            RequestError::UnknownRole("mayor".into())
        );
        assert_eq!(
            service
                .request_layer_bundle(&bbox, &Role::new("civilian"), &[])
                .await
                .unwrap_err(),
            RequestError::NoKindsRequested
        );
        assert_eq!(service.cache_stats().misses, 0);
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = AggregatorConfig::default();
        config.sample_grid_size = 0;
        assert!(LayerService::from_config(&config, &reqwest::Client::new()).is_err());
    }
}
