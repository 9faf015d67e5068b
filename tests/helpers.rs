// Shared test helpers: scripted provider adapters and service builders.
//
// Integration tests drive the full request path (orchestrator, composer,
// cache) without network access by registering `MockAdapter`s.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::Instant;

use flood_layers::adapters::SourceAdapter;
use flood_layers::config::CircuitBreakerConfig;
use flood_layers::error_handling::ProcessingStats;
use flood_layers::geo::Crs;
use flood_layers::health::ProviderHealth;
use flood_layers::model::{FeatureValue, Geometry, Position, ProviderId, SourceRecord, Unit};
use flood_layers::orchestrator::FetchOrchestrator;
use flood_layers::{AggregatorConfig, BoundingBox, Feature, FeatureKind, LayerService, ProviderError};

/// What a mock provider does when called.
#[allow(dead_code)] // Not every test file uses every behavior
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// Answers with one feature at the viewport centre after `delay`
    Succeed { delay: Duration },
    /// Answers with HTTP 503
    Fail,
    /// Never answers
    Hang,
}

/// A scripted provider that counts its calls.
pub struct MockAdapter {
    id: ProviderId,
    kind: FeatureKind,
    behavior: std::sync::Mutex<Behavior>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockAdapter {
    pub fn new(id: &str, kind: FeatureKind, behavior: Behavior) -> Arc<Self> {
        Arc::new(MockAdapter {
            id: ProviderId::new(id),
            kind,
            behavior: std::sync::Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn ok(id: &str, kind: FeatureKind) -> Arc<Self> {
        Self::new(
            id,
            kind,
            Behavior::Succeed {
                delay: Duration::ZERO,
            },
        )
    }

    /// Number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Changes the behavior of subsequent calls.
    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().expect("behavior lock") = behavior;
    }

    fn unit(&self) -> Unit {
        match self.kind {
            FeatureKind::Precipitation => Unit::Millimetres,
            FeatureKind::PopulationDensity => Unit::PeoplePerSquareKm,
            FeatureKind::Elevation => Unit::Metres,
            FeatureKind::Infrastructure => Unit::Dimensionless,
        }
    }
}

impl SourceAdapter for MockAdapter {
    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    fn kind(&self) -> FeatureKind {
        self.kind
    }

    fn fetch<'a>(
        &'a self,
        bbox: &'a BoundingBox,
        _deadline: Instant,
    ) -> BoxFuture<'a, Result<SourceRecord, ProviderError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().expect("behavior lock");
        async move {
            match behavior {
                Behavior::Succeed { delay } => {
                    tokio::time::sleep(delay).await;
                    let feature = Feature::new(
                        self.kind,
                        Geometry::Point(Position::from(bbox.center())),
                        FeatureValue::Numeric(12.5),
                        self.unit(),
                        self.id.clone(),
                        Utc::now(),
                    );
                    Ok(SourceRecord::new(self.id.clone(), self.kind, Crs::Wgs84)
                        .with_features(vec![feature], 0))
                }
                Behavior::Fail => Err(ProviderError::Unavailable {
                    provider: self.id.clone(),
                    status: Some(503),
                    reason: "HTTP 503 Service Unavailable".into(),
                }),
                Behavior::Hang => {
                    futures::future::pending::<()>().await;
                    unreachable!("pending never resolves")
                }
            }
        }
        .boxed()
    }
}

/// Builds a service whose only providers are `adapters`, each with its timeout.
#[allow(dead_code)]
pub fn service_with(
    config: &AggregatorConfig,
    adapters: &[(Arc<MockAdapter>, Duration)],
) -> LayerService {
    let health = Arc::new(ProviderHealth::new(config.circuit_breaker.clone()));
    let mut orchestrator = FetchOrchestrator::new(health, Arc::new(ProcessingStats::new()));
    for (adapter, timeout) in adapters {
        orchestrator.register(adapter.clone(), *timeout);
    }
    LayerService::new(config, orchestrator)
}

/// Default configuration with a circuit breaker tuned for tests.
#[allow(dead_code)]
pub fn config_with_breaker(failure_threshold: u32, cooldown: Duration) -> AggregatorConfig {
    AggregatorConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold,
            cooldown_ms: cooldown.as_millis() as u64,
        },
        ..AggregatorConfig::default()
    }
}

/// A district-sized viewport in southern Pakistan.
#[allow(dead_code)]
pub fn district_bbox() -> BoundingBox {
    BoundingBox::from_edges(25.30, 68.30, 25.50, 68.50).expect("valid viewport")
}
