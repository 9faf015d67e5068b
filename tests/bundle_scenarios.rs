//! End-to-end bundle requests against scripted providers.
//!
//! These tests exercise the whole request path: visibility filtering,
//! concurrent fan-out with per-provider timeouts, composition, the circuit
//! breaker and the response cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use flood_layers::config::KindSettings;
use flood_layers::{
    AggregatorConfig, BoundingBox, FeatureKind, LayerStatus, RequestError, Role,
};

mod helpers;
use helpers::{config_with_breaker, district_bbox, service_with, Behavior, MockAdapter};

#[tokio::test]
async fn test_slow_precipitation_degrades_only_its_layer() {
    let rain = MockAdapter::new("open-meteo", FeatureKind::Precipitation, Behavior::Hang);
    let terrain = MockAdapter::new(
        "open-elevation",
        FeatureKind::Elevation,
        Behavior::Succeed {
            delay: Duration::from_millis(20),
        },
    );
    let service = service_with(
        &AggregatorConfig::default(),
        &[
            (rain.clone(), Duration::from_millis(150)),
            (terrain.clone(), Duration::from_secs(2)),
        ],
    );

    let started = Instant::now();
    let bundle = service
        .request_layer_bundle(
            &district_bbox(),
            &Role::new("district"),
            &[FeatureKind::Precipitation, FeatureKind::Elevation],
        )
        .await
        .expect("provider failures never fail the request");
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_millis(1500),
        "request should finish once every task is done, took {:?}",
        elapsed
    );
    assert_eq!(
        bundle.status(FeatureKind::Precipitation),
        Some(LayerStatus::Unavailable)
    );
    assert_eq!(bundle.status(FeatureKind::Elevation), Some(LayerStatus::Ok));

    let precipitation = bundle.layer(FeatureKind::Precipitation).unwrap();
    assert!(precipitation.partial_failure);
    assert!(precipitation.features.is_empty());

    let elevation = bundle.layer(FeatureKind::Elevation).unwrap();
    assert_eq!(elevation.features.len(), 1);
    assert_eq!(elevation.attribution.len(), 1);
    assert_eq!(elevation.attribution[0].as_str(), "open-elevation");
    assert!(!bundle.is_healthy());
}

#[tokio::test]
async fn test_all_providers_failing_still_returns_a_bundle() {
    let rain = MockAdapter::new("open-meteo", FeatureKind::Precipitation, Behavior::Fail);
    let osm = MockAdapter::new("overpass", FeatureKind::Infrastructure, Behavior::Fail);
    let service = service_with(
        &AggregatorConfig::default(),
        &[
            (rain.clone(), Duration::from_secs(1)),
            (osm.clone(), Duration::from_secs(1)),
        ],
    );

    let bundle = service
        .request_layer_bundle(
            &district_bbox(),
            &Role::new("civilian"),
            &[FeatureKind::Precipitation, FeatureKind::Infrastructure],
        )
        .await
        .unwrap();

    assert_eq!(bundle.layers.len(), 2);
    for layer in bundle.layers.values() {
        assert_eq!(layer.status, LayerStatus::Unavailable);
        assert!(layer.partial_failure);
    }
    assert_eq!(service.stats().total_errors(), 4);
}

#[tokio::test]
async fn test_latency_is_bounded_by_the_slowest_timeout() {
    let rain = MockAdapter::new("open-meteo", FeatureKind::Precipitation, Behavior::Hang);
    let osm = MockAdapter::new("overpass", FeatureKind::Infrastructure, Behavior::Hang);
    let terrain = MockAdapter::new("open-elevation", FeatureKind::Elevation, Behavior::Hang);
    let service = service_with(
        &AggregatorConfig::default(),
        &[
            (rain, Duration::from_millis(100)),
            (osm, Duration::from_millis(300)),
            (terrain, Duration::from_millis(200)),
        ],
    );

    let started = Instant::now();
    let bundle = service
        .request_layer_bundle(
            &district_bbox(),
            &Role::new("national"),
            &[
                FeatureKind::Precipitation,
                FeatureKind::Infrastructure,
                FeatureKind::Elevation,
            ],
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(290), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1000), "took {:?}", elapsed);
    assert!(bundle
        .layers
        .values()
        .all(|layer| layer.status == LayerStatus::Unavailable));
}

#[tokio::test]
async fn test_hidden_kinds_are_absent_and_never_fetched() {
    let rain = MockAdapter::ok("open-meteo", FeatureKind::Precipitation);
    let population = MockAdapter::ok("population-grid", FeatureKind::PopulationDensity);
    let terrain = MockAdapter::ok("open-elevation", FeatureKind::Elevation);
    let service = service_with(
        &AggregatorConfig::default(),
        &[
            (rain.clone(), Duration::from_secs(1)),
            (population.clone(), Duration::from_secs(1)),
            (terrain.clone(), Duration::from_secs(1)),
        ],
    );

    let bundle = service
        .request_layer_bundle(
            &district_bbox(),
            &Role::new("civilian"),
            &[
                FeatureKind::Precipitation,
                FeatureKind::PopulationDensity,
                FeatureKind::Elevation,
            ],
        )
        .await
        .expect("hidden kinds are not an error");

    assert_eq!(
        bundle.layers.keys().copied().collect::<Vec<_>>(),
        vec![FeatureKind::Precipitation]
    );
    assert_eq!(rain.calls(), 1);
    assert_eq!(population.calls(), 0);
    assert_eq!(terrain.calls(), 0);

    let json = serde_json::to_string(bundle.as_ref()).unwrap();
    assert!(!json.contains("population-density"));
}

#[tokio::test]
async fn test_open_circuit_skips_provider_until_cooldown() {
    let mut config = config_with_breaker(2, Duration::from_millis(300));
    // Unhealthy bundles must not be cached here
    config.cache.degraded_ttl_ms = 0;

    let rain = MockAdapter::new("open-meteo", FeatureKind::Precipitation, Behavior::Fail);
    let terrain = MockAdapter::ok("open-elevation", FeatureKind::Elevation);
    let service = service_with(
        &config,
        &[
            (rain.clone(), Duration::from_secs(1)),
            (terrain.clone(), Duration::from_secs(1)),
        ],
    );
    let kinds = [FeatureKind::Precipitation, FeatureKind::Elevation];
    let role = Role::new("district");

    for _ in 0..2 {
        service
            .request_layer_bundle(&district_bbox(), &role, &kinds)
            .await
            .unwrap();
    }
    assert_eq!(rain.calls(), 2);

    let skipped = service
        .request_layer_bundle(&district_bbox(), &role, &kinds)
        .await
        .unwrap();
    assert_eq!(rain.calls(), 2, "open circuit must not call the provider");
    assert_eq!(
        skipped.status(FeatureKind::Precipitation),
        Some(LayerStatus::Unavailable)
    );
    assert_eq!(skipped.status(FeatureKind::Elevation), Some(LayerStatus::Ok));

    let snapshot = service.health_snapshot();
    let rain_health = snapshot
        .iter()
        .find(|s| s.provider.as_str() == "open-meteo")
        .unwrap();
    assert!(rain_health.circuit_open);
    assert_eq!(rain_health.consecutive_failures, 2);

    rain.set_behavior(Behavior::Succeed {
        delay: Duration::ZERO,
    });
    tokio::time::sleep(Duration::from_millis(350)).await;

    let recovered = service
        .request_layer_bundle(&district_bbox(), &role, &kinds)
        .await
        .unwrap();
    assert_eq!(rain.calls(), 3);
    assert_eq!(
        recovered.status(FeatureKind::Precipitation),
        Some(LayerStatus::Ok)
    );
    assert!(service
        .health_snapshot()
        .iter()
        .all(|s| !s.circuit_open && s.consecutive_failures == 0));
}

#[tokio::test]
async fn test_repeated_request_is_served_from_cache() {
    let rain = MockAdapter::ok("open-meteo", FeatureKind::Precipitation);
    let osm = MockAdapter::ok("overpass", FeatureKind::Infrastructure);
    let service = service_with(
        &AggregatorConfig::default(),
        &[
            (rain.clone(), Duration::from_secs(1)),
            (osm.clone(), Duration::from_secs(1)),
        ],
    );
    let role = Role::new("civilian");
    let kinds = [FeatureKind::Precipitation, FeatureKind::Infrastructure];

    let first = service
        .request_layer_bundle(&district_bbox(), &role, &kinds)
        .await
        .unwrap();
    let second = service
        .request_layer_bundle(&district_bbox(), &role, &kinds)
        .await
        .unwrap();
    // A pan smaller than the cache grain reuses the entry
    let nudged = BoundingBox::from_edges(25.301, 68.301, 25.501, 68.499).unwrap();
    let third = service
        .request_layer_bundle(&nudged, &role, &[FeatureKind::Infrastructure, FeatureKind::Precipitation])
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(rain.calls(), 1);
    assert_eq!(osm.calls(), 1);

    let stats = service.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.entries, 1);
}

#[tokio::test]
async fn test_degraded_bundle_expires_quickly() {
    let mut config = AggregatorConfig::default();
    config.cache.degraded_ttl_ms = 50;
    let rain = MockAdapter::new("open-meteo", FeatureKind::Precipitation, Behavior::Fail);
    let service = service_with(&config, &[(rain.clone(), Duration::from_secs(1))]);
    let role = Role::new("civilian");

    service
        .request_layer_bundle(&district_bbox(), &role, &[FeatureKind::Precipitation])
        .await
        .unwrap();
    service
        .request_layer_bundle(&district_bbox(), &role, &[FeatureKind::Precipitation])
        .await
        .unwrap();
    assert_eq!(rain.calls(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    service
        .request_layer_bundle(&district_bbox(), &role, &[FeatureKind::Precipitation])
        .await
        .unwrap();
    assert_eq!(rain.calls(), 2);
}

#[tokio::test]
async fn test_short_precipitation_ttl_expires_the_whole_bundle() {
    let mut config = AggregatorConfig::default();
    config.kinds.insert(
        FeatureKind::Precipitation,
        KindSettings {
            ttl_ms: 50,
            stale_after_ms: 60_000,
        },
    );
    let rain = MockAdapter::ok("open-meteo", FeatureKind::Precipitation);
    let terrain = MockAdapter::ok("open-elevation", FeatureKind::Elevation);
    let service = service_with(
        &config,
        &[
            (rain.clone(), Duration::from_secs(1)),
            (terrain.clone(), Duration::from_secs(1)),
        ],
    );
    let role = Role::new("district");
    let kinds = [FeatureKind::Precipitation, FeatureKind::Elevation];

    let first = service
        .request_layer_bundle(&district_bbox(), &role, &kinds)
        .await
        .unwrap();
    assert_eq!(first.status(FeatureKind::Precipitation), Some(LayerStatus::Ok));
    assert_eq!(first.status(FeatureKind::Elevation), Some(LayerStatus::Ok));
    service
        .request_layer_bundle(&district_bbox(), &role, &kinds)
        .await
        .unwrap();
    assert_eq!((rain.calls(), terrain.calls()), (1, 1));

    // Elevation alone would still be fresh; the bundle is not.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let refreshed = service
        .request_layer_bundle(&district_bbox(), &role, &kinds)
        .await
        .unwrap();
    assert_eq!((rain.calls(), terrain.calls()), (2, 2));
    assert!(!Arc::ptr_eq(&first, &refreshed));
    assert_eq!(service.cache_stats().misses, 2);
}

#[tokio::test]
async fn test_concurrent_identical_requests_fetch_once() {
    let rain = MockAdapter::new(
        "open-meteo",
        FeatureKind::Precipitation,
        Behavior::Succeed {
            delay: Duration::from_millis(100),
        },
    );
    let service = service_with(
        &AggregatorConfig::default(),
        &[(rain.clone(), Duration::from_secs(2))],
    );
    let role = Role::new("civilian");
    let bbox = district_bbox();

    let requests = (0..8).map(|_| {
        service.request_layer_bundle(&bbox, &role, &[FeatureKind::Precipitation])
    });
    let bundles = futures::future::join_all(requests).await;

    assert_eq!(rain.calls(), 1);
    let first = bundles[0].as_ref().unwrap();
    for bundle in &bundles {
        assert!(Arc::ptr_eq(first, bundle.as_ref().unwrap()));
    }
    let stats = service.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.coalesced, 7);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_fetching() {
    let rain = MockAdapter::ok("open-meteo", FeatureKind::Precipitation);
    let service = service_with(
        &AggregatorConfig::default(),
        &[(rain.clone(), Duration::from_secs(1))],
    );

    let out_of_range = BoundingBox::from_edges(25.0, 68.0, 95.0, 69.0);
    assert!(matches!(out_of_range, Err(RequestError::InvalidViewport(_))));

    let err = service
        .request_layer_bundle(&district_bbox(), &Role::new("journalist"), &[FeatureKind::Precipitation])
        .await
        .unwrap_err();
    assert_eq!(err, RequestError::UnknownRole("journalist".into()));

    let err = service
        .request_layer_bundle(&district_bbox(), &Role::new("civilian"), &[])
        .await
        .unwrap_err();
    assert_eq!(err, RequestError::NoKindsRequested);

    assert_eq!(rain.calls(), 0);
}

#[tokio::test]
async fn test_antimeridian_viewport_queries_both_halves() {
    let rain = MockAdapter::ok("open-meteo", FeatureKind::Precipitation);
    let service = service_with(
        &AggregatorConfig::default(),
        &[(rain.clone(), Duration::from_secs(1))],
    );
    let fiji = BoundingBox::from_edges(-19.0, 177.0, -16.0, -178.0).unwrap();

    let bundle = service
        .request_layer_bundle(&fiji, &Role::new("civilian"), &[FeatureKind::Precipitation])
        .await
        .unwrap();

    assert_eq!(rain.calls(), 2);
    let layer = bundle.layer(FeatureKind::Precipitation).unwrap();
    assert_eq!(layer.status, LayerStatus::Ok);
    assert_eq!(layer.features.len(), 2);
}
