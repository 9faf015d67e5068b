//! Open-Elevation point lookup.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::{decode_indexed, HttpFetcher, SourceAdapter};
use crate::error_handling::{InfoType, ProviderError};
use crate::geo::{BoundingBox, Crs, GeoPoint};
use crate::model::{
    Feature, FeatureKind, FeatureValue, Geometry, Position, ProviderId, SourceRecord, Unit,
};

const METRES_PER_FOOT: f64 = 0.3048;

#[derive(Debug, Serialize)]
struct LookupRequest {
    locations: Vec<LookupLocation>,
}

#[derive(Debug, Serialize)]
struct LookupLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    results: Vec<serde_json::Value>,
    /// Some mirrors report feet for the whole response
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    latitude: f64,
    longitude: f64,
    elevation: f64,
}

/// Elevation adapter for Open-Elevation compatible APIs.
pub struct OpenElevationAdapter {
    http: HttpFetcher,
    grid_size: usize,
}

impl OpenElevationAdapter {
    pub(crate) fn new(http: HttpFetcher, grid_size: usize) -> Self {
        OpenElevationAdapter { http, grid_size }
    }

    async fn fetch_record(
        &self,
        bbox: &BoundingBox,
        deadline: Instant,
    ) -> Result<SourceRecord, ProviderError> {
        let request = LookupRequest {
            locations: bbox
                .sample_grid(self.grid_size)
                .into_iter()
                .map(|p| LookupLocation {
                    latitude: p.lat,
                    longitude: p.lon,
                })
                .collect(),
        };

        let payload = self
            .http
            .fetch_json(deadline, |client, url| client.post(url.clone()).json(&request))
            .await?;

        let response: LookupResponse = serde_json::from_value(payload)
            .map_err(|e| self.http.malformed(format!("not an elevation lookup: {}", e)))?;
        let scale = match response.unit.as_deref() {
            None | Some("m") | Some("metres") | Some("meters") => 1.0,
            Some("ft") | Some("feet") => METRES_PER_FOOT,
            Some(other) => {
                return Err(self
                    .http
                    .malformed(format!("unsupported elevation unit {}", other)))
            }
        };

        let provider = self.http.provider();
        let record = SourceRecord::new(provider.clone(), FeatureKind::Elevation, Crs::Wgs84);
        let (results, mut dropped) = decode_indexed::<LookupResult>(provider, response.results);
        let mut features = Vec::with_capacity(results.len());
        for (index, result) in results {
            let reported = GeoPoint::new(result.latitude, result.longitude);
            if !reported.is_valid() || !result.elevation.is_finite() {
                dropped += 1;
                continue;
            }
            // Results come back in request order; DEM lookups may snap to a cell centre
            let sampled = request
                .locations
                .get(index)
                .map(|l| GeoPoint::new(l.latitude, l.longitude))
                .unwrap_or(reported);
            let metres = result.elevation * scale;
            features.push(
                Feature::new(
                    FeatureKind::Elevation,
                    Geometry::Point(Position::from(sampled)),
                    FeatureValue::Numeric(metres),
                    Unit::Metres,
                    provider.clone(),
                    record.fetched_at,
                )
                .with_source_position(Position::from(reported)),
            );
        }
        if dropped > 0 {
            self.http.stats().add_info(InfoType::RecordDropped, dropped);
        }

        Ok(record
            .with_param("locations", request.locations.len().to_string())
            .with_features(features, dropped))
    }
}

impl SourceAdapter for OpenElevationAdapter {
    fn provider_id(&self) -> &ProviderId {
        self.http.provider()
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Elevation
    }

    fn fetch<'a>(
        &'a self,
        bbox: &'a BoundingBox,
        deadline: Instant,
    ) -> BoxFuture<'a, Result<SourceRecord, ProviderError>> {
        self.fetch_record(bbox, deadline).boxed()
    }
}
