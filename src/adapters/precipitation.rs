//! Open-Meteo current precipitation.
//!
//! The viewport is sampled as a point grid and sent as one multi-coordinate
//! GET. Open-Meteo answers with an object for a single location and an array
//! for several.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;

use super::{decode_indexed, fmt_coord, HttpFetcher, SourceAdapter};
use crate::error_handling::{InfoType, ProviderError};
use crate::geo::{BoundingBox, Crs, GeoPoint};
use crate::model::{
    Feature, FeatureKind, FeatureValue, Geometry, Position, ProviderId, SourceRecord, Unit,
};

const MM_PER_INCH: f64 = 25.4;

#[derive(Debug, Deserialize)]
struct ForecastLocation {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    current_units: Option<CurrentUnits>,
    current: Option<CurrentConditions>,
}

#[derive(Debug, Deserialize)]
struct CurrentUnits {
    precipitation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    time: i64,
    precipitation: Option<f64>,
}

/// Precipitation adapter for the Open-Meteo forecast API.
pub struct OpenMeteoAdapter {
    http: HttpFetcher,
    grid_size: usize,
}

impl OpenMeteoAdapter {
    pub(crate) fn new(http: HttpFetcher, grid_size: usize) -> Self {
        OpenMeteoAdapter { http, grid_size }
    }

    async fn fetch_record(
        &self,
        bbox: &BoundingBox,
        deadline: Instant,
    ) -> Result<SourceRecord, ProviderError> {
        let points = bbox.sample_grid(self.grid_size);
        let latitudes = join_coords(points.iter().map(|p| p.lat));
        let longitudes = join_coords(points.iter().map(|p| p.lon));

        let payload = self
            .http
            .fetch_json(deadline, |client, url| {
                client.get(url.clone()).query(&[
                    ("latitude", latitudes.as_str()),
                    ("longitude", longitudes.as_str()),
                    ("current", "precipitation"),
                    ("timeformat", "unixtime"),
                ])
            })
            .await?;

        let items = match payload {
            Value::Array(items) => items,
            Value::Object(ref map) if map.get("error") == Some(&Value::Bool(true)) => {
                let reason = map
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("provider reported an error");
                return Err(self.http.malformed(reason));
            }
            obj @ Value::Object(_) => vec![obj],
            other => {
                return Err(self
                    .http
                    .malformed(format!("expected object or array, got {}", other)))
            }
        };

        let provider = self.http.provider();
        let (locations, mut dropped) = decode_indexed::<ForecastLocation>(provider, items);
        let mut features = Vec::with_capacity(locations.len());
        for (index, location) in locations {
            match normalize(provider, location, points.get(index).copied()) {
                Some(feature) => features.push(feature),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            log::debug!("{}: dropped {} precipitation records", provider, dropped);
            self.http.stats().add_info(InfoType::RecordDropped, dropped);
        }

        Ok(
            SourceRecord::new(provider.clone(), FeatureKind::Precipitation, Crs::Wgs84)
                .with_param("latitude", latitudes)
                .with_param("longitude", longitudes)
                .with_param("current", "precipitation")
                .with_features(features, dropped),
        )
    }
}

fn join_coords(values: impl Iterator<Item = f64>) -> String {
    values.map(fmt_coord).collect::<Vec<_>>().join(",")
}

/// Converts one location into a feature in millimetres.
///
/// Open-Meteo snaps every coordinate to its model grid, which may fall outside
/// a small viewport. The feature is placed at the requested sample point and
/// keeps the snapped coordinates as its source position.
fn normalize(
    provider: &ProviderId,
    location: ForecastLocation,
    sampled: Option<GeoPoint>,
) -> Option<Feature> {
    let reported = GeoPoint::new(location.latitude, location.longitude);
    if !reported.is_valid() {
        return None;
    }
    let current = location.current?;
    let raw = current.precipitation?;
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let unit = location
        .current_units
        .and_then(|u| u.precipitation)
        .unwrap_or_else(|| "mm".to_string());
    let mm = match unit.as_str() {
        "mm" => raw,
        "inch" | "in" => raw * MM_PER_INCH,
        _ => return None,
    };
    let observed_at: DateTime<Utc> = DateTime::from_timestamp(current.time, 0)?;

    Some(
        Feature::new(
            FeatureKind::Precipitation,
            Geometry::Point(Position::from(sampled.unwrap_or(reported))),
            FeatureValue::Numeric(mm),
            Unit::Millimetres,
            provider.clone(),
            observed_at,
        )
        .with_source_position(Position::from(reported)),
    )
}

impl SourceAdapter for OpenMeteoAdapter {
    fn provider_id(&self) -> &ProviderId {
        self.http.provider()
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Precipitation
    }

    fn fetch<'a>(
        &'a self,
        bbox: &'a BoundingBox,
        deadline: Instant,
    ) -> BoxFuture<'a, Result<SourceRecord, ProviderError>> {
        self.fetch_record(bbox, deadline).boxed()
    }
}
