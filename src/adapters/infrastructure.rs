//! Overpass API infrastructure query.
//!
//! Critical facilities (hospitals, shelters, schools, emergency services) are
//! fetched with a single bounding-box Overpass QL query. Ways and relations
//! are reduced to their centre point with `out center`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;

use super::{decode_each, fmt_coord, HttpFetcher, SourceAdapter};
use crate::error_handling::{InfoType, ProviderError};
use crate::geo::{BoundingBox, Crs, GeoPoint};
use crate::model::{
    Feature, FeatureKind, FeatureValue, Geometry, Position, ProviderId, SourceRecord, Unit,
};

/// `amenity` / `emergency` values treated as flood-relevant infrastructure.
const AMENITIES: &str = "hospital|clinic|school|shelter|fire_station|police|townhall";
const EMERGENCY: &str = "assembly_point|shelter";

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    osm3s: Option<OverpassMeta>,
    elements: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct OverpassMeta {
    timestamp_osm_base: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    element_type: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

/// Infrastructure adapter for Overpass API endpoints.
pub struct OverpassAdapter {
    http: HttpFetcher,
    server_timeout: Duration,
}

impl OverpassAdapter {
    pub(crate) fn new(http: HttpFetcher, timeout: Duration) -> Self {
        OverpassAdapter {
            http,
            server_timeout: timeout,
        }
    }

    /// Overpass QL for the facilities inside `bbox`.
    fn query(&self, bbox: &BoundingBox) -> String {
        let area = format!(
            "{},{},{},{}",
            fmt_coord(bbox.south()),
            fmt_coord(bbox.west()),
            fmt_coord(bbox.north()),
            fmt_coord(bbox.east())
        );
        let secs = self.server_timeout.as_secs().max(1);
        format!(
            "[out:json][timeout:{secs}];(\
             nwr[\"amenity\"~\"^({AMENITIES})$\"]({area});\
             nwr[\"emergency\"~\"^({EMERGENCY})$\"]({area});\
             );out center tags;"
        )
    }

    async fn fetch_record(
        &self,
        bbox: &BoundingBox,
        deadline: Instant,
    ) -> Result<SourceRecord, ProviderError> {
        let query = self.query(bbox);
        let payload = self
            .http
            .fetch_json(deadline, |client, url| {
                client.post(url.clone()).form(&[("data", query.as_str())])
            })
            .await?;

        let response: OverpassResponse = serde_json::from_value(payload)
            .map_err(|e| self.http.malformed(format!("not an Overpass result: {}", e)))?;

        let provider = self.http.provider();
        let record = SourceRecord::new(provider.clone(), FeatureKind::Infrastructure, Crs::Wgs84);
        let observed_at = response
            .osm3s
            .and_then(|m| m.timestamp_osm_base)
            .unwrap_or(record.fetched_at);

        let (elements, mut dropped) = decode_each::<OverpassElement>(provider, response.elements);
        let mut features = Vec::with_capacity(elements.len());
        for element in elements {
            match normalize(provider, element, observed_at) {
                Some(feature) => features.push(feature),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            self.http.stats().add_info(InfoType::RecordDropped, dropped);
        }
        log::debug!(
            "{}: {} facilities in {} ({} dropped)",
            provider,
            features.len(),
            bbox_label(bbox),
            dropped
        );

        Ok(record.with_param("data", query).with_features(features, dropped))
    }
}

fn bbox_label(bbox: &BoundingBox) -> String {
    format!(
        "[{:.3},{:.3},{:.3},{:.3}]",
        bbox.south(),
        bbox.west(),
        bbox.north(),
        bbox.east()
    )
}

fn normalize(
    provider: &ProviderId,
    element: OverpassElement,
    observed_at: DateTime<Utc>,
) -> Option<Feature> {
    let point = match (element.lat, element.lon, &element.center) {
        (Some(lat), Some(lon), _) => GeoPoint::new(lat, lon),
        (_, _, Some(center)) => GeoPoint::new(center.lat, center.lon),
        _ => return None,
    };
    if !point.is_valid() || element.tags.is_empty() {
        return None;
    }

    let mut attributes = element.tags;
    attributes.insert("osm_type".into(), element.element_type);
    attributes.insert("osm_id".into(), element.id.to_string());

    Some(Feature::new(
        FeatureKind::Infrastructure,
        Geometry::Point(Position::from(point)),
        FeatureValue::Attributes(attributes),
        Unit::Dimensionless,
        provider.clone(),
        observed_at,
    ))
}

impl SourceAdapter for OverpassAdapter {
    fn provider_id(&self) -> &ProviderId {
        self.http.provider()
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Infrastructure
    }

    fn fetch<'a>(
        &'a self,
        bbox: &'a BoundingBox,
        deadline: Instant,
    ) -> BoxFuture<'a, Result<SourceRecord, ProviderError>> {
        self.fetch_record(bbox, deadline).boxed()
    }
}
