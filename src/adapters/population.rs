//! Population density grid (GeoJSON).
//!
//! The provider is queried with a bounding box expressed in its own CRS and
//! answers with a GeoJSON `FeatureCollection` of grid cells. A named CRS in
//! the payload takes precedence over the configured one.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;

use super::{decode_each, HttpFetcher, SourceAdapter};
use crate::error_handling::{InfoType, ProviderError};
use crate::geo::{BoundingBox, Crs};
use crate::model::{
    Feature, FeatureKind, FeatureValue, Geometry, Position, ProviderId, SourceRecord, Unit,
};

const HECTARES_PER_KM2: f64 = 100.0;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    collection_type: String,
    #[serde(default)]
    crs: Option<NamedCrs>,
    /// Reference date of the whole grid (census or model year)
    #[serde(default)]
    observed_at: Option<DateTime<Utc>>,
    features: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct NamedCrs {
    properties: NamedCrsProperties,
}

#[derive(Debug, Deserialize)]
struct NamedCrsProperties {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GridCell {
    geometry: CellGeometry,
    properties: CellProperties,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum CellGeometry {
    Point([f64; 2]),
    Polygon(Vec<Vec<[f64; 2]>>),
}

#[derive(Debug, Deserialize)]
struct CellProperties {
    density: f64,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    observed_at: Option<DateTime<Utc>>,
}

/// Population density adapter for GeoJSON grid services.
pub struct PopulationGridAdapter {
    http: HttpFetcher,
    crs: Crs,
}

impl PopulationGridAdapter {
    pub(crate) fn new(http: HttpFetcher, crs: Crs) -> Self {
        PopulationGridAdapter { http, crs }
    }

    /// `minx,miny,maxx,maxy` of `bbox` in the provider CRS.
    fn bbox_param(&self, bbox: &BoundingBox) -> String {
        let (min_x, min_y) = self.crs.from_wgs84(&bbox.sw);
        let (max_x, max_y) = self.crs.from_wgs84(&bbox.ne);
        match self.crs {
            Crs::Wgs84 => format!("{:.6},{:.6},{:.6},{:.6}", min_x, min_y, max_x, max_y),
            Crs::WebMercator => format!("{:.1},{:.1},{:.1},{:.1}", min_x, min_y, max_x, max_y),
        }
    }

    async fn fetch_record(
        &self,
        bbox: &BoundingBox,
        deadline: Instant,
    ) -> Result<SourceRecord, ProviderError> {
        let bbox_param = self.bbox_param(bbox);
        let crs_name = self.crs.as_str();

        let payload = self
            .http
            .fetch_json(deadline, |client, url| {
                client
                    .get(url.clone())
                    .query(&[("bbox", bbox_param.as_str()), ("crs", crs_name)])
            })
            .await?;

        let collection: FeatureCollection = serde_json::from_value(payload)
            .map_err(|e| self.http.malformed(format!("not a GeoJSON grid: {}", e)))?;
        if collection.collection_type != "FeatureCollection" {
            return Err(self.http.malformed(format!(
                "expected FeatureCollection, got {}",
                collection.collection_type
            )));
        }

        let crs = match collection.crs {
            Some(named) => Crs::from_name(&named.properties.name).ok_or_else(|| {
                self.http
                    .malformed(format!("unsupported CRS {}", named.properties.name))
            })?,
            None => self.crs,
        };

        let provider = self.http.provider();
        let record = SourceRecord::new(provider.clone(), FeatureKind::PopulationDensity, crs);
        let default_observed = collection.observed_at.unwrap_or(record.fetched_at);

        let (cells, mut dropped) = decode_each::<GridCell>(provider, collection.features);
        let mut features = Vec::with_capacity(cells.len());
        for cell in cells {
            match normalize(provider, cell, default_observed) {
                Some(feature) => features.push(feature),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            log::debug!("{}: dropped {} grid cells", provider, dropped);
            self.http.stats().add_info(InfoType::RecordDropped, dropped);
        }

        Ok(record
            .with_param("bbox", bbox_param)
            .with_param("crs", crs_name)
            .with_features(features, dropped))
    }
}

/// Converts a density in the given unit to people per km².
fn density_per_km2(density: f64, unit: Option<&str>) -> Option<f64> {
    if !density.is_finite() || density < 0.0 {
        return None;
    }
    match unit.unwrap_or("per_km2") {
        "per_km2" | "people/km2" | "km2" => Some(density),
        "per_hectare" | "people/ha" | "ha" => Some(density * HECTARES_PER_KM2),
        _ => None,
    }
}

fn normalize(
    provider: &ProviderId,
    cell: GridCell,
    default_observed: DateTime<Utc>,
) -> Option<Feature> {
    let value = density_per_km2(cell.properties.density, cell.properties.unit.as_deref())?;
    let geometry = match cell.geometry {
        CellGeometry::Point([x, y]) => Geometry::Point(Position(x, y)),
        CellGeometry::Polygon(rings) => {
            let outer = rings.into_iter().next()?;
            if outer.len() < 3 {
                return None;
            }
            Geometry::Polygon(outer.into_iter().map(|[x, y]| Position(x, y)).collect())
        }
    };

    Some(Feature::new(
        FeatureKind::PopulationDensity,
        geometry,
        FeatureValue::Numeric(value),
        Unit::PeoplePerSquareKm,
        provider.clone(),
        cell.properties.observed_at.unwrap_or(default_observed),
    ))
}

impl SourceAdapter for PopulationGridAdapter {
    fn provider_id(&self) -> &ProviderId {
        self.http.provider()
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::PopulationDensity
    }

    fn fetch<'a>(
        &'a self,
        bbox: &'a BoundingBox,
        deadline: Instant,
    ) -> BoxFuture<'a, Result<SourceRecord, ProviderError>> {
        self.fetch_record(bbox, deadline).boxed()
    }
}
