//! Feature, geometry and source record types.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::geo::{Crs, GeoPoint};

/// The kinds of geospatial information the aggregation layer serves.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum FeatureKind {
    /// Observed precipitation (rain gauges, weather models)
    Precipitation,
    /// Critical infrastructure and points of interest
    Infrastructure,
    /// Population density grid
    PopulationDensity,
    /// Terrain elevation
    Elevation,
}

/// Identifier of an external data provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(Arc<str>);

impl ProviderId {
    /// Creates a provider id.
    pub fn new(id: impl AsRef<str>) -> Self {
        ProviderId(Arc::from(id.as_ref()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        ProviderId::new(id)
    }
}

/// An `(x, y)` coordinate pair in the CRS of the record that carries it.
///
/// After composition every position is WGS84 `(longitude, latitude)`,
/// matching GeoJSON axis order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position(pub f64, pub f64);

impl Position {
    /// Longitude or easting.
    pub fn x(&self) -> f64 {
        self.0
    }

    /// Latitude or northing.
    pub fn y(&self) -> f64 {
        self.1
    }

    /// Interprets a WGS84 position as a point.
    pub fn to_geo_point(&self) -> GeoPoint {
        GeoPoint::new(self.1, self.0)
    }
}

impl From<GeoPoint> for Position {
    fn from(point: GeoPoint) -> Self {
        Position(point.lon, point.lat)
    }
}

/// Feature geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    /// A single position
    Point(Position),
    /// An outer ring; the closing vertex may repeat the first
    Polygon(Vec<Position>),
}

impl Geometry {
    /// A single position standing for the whole geometry.
    ///
    /// Points return themselves; polygons return their vertex centroid.
    pub fn representative(&self) -> Option<Position> {
        match self {
            Geometry::Point(p) => Some(*p),
            Geometry::Polygon(ring) => {
                let vertices = match (ring.first(), ring.last()) {
                    (Some(first), Some(last)) if ring.len() > 1 && first == last => {
                        &ring[..ring.len() - 1]
                    }
                    _ => &ring[..],
                };
                if vertices.is_empty() {
                    return None;
                }
                let n = vertices.len() as f64;
                let (sx, sy) = vertices
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), p| (sx + p.0, sy + p.1));
                Some(Position(sx / n, sy / n))
            }
        }
    }

    /// Converts every position from `crs` into WGS84.
    ///
    /// Returns `None` if any position cannot be converted.
    pub fn to_wgs84(&self, crs: Crs) -> Option<Geometry> {
        let convert = |p: &Position| crs.to_wgs84(p.0, p.1).map(Position::from);
        match self {
            Geometry::Point(p) => convert(p).map(Geometry::Point),
            Geometry::Polygon(ring) => ring
                .iter()
                .map(convert)
                .collect::<Option<Vec<_>>>()
                .filter(|r| r.len() >= 3)
                .map(Geometry::Polygon),
        }
    }
}

/// Feature value: a number or a bag of descriptive attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Numeric measurement in the feature's unit
    Numeric(f64),
    /// Structured attributes (names, categories, tags)
    Attributes(BTreeMap<String, String>),
}

/// Measurement unit of a feature value after normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum Unit {
    /// Millimetres of precipitation
    #[serde(rename = "mm")]
    #[strum(serialize = "mm")]
    Millimetres,
    /// Inhabitants per square kilometre
    #[serde(rename = "people/km2")]
    #[strum(serialize = "people/km2")]
    PeoplePerSquareKm,
    /// Metres above sea level
    #[serde(rename = "m")]
    #[strum(serialize = "m")]
    Metres,
    /// Value carries no unit (attributes)
    #[serde(rename = "none")]
    #[strum(serialize = "none")]
    Dimensionless,
}

/// Whether an observation is still within its kind's freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Freshness {
    /// Observed recently enough to be trusted as current
    Fresh,
    /// Older than the freshness window
    Stale,
}

/// A normalised unit of geospatial information.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    /// Data kind
    pub kind: FeatureKind,
    /// Geometry, in the producing record's CRS until composed
    pub geometry: Geometry,
    /// Measured value or attributes
    pub value: FeatureValue,
    /// Unit of `value`
    pub unit: Unit,
    /// Provider that produced the feature
    pub provider: ProviderId,
    /// When the provider observed the value
    pub observed_at: DateTime<Utc>,
    /// Freshness relative to the kind's window
    pub freshness: Freshness,
    /// Position the provider reported for a sampled value when the geometry
    /// is the requested sample point
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_position: Option<Position>,
}

impl Feature {
    /// Creates a fresh feature.
    pub fn new(
        kind: FeatureKind,
        geometry: Geometry,
        value: FeatureValue,
        unit: Unit,
        provider: ProviderId,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Feature {
            kind,
            geometry,
            value,
            unit,
            provider,
            observed_at,
            freshness: Freshness::Fresh,
            source_position: None,
        }
    }

    /// Records the provider's own coordinates for a sampled value.
    pub fn with_source_position(mut self, position: Position) -> Self {
        self.source_position = Some(position);
        self
    }

    /// Representative WGS84 location; only meaningful after composition.
    ///
    /// Elevation features carry their height on the returned point.
    pub fn location(&self) -> Option<GeoPoint> {
        let point = self.geometry.representative()?.to_geo_point();
        match (self.kind, &self.value) {
            (FeatureKind::Elevation, FeatureValue::Numeric(metres)) => {
                Some(point.with_elevation(*metres))
            }
            _ => Some(point),
        }
    }

    /// The numeric value, if this feature carries one.
    pub fn numeric_value(&self) -> Option<f64> {
        match self.value {
            FeatureValue::Numeric(v) => Some(v),
            FeatureValue::Attributes(_) => None,
        }
    }
}

/// One provider response, normalised into features but not yet reprojected.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    /// Provider that produced the record
    pub provider: ProviderId,
    /// Kind of every feature in the record
    pub kind: FeatureKind,
    /// When the response was received
    pub fetched_at: DateTime<Utc>,
    /// Query parameters sent to the provider
    pub params: BTreeMap<String, String>,
    /// CRS of the feature coordinates
    pub crs: Crs,
    /// Normalised features
    pub features: Vec<Feature>,
    /// Provider records dropped as unknown or malformed
    pub dropped: usize,
}

impl SourceRecord {
    /// Starts an empty record fetched now.
    pub fn new(provider: ProviderId, kind: FeatureKind, crs: Crs) -> Self {
        SourceRecord {
            provider,
            kind,
            fetched_at: Utc::now(),
            params: BTreeMap::new(),
            crs,
            features: Vec::new(),
            dropped: 0,
        }
    }

    /// Records a request parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Attaches the normalised features and the count of dropped records.
    pub fn with_features(mut self, features: Vec<Feature>, dropped: usize) -> Self {
        self.features = features;
        self.dropped = dropped;
        self
    }
}
