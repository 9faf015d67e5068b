//! Coordinate reference systems used by provider payloads.

use serde::{Deserialize, Serialize};

use super::types::GeoPoint;

/// WGS84 semi-major axis used by spherical Web Mercator, in metres.
const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// Web Mercator is undefined at the poles; latitudes are clamped to this.
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_78;

/// Coordinate reference system of a provider's coordinates.
///
/// Coordinates are always carried as `(x, y)` pairs: longitude/latitude for
/// WGS84, easting/northing in metres for Web Mercator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Crs {
    /// EPSG:4326 longitude/latitude degrees
    #[default]
    #[serde(rename = "EPSG:4326")]
    Wgs84,
    /// EPSG:3857 spherical Web Mercator metres
    #[serde(rename = "EPSG:3857")]
    WebMercator,
}

impl Crs {
    /// Resolves a CRS from the names providers use in payloads.
    ///
    /// Accepts EPSG codes, OGC URNs and the legacy `EPSG:900913` alias.
    pub fn from_name(name: &str) -> Option<Crs> {
        let normalized = name.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "EPSG:4326" | "URN:OGC:DEF:CRS:EPSG::4326" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84"
            | "CRS84" | "WGS84" => Some(Crs::Wgs84),
            "EPSG:3857" | "URN:OGC:DEF:CRS:EPSG::3857" | "EPSG:900913" => {
                Some(Crs::WebMercator)
            }
            _ => None,
        }
    }

    /// Canonical EPSG name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Crs::Wgs84 => "EPSG:4326",
            Crs::WebMercator => "EPSG:3857",
        }
    }

    /// Converts an `(x, y)` pair in this CRS to a WGS84 point.
    ///
    /// Returns `None` for non-finite input or results outside WGS84 range.
    pub fn to_wgs84(&self, x: f64, y: f64) -> Option<GeoPoint> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let point = match self {
            Crs::Wgs84 => GeoPoint::new(y, x),
            Crs::WebMercator => {
                let lon = (x / WEB_MERCATOR_RADIUS_M).to_degrees();
                let lat = (2.0 * (y / WEB_MERCATOR_RADIUS_M).exp().atan()
                    - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                GeoPoint::new(lat, lon)
            }
        };
        point.is_valid().then_some(point)
    }

    /// Converts a WGS84 point to an `(x, y)` pair in this CRS.
    pub fn from_wgs84(&self, point: &GeoPoint) -> (f64, f64) {
        match self {
            Crs::Wgs84 => (point.lon, point.lat),
            Crs::WebMercator => {
                let lat = point.lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
                let x = WEB_MERCATOR_RADIUS_M * point.lon.to_radians();
                let y = WEB_MERCATOR_RADIUS_M
                    * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
                        .tan()
                        .ln();
                (x, y)
            }
        }
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
