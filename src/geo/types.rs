//! Point and bounding box types.

use serde::{Deserialize, Serialize};

use crate::error_handling::RequestError;

/// A WGS84 position in decimal degrees with an optional elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, [-90, 90]
    pub lat: f64,
    /// Longitude in degrees, [-180, 180]
    pub lon: f64,
    /// Elevation above sea level in metres, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_m: Option<f64>,
}

impl GeoPoint {
    /// Creates a point without elevation.
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint {
            lat,
            lon,
            elevation_m: None,
        }
    }

    /// Returns a copy of this point carrying the given elevation.
    pub fn with_elevation(mut self, elevation_m: f64) -> Self {
        self.elevation_m = Some(elevation_m);
        self
    }

    /// Returns `true` when latitude and longitude are finite and in range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A map viewport given by its south-west and north-east corners.
///
/// When `sw.lon > ne.lon` the box crosses the antimeridian and covers the two
/// longitude ranges `[sw.lon, 180]` and `[-180, ne.lon]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// South-west corner
    pub sw: GeoPoint,
    /// North-east corner
    pub ne: GeoPoint,
}

impl BoundingBox {
    /// Builds a validated bounding box.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidViewport` if either corner is out of range
    /// or the south-west latitude lies north of the north-east latitude.
    pub fn new(sw: GeoPoint, ne: GeoPoint) -> Result<Self, RequestError> {
        let bbox = BoundingBox { sw, ne };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Convenience constructor from `(south, west, north, east)` degrees.
    pub fn from_edges(south: f64, west: f64, north: f64, east: f64) -> Result<Self, RequestError> {
        Self::new(GeoPoint::new(south, west), GeoPoint::new(north, east))
    }

    /// Checks the viewport invariants.
    pub fn validate(&self) -> Result<(), RequestError> {
        if !self.sw.is_valid() {
            return Err(RequestError::InvalidViewport(format!(
                "south-west corner ({}, {}) is out of range",
                self.sw.lat, self.sw.lon
            )));
        }
        if !self.ne.is_valid() {
            return Err(RequestError::InvalidViewport(format!(
                "north-east corner ({}, {}) is out of range",
                self.ne.lat, self.ne.lon
            )));
        }
        if self.sw.lat > self.ne.lat {
            return Err(RequestError::InvalidViewport(format!(
                "south latitude {} is north of north latitude {}",
                self.sw.lat, self.ne.lat
            )));
        }
        Ok(())
    }

    /// Southern edge latitude.
    pub fn south(&self) -> f64 {
        self.sw.lat
    }

    /// Western edge longitude.
    pub fn west(&self) -> f64 {
        self.sw.lon
    }

    /// Northern edge latitude.
    pub fn north(&self) -> f64 {
        self.ne.lat
    }

    /// Eastern edge longitude.
    pub fn east(&self) -> f64 {
        self.ne.lon
    }

    /// Returns `true` if the box wraps across the 180° meridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.sw.lon > self.ne.lon
    }

    /// Width of the box in degrees of longitude, accounting for wrap-around.
    pub fn lon_span(&self) -> f64 {
        if self.crosses_antimeridian() {
            (180.0 - self.sw.lon) + (self.ne.lon + 180.0)
        } else {
            self.ne.lon - self.sw.lon
        }
    }

    /// Splits a wrapping box into its two non-wrapping halves.
    ///
    /// A box that does not cross the antimeridian is returned unchanged as the
    /// only element.
    pub fn split_antimeridian(&self) -> Vec<BoundingBox> {
        if !self.crosses_antimeridian() {
            return vec![*self];
        }
        vec![
            BoundingBox {
                sw: self.sw,
                ne: GeoPoint::new(self.ne.lat, 180.0),
            },
            BoundingBox {
                sw: GeoPoint::new(self.sw.lat, -180.0),
                ne: self.ne,
            },
        ]
    }

    /// Returns `true` if the point lies inside the box (edges inclusive).
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if point.lat < self.sw.lat || point.lat > self.ne.lat {
            return false;
        }
        if self.crosses_antimeridian() {
            point.lon >= self.sw.lon || point.lon <= self.ne.lon
        } else {
            point.lon >= self.sw.lon && point.lon <= self.ne.lon
        }
    }

    /// Geometric centre of the box, normalised to [-180, 180].
    pub fn center(&self) -> GeoPoint {
        let lat = (self.sw.lat + self.ne.lat) / 2.0;
        let mut lon = self.sw.lon + self.lon_span() / 2.0;
        if lon > 180.0 {
            lon -= 360.0;
        }
        GeoPoint::new(lat, lon)
    }

    /// Samples an `n` x `n` grid of cell-centre points over a non-wrapping box.
    ///
    /// Callers are expected to split wrapping boxes first; a wrapping box is
    /// sampled over its unwrapped span and normalised back into range.
    pub fn sample_grid(&self, n: usize) -> Vec<GeoPoint> {
        let n = n.max(1);
        let lat_step = (self.ne.lat - self.sw.lat) / n as f64;
        let lon_step = self.lon_span() / n as f64;
        let mut points = Vec::with_capacity(n * n);
        for row in 0..n {
            let lat = self.sw.lat + lat_step * (row as f64 + 0.5);
            for col in 0..n {
                let mut lon = self.sw.lon + lon_step * (col as f64 + 0.5);
                if lon > 180.0 {
                    lon -= 360.0;
                }
                points.push(GeoPoint::new(lat, lon));
            }
        }
        points
    }

    /// Snaps the box to a grid of `grain` degrees for cache keying.
    pub fn rounded(&self, grain: f64) -> RoundedBox {
        let grain = if grain.is_finite() && grain > 0.0 {
            grain
        } else {
            crate::config::CACHE_GRAIN_DEGREES
        };
        let snap = |v: f64| (v / grain).round() as i64;
        RoundedBox {
            south: snap(self.sw.lat),
            west: snap(self.sw.lon),
            north: snap(self.ne.lat),
            east: snap(self.ne.lon),
        }
    }
}

/// A bounding box expressed in whole multiples of the cache grain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoundedBox {
    /// Southern edge, in grain units
    pub south: i64,
    /// Western edge, in grain units
    pub west: i64,
    /// Northern edge, in grain units
    pub north: i64,
    /// Eastern edge, in grain units
    pub east: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_latitude() {
        let result = BoundingBox::from_edges(-91.0, 0.0, 10.0, 10.0);
        assert!(matches!(result, Err(RequestError::InvalidViewport(_))));
    }

    #[test]
    fn test_rejects_inverted_latitudes() {
        let result = BoundingBox::from_edges(20.0, 0.0, 10.0, 10.0);
        assert!(matches!(result, Err(RequestError::InvalidViewport(_))));
    }

    #[test]
    fn test_rejects_non_finite_coordinates() {
        let result = BoundingBox::from_edges(f64::NAN, 0.0, 10.0, 10.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_accepts_antimeridian_box() {
        let bbox = BoundingBox::from_edges(-20.0, 170.0, -10.0, -170.0).unwrap();
        assert!(bbox.crosses_antimeridian());
        assert!((bbox.lon_span() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_antimeridian_yields_two_halves() {
        let bbox = BoundingBox::from_edges(-20.0, 170.0, -10.0, -170.0).unwrap();
        let halves = bbox.split_antimeridian();
        assert_eq!(halves.len(), 2);
        assert_eq!(halves[0].west(), 170.0);
        assert_eq!(halves[0].east(), 180.0);
        assert_eq!(halves[1].west(), -180.0);
        assert_eq!(halves[1].east(), -170.0);
        assert!(halves.iter().all(|h| !h.crosses_antimeridian()));
    }

    #[test]
    fn test_split_leaves_regular_box_alone() {
        let bbox = BoundingBox::from_edges(24.0, 67.0, 28.0, 71.0).unwrap();
        assert_eq!(bbox.split_antimeridian(), vec![bbox]);
    }

    #[test]
    fn test_contains_handles_wrap() {
        let bbox = BoundingBox::from_edges(-20.0, 170.0, -10.0, -170.0).unwrap();
        assert!(bbox.contains(&GeoPoint::new(-15.0, 175.0)));
        assert!(bbox.contains(&GeoPoint::new(-15.0, -175.0)));
        assert!(!bbox.contains(&GeoPoint::new(-15.0, 0.0)));
        assert!(!bbox.contains(&GeoPoint::new(-25.0, 175.0)));
    }

    #[test]
    fn test_center_of_wrapping_box() {
        let bbox = BoundingBox::from_edges(-20.0, 170.0, -10.0, -170.0).unwrap();
        let c = bbox.center();
        assert!((c.lat + 15.0).abs() < 1e-9);
        assert!((c.lon.abs() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_grid_stays_inside() {
        let bbox = BoundingBox::from_edges(24.0, 67.0, 28.0, 71.0).unwrap();
        let points = bbox.sample_grid(3);
        assert_eq!(points.len(), 9);
        assert!(points.iter().all(|p| bbox.contains(p)));
    }

    #[test]
    fn test_small_pans_share_rounded_box() {
        let a = BoundingBox::from_edges(24.001, 67.001, 28.001, 71.001).unwrap();
        let b = BoundingBox::from_edges(24.002, 67.003, 28.002, 71.003).unwrap();
        assert_eq!(a.rounded(0.01), b.rounded(0.01));

        let far = BoundingBox::from_edges(24.2, 67.2, 28.2, 71.2).unwrap();
        assert_ne!(a.rounded(0.01), far.rounded(0.01));
    }
}
