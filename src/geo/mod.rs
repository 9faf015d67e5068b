//! Geographic primitives.
//!
//! This module provides:
//! - WGS84 points and viewport bounding boxes (with antimeridian support)
//! - Coordinate reference system conversion for provider payloads
//! - Great-circle distance used by feature deduplication

mod crs;
mod distance;
mod types;

// Re-export public API
pub use crs::Crs;
pub use distance::haversine_m;
pub use types::{BoundingBox, GeoPoint, RoundedBox};
