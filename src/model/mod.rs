//! Common record model shared by adapters, composer and cache.
//!
//! Adapters translate provider payloads into [`Feature`]s wrapped in a
//! [`SourceRecord`]; the composer turns those into [`Layer`]s collected in a
//! [`LayerBundle`].

mod feature;
mod layer;

// Re-export public API
pub use feature::{
    Feature, FeatureKind, FeatureValue, Freshness, Geometry, Position, ProviderId, SourceRecord,
    Unit,
};
pub use layer::{Layer, LayerBundle, LayerStatus};
