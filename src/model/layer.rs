//! Layer and bundle types handed to the dashboard renderer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;

use super::feature::{Feature, FeatureKind, ProviderId};
use crate::geo::BoundingBox;
use crate::visibility::Role;

/// Health of a single layer within a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LayerStatus {
    /// Every provider for the kind answered
    Ok,
    /// Some features were obtained but at least one provider failed
    Degraded,
    /// No features were obtained for the kind
    Unavailable,
}

/// An ordered collection of features of one kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    /// Display name
    pub name: String,
    /// Kind shared by every feature
    pub kind: FeatureKind,
    /// Deduplicated WGS84 features
    pub features: Vec<Feature>,
    /// Providers that contributed data
    pub attribution: Vec<ProviderId>,
    /// When the newest contributing response arrived
    pub refreshed_at: DateTime<Utc>,
    /// Observation time of the oldest contributing feature
    pub oldest_observation: Option<DateTime<Utc>>,
    /// Seconds between composition and the oldest observation
    pub staleness_secs: Option<i64>,
    /// At least one provider for this kind failed, was skipped or abandoned
    pub partial_failure: bool,
    /// Overall health
    pub status: LayerStatus,
}

impl Layer {
    /// Returns `true` if the layer carries no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// The role-visible layers for one viewport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerBundle {
    /// Viewport the bundle was composed for
    pub viewport: BoundingBox,
    /// Role the bundle was filtered for
    pub role: Role,
    /// Visible layers keyed by kind; hidden kinds are absent
    pub layers: BTreeMap<FeatureKind, Layer>,
    /// When the bundle was composed
    pub composed_at: DateTime<Utc>,
    /// Oldest observation across all layers
    pub oldest_observation: Option<DateTime<Utc>>,
}

impl LayerBundle {
    /// The layer for `kind`, if visible.
    pub fn layer(&self, kind: FeatureKind) -> Option<&Layer> {
        self.layers.get(&kind)
    }

    /// Status of the layer for `kind`, if visible.
    pub fn status(&self, kind: FeatureKind) -> Option<LayerStatus> {
        self.layers.get(&kind).map(|l| l.status)
    }

    /// Per-layer health.
    pub fn health(&self) -> BTreeMap<FeatureKind, LayerStatus> {
        self.layers.iter().map(|(k, l)| (*k, l.status)).collect()
    }

    /// Returns `true` when every layer is `ok`.
    pub fn is_healthy(&self) -> bool {
        self.layers.values().all(|l| l.status == LayerStatus::Ok)
    }
}
