//! Layer composition.
//!
//! Turns gathered source records into a role-filtered [`LayerBundle`]:
//! reprojection to WGS84, clipping to the viewport, deduplication, freshness
//! flags and per-layer status.

mod dedupe;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::config::{AggregatorConfig, KindSettings};
use crate::geo::{BoundingBox, Crs};
use crate::model::{
    Feature, FeatureKind, Freshness, Layer, LayerBundle, LayerStatus, Position, ProviderId,
    SourceRecord,
};
use crate::orchestrator::{GatherResult, PartialFailureReport};
use crate::visibility::{Role, VisibilityPolicy};

pub use dedupe::deduplicate;

/// Builds layer bundles from gathered records.
pub struct LayerComposer {
    policy: VisibilityPolicy,
    tolerance_m: f64,
    primaries: HashMap<FeatureKind, ProviderId>,
    kinds: BTreeMap<FeatureKind, KindSettings>,
}

impl LayerComposer {
    /// Creates a composer.
    ///
    /// Kinds missing from `kinds` use [`KindSettings::default_for`].
    pub fn new(
        policy: VisibilityPolicy,
        tolerance_m: f64,
        primaries: HashMap<FeatureKind, ProviderId>,
        kinds: BTreeMap<FeatureKind, KindSettings>,
    ) -> Self {
        LayerComposer {
            policy,
            tolerance_m,
            primaries,
            kinds,
        }
    }

    /// Creates a composer from the aggregation config.
    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self::new(
            config.visibility_policy(),
            config.dedup_tolerance_m,
            config.primary_providers(),
            config.kinds.clone(),
        )
    }

    /// Visibility policy applied to every bundle.
    pub fn policy(&self) -> &VisibilityPolicy {
        &self.policy
    }

    fn settings(&self, kind: FeatureKind) -> KindSettings {
        self.kinds
            .get(&kind)
            .copied()
            .unwrap_or_else(|| KindSettings::default_for(kind))
    }

    /// Composes the bundle for `role` over `viewport`.
    ///
    /// Every requested kind the role may see gets a layer, even when no data
    /// arrived (status `unavailable`). Kinds the role may not see are absent.
    pub fn compose(
        &self,
        viewport: &BoundingBox,
        role: &Role,
        kinds: &BTreeSet<FeatureKind>,
        mut gathered: GatherResult,
        now: DateTime<Utc>,
    ) -> LayerBundle {
        let mut layers = BTreeMap::new();

        for kind in kinds {
            if !self.policy.is_visible(role, *kind) {
                log::trace!("{} hidden from role {}", kind, role);
                continue;
            }
            let records = gathered.records.remove(kind).unwrap_or_default();
            let layer = self.compose_layer(viewport, *kind, records, &gathered.report, now);
            layers.insert(*kind, layer);
        }

        let oldest_observation = layers.values().filter_map(|l| l.oldest_observation).min();

        LayerBundle {
            viewport: *viewport,
            role: role.clone(),
            layers,
            composed_at: now,
            oldest_observation,
        }
    }

    fn compose_layer(
        &self,
        viewport: &BoundingBox,
        kind: FeatureKind,
        records: Vec<SourceRecord>,
        report: &PartialFailureReport,
        now: DateTime<Utc>,
    ) -> Layer {
        let refreshed_at = records.iter().map(|r| r.fetched_at).max().unwrap_or(now);
        let mut candidates = Vec::new();
        let mut rejected = 0usize;

        for record in records {
            for feature in record.features {
                match reproject_and_clip(feature, record.crs, viewport) {
                    Some(f) => candidates.push(f),
                    None => rejected += 1,
                }
            }
        }
        if rejected > 0 {
            log::debug!(
                "{}: {} features outside the viewport or not reprojectable",
                kind,
                rejected
            );
        }

        let attribution: Vec<ProviderId> = candidates
            .iter()
            .map(|f| f.provider.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let stale_after = chrono::Duration::milliseconds(
            i64::try_from(self.settings(kind).stale_after_ms).unwrap_or(i64::MAX),
        );
        let mut features = deduplicate(candidates, self.tolerance_m, self.primaries.get(&kind));
        for feature in &mut features {
            feature.freshness = if now - feature.observed_at > stale_after {
                Freshness::Stale
            } else {
                Freshness::Fresh
            };
        }

        let oldest_observation = features.iter().map(|f| f.observed_at).min();
        let partial_failure = report.kind_failed(kind);
        let status = if features.is_empty() {
            LayerStatus::Unavailable
        } else if partial_failure {
            LayerStatus::Degraded
        } else {
            LayerStatus::Ok
        };

        Layer {
            name: display_name(kind).to_string(),
            kind,
            features,
            attribution,
            refreshed_at,
            oldest_observation,
            staleness_secs: oldest_observation.map(|t| (now - t).num_seconds().max(0)),
            partial_failure,
            status,
        }
    }
}

/// Converts the feature to WGS84 and keeps it only if it touches the viewport.
fn reproject_and_clip(
    mut feature: Feature,
    crs: Crs,
    viewport: &BoundingBox,
) -> Option<Feature> {
    feature.geometry = feature.geometry.to_wgs84(crs)?;
    feature.source_position = feature
        .source_position
        .and_then(|p| crs.to_wgs84(p.0, p.1))
        .map(Position::from);
    let location = feature.location()?;
    viewport.contains(&location).then_some(feature)
}

fn display_name(kind: FeatureKind) -> &'static str {
    match kind {
        FeatureKind::Precipitation => "Precipitation",
        FeatureKind::Infrastructure => "Critical infrastructure",
        FeatureKind::PopulationDensity => "Population density",
        FeatureKind::Elevation => "Elevation",
    }
}
