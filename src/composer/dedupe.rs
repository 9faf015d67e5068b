//! Deterministic spatial deduplication.
//!
//! Features are ranked (newest first, then primary provider, provider id,
//! coordinates, value) and kept greedily: a feature survives unless a
//! higher-ranked survivor lies within the tolerance. Because the ranking is a
//! total order over distinguishable features, the result does not depend on
//! input order.

use std::cmp::Ordering;

use crate::geo::{haversine_m, GeoPoint};
use crate::model::{Feature, FeatureValue, ProviderId};

fn compare_values(a: &FeatureValue, b: &FeatureValue) -> Ordering {
    match (a, b) {
        (FeatureValue::Numeric(x), FeatureValue::Numeric(y)) => x.total_cmp(y),
        (FeatureValue::Numeric(_), FeatureValue::Attributes(_)) => Ordering::Less,
        (FeatureValue::Attributes(_), FeatureValue::Numeric(_)) => Ordering::Greater,
        (FeatureValue::Attributes(x), FeatureValue::Attributes(y)) => x.cmp(y),
    }
}

/// Ranks `a` before `b` when `a` should win a collision.
fn rank(a: &(Feature, GeoPoint), b: &(Feature, GeoPoint), primary: Option<&ProviderId>) -> Ordering {
    let (fa, pa) = a;
    let (fb, pb) = b;
    let is_primary = |f: &Feature| primary.is_some_and(|p| *p == f.provider);

    fb.observed_at
        .cmp(&fa.observed_at)
        .then_with(|| is_primary(fb).cmp(&is_primary(fa)))
        .then_with(|| fa.provider.cmp(&fb.provider))
        .then_with(|| pa.lon.total_cmp(&pb.lon))
        .then_with(|| pa.lat.total_cmp(&pb.lat))
        .then_with(|| compare_values(&fa.value, &fb.value))
}

/// Collapses features whose representative points lie within `tolerance_m`.
///
/// Features without a representative point are dropped. The survivors are
/// returned in rank order.
pub fn deduplicate(
    features: Vec<Feature>,
    tolerance_m: f64,
    primary: Option<&ProviderId>,
) -> Vec<Feature> {
    let mut located: Vec<(Feature, GeoPoint)> = features
        .into_iter()
        .filter_map(|f| f.location().map(|p| (f, p)))
        .collect();
    located.sort_by(|a, b| rank(a, b, primary));

    let mut kept: Vec<(Feature, GeoPoint)> = Vec::with_capacity(located.len());
    for (feature, point) in located {
        let collides = kept
            .iter()
            .any(|(_, survivor)| haversine_m(survivor, &point) <= tolerance_m);
        if !collides {
            kept.push((feature, point));
        }
    }

    kept.into_iter().map(|(f, _)| f).collect()
}
