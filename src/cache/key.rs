//! Cache key derivation.

use std::collections::BTreeSet;

use crate::geo::{BoundingBox, RoundedBox};
use crate::model::FeatureKind;
use crate::visibility::Role;

/// Identity of a bundle request.
///
/// Viewports that round to the same grain cell share a key, so small pans
/// reuse the cached bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    bbox: RoundedBox,
    role: Role,
    kinds: Vec<FeatureKind>,
}

impl CacheKey {
    /// Builds a key from a viewport snapped to `grain` degrees.
    pub fn new(
        bbox: &BoundingBox,
        grain_degrees: f64,
        role: &Role,
        kinds: &BTreeSet<FeatureKind>,
    ) -> Self {
        CacheKey {
            bbox: bbox.rounded(grain_degrees),
            role: role.clone(),
            kinds: kinds.iter().copied().collect(),
        }
    }

    /// Role the key was built for.
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Sorted kinds.
    pub fn kinds(&self) -> &[FeatureKind] {
        &self.kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds() -> BTreeSet<FeatureKind> {
        BTreeSet::from([FeatureKind::Elevation, FeatureKind::Precipitation])
    }

    #[test]
    fn test_nearby_viewports_share_a_key() {
        let a = BoundingBox::from_edges(24.001, 66.002, 26.0, 68.0).unwrap();
        let b = BoundingBox::from_edges(24.003, 66.001, 26.001, 67.998).unwrap();
        let role = Role::new("district");
        assert_eq!(
            CacheKey::new(&a, 0.01, &role, &kinds()),
            CacheKey::new(&b, 0.01, &role, &kinds())
        );
    }

    #[test]
    fn test_role_and_kinds_distinguish_keys() {
        let bbox = BoundingBox::from_edges(24.0, 66.0, 26.0, 68.0).unwrap();
        let district = CacheKey::new(&bbox, 0.01, &Role::new("district"), &kinds());
        let civilian = CacheKey::new(&bbox, 0.01, &Role::new("civilian"), &kinds());
        let fewer = CacheKey::new(
            &bbox,
            0.01,
            &Role::new("district"),
            &BTreeSet::from([FeatureKind::Elevation]),
        );
        assert_ne!(district, civilian);
        assert_ne!(district, fewer);
        assert_eq!(district.kinds(), &[FeatureKind::Precipitation, FeatureKind::Elevation]);
    }
}
