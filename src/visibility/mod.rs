//! Role-based layer visibility.
//!
//! Visibility is a pure lookup over a static table of role → visible kinds.
//! New roles or kinds only need a table entry; nothing in the fetch or
//! compose pipeline changes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::FeatureKind;

/// A portal role such as `civilian` or `national`.
///
/// Names are trimmed and lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Role(String);

impl Role {
    /// Creates a role from its name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Role(name.as_ref().trim().to_ascii_lowercase())
    }

    /// The normalised role name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        Role::new(name)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.0
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Role::new(name)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role × kind visibility table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityPolicy {
    table: BTreeMap<Role, BTreeSet<FeatureKind>>,
}

impl VisibilityPolicy {
    /// Builds a policy from a role → visible kinds table.
    pub fn from_table<I, K>(table: I) -> Self
    where
        I: IntoIterator<Item = (Role, K)>,
        K: IntoIterator<Item = FeatureKind>,
    {
        VisibilityPolicy {
            table: table
                .into_iter()
                .map(|(role, kinds)| (role, kinds.into_iter().collect()))
                .collect(),
        }
    }

    /// Returns `true` if `role` may see layers of `kind`.
    ///
    /// Unknown roles see nothing.
    pub fn is_visible(&self, role: &Role, kind: FeatureKind) -> bool {
        self.table
            .get(role)
            .is_some_and(|kinds| kinds.contains(&kind))
    }

    /// Returns `true` if `role` has an entry in the table.
    pub fn knows_role(&self, role: &Role) -> bool {
        self.table.contains_key(role)
    }

    /// Kinds visible to `role`, in canonical order.
    pub fn visible_kinds(&self, role: &Role) -> BTreeSet<FeatureKind> {
        self.table.get(role).cloned().unwrap_or_default()
    }

    /// All roles in the table.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.table.keys()
    }
}

impl Default for VisibilityPolicy {
    /// Portal defaults: population density is restricted to provincial and
    /// national authorities; terrain is hidden from the civilian portal.
    fn default() -> Self {
        use FeatureKind::*;
        VisibilityPolicy::from_table([
            (Role::new("civilian"), vec![Precipitation, Infrastructure]),
            (
                Role::new("district"),
                vec![Precipitation, Infrastructure, Elevation],
            ),
            (
                Role::new("provincial"),
                vec![Precipitation, Infrastructure, PopulationDensity, Elevation],
            ),
            (
                Role::new("national"),
                vec![Precipitation, Infrastructure, PopulationDensity, Elevation],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_role_names_are_normalised() {
        assert_eq!(Role::new("  District "), Role::new("district"));
        assert_eq!(Role::new("NATIONAL").as_str(), "national");
    }

    #[test]
    fn test_default_table() {
        let policy = VisibilityPolicy::default();
        let civilian = Role::new("civilian");
        assert!(policy.is_visible(&civilian, FeatureKind::Precipitation));
        assert!(!policy.is_visible(&civilian, FeatureKind::PopulationDensity));
        assert!(!policy.is_visible(&civilian, FeatureKind::Elevation));

        let district = Role::new("district");
        assert!(policy.is_visible(&district, FeatureKind::Elevation));
        assert!(!policy.is_visible(&district, FeatureKind::PopulationDensity));

        let national = Role::new("national");
        for kind in FeatureKind::iter() {
            assert!(policy.is_visible(&national, kind), "{kind} hidden");
        }
    }

    #[test]
    fn test_unknown_role_sees_nothing() {
        let policy = VisibilityPolicy::default();
        let guest = Role::new("guest");
        assert!(!policy.knows_role(&guest));
        for kind in FeatureKind::iter() {
            assert!(!policy.is_visible(&guest, kind));
        }
        assert!(policy.visible_kinds(&guest).is_empty());
    }

    #[test]
    fn test_custom_table_extends_roles() {
        let policy = VisibilityPolicy::from_table([(
            Role::new("ngo"),
            vec![FeatureKind::PopulationDensity],
        )]);
        assert!(policy.is_visible(&Role::new("ngo"), FeatureKind::PopulationDensity));
        assert!(!policy.knows_role(&Role::new("civilian")));
    }

    #[test]
    fn test_role_deserializes_normalised() {
        let role: Role = serde_json::from_str("\"Provincial\"").unwrap();
        assert_eq!(role, Role::new("provincial"));
    }
}
