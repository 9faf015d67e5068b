//! Per-request fetch outcomes.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::error_handling::ProviderError;
use crate::model::{FeatureKind, ProviderId, SourceRecord};

/// How one provider call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus {
    /// The provider answered; counts are summed over antimeridian halves
    Completed {
        /// Source records returned
        records: usize,
        /// Features across those records
        features: usize,
    },
    /// The provider failed or timed out
    Failed(ProviderError),
    /// The circuit was open; no network call was made
    SkippedCircuitOpen,
    /// Still pending at the ceiling and aborted
    Abandoned,
}

impl FetchStatus {
    /// Returns `true` for anything other than a completed call.
    pub fn is_failure(&self) -> bool {
        !matches!(self, FetchStatus::Completed { .. })
    }
}

/// Outcome of one (kind, provider) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutcome {
    /// Provider called
    pub provider: ProviderId,
    /// Kind it serves
    pub kind: FeatureKind,
    /// How the call ended
    pub status: FetchStatus,
    /// Time from the start of the gather until the outcome was known
    pub elapsed: Duration,
}

/// Everything that did not go to plan during a gather.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialFailureReport {
    /// One entry per provider considered, sorted by kind then provider
    pub outcomes: Vec<ProviderOutcome>,
    /// Requested kinds for which no provider returned any feature
    pub no_data: BTreeSet<FeatureKind>,
}

impl PartialFailureReport {
    /// Returns `true` if any provider for `kind` did not complete.
    pub fn kind_failed(&self, kind: FeatureKind) -> bool {
        self.outcomes_for(kind).any(|o| o.status.is_failure())
    }

    /// Outcomes for providers of `kind`.
    pub fn outcomes_for(&self, kind: FeatureKind) -> impl Iterator<Item = &ProviderOutcome> {
        self.outcomes.iter().filter(move |o| o.kind == kind)
    }

    /// Requested kinds that ended with no data.
    pub fn missing_kinds(&self) -> &BTreeSet<FeatureKind> {
        &self.no_data
    }

    /// Outcomes that are failures of any sort.
    pub fn failures(&self) -> impl Iterator<Item = &ProviderOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failure())
    }

    /// Returns `true` when every provider completed and every kind has data.
    pub fn is_clean(&self) -> bool {
        self.no_data.is_empty() && self.failures().next().is_none()
    }
}

/// Raw records per kind plus the failure report.
#[derive(Debug, Clone, Default)]
pub struct GatherResult {
    /// Source records grouped by kind
    pub records: BTreeMap<FeatureKind, Vec<SourceRecord>>,
    /// Per-provider outcomes
    pub report: PartialFailureReport,
}
