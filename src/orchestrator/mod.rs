//! Concurrent fan-out to provider adapters.
//!
//! The orchestrator launches one task per (kind, provider), bounds every task
//! by its own timeout, and stops waiting at a global ceiling equal to the
//! largest timeout in flight. Whatever arrived by then is returned; pending
//! tasks are aborted, which drops their HTTP futures.

mod report;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::adapters::{build_adapters, SourceAdapter};
use crate::config::AggregatorConfig;
use crate::error_handling::{ConfigError, ErrorType, InfoType, ProcessingStats, ProviderError};
use crate::geo::BoundingBox;
use crate::health::ProviderHealth;
use crate::model::{FeatureKind, ProviderId, SourceRecord};

pub use report::{FetchStatus, GatherResult, PartialFailureReport, ProviderOutcome};

struct RegisteredAdapter {
    adapter: Arc<dyn SourceAdapter>,
    timeout: Duration,
}

struct InFlight {
    provider: ProviderId,
    kind: FeatureKind,
    abort: AbortHandle,
    done: bool,
}

/// Fans a viewport out to every relevant provider.
pub struct FetchOrchestrator {
    adapters: Vec<RegisteredAdapter>,
    health: Arc<ProviderHealth>,
    stats: Arc<ProcessingStats>,
}

impl FetchOrchestrator {
    /// Creates an orchestrator with no adapters.
    pub fn new(health: Arc<ProviderHealth>, stats: Arc<ProcessingStats>) -> Self {
        FetchOrchestrator {
            adapters: Vec::new(),
            health,
            stats,
        }
    }

    /// Builds an orchestrator with one adapter per enabled provider in `config`.
    pub fn from_config(
        config: &AggregatorConfig,
        client: &reqwest::Client,
        health: Arc<ProviderHealth>,
        stats: Arc<ProcessingStats>,
    ) -> Result<Self, ConfigError> {
        let mut orchestrator = Self::new(health, stats);
        for (adapter, timeout) in build_adapters(config, client, &orchestrator.stats)? {
            orchestrator.register(adapter, timeout);
        }
        Ok(orchestrator)
    }

    /// Adds an adapter with its per-call timeout.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>, timeout: Duration) {
        self.adapters.push(RegisteredAdapter { adapter, timeout });
    }

    /// Shared provider health registry.
    pub fn health(&self) -> &Arc<ProviderHealth> {
        &self.health
    }

    /// Shared processing statistics.
    pub fn stats(&self) -> &Arc<ProcessingStats> {
        &self.stats
    }

    /// Kinds at least one registered adapter can serve.
    pub fn served_kinds(&self) -> BTreeSet<FeatureKind> {
        self.adapters.iter().map(|r| r.adapter.kind()).collect()
    }

    /// Fetches every requested kind for `bbox`.
    ///
    /// Never fails: provider errors, skips and abandonment are reported in
    /// [`GatherResult::report`] alongside whatever data arrived.
    pub async fn gather(&self, bbox: &BoundingBox, kinds: &BTreeSet<FeatureKind>) -> GatherResult {
        let started = Instant::now();
        let mut result = GatherResult::default();
        let mut in_flight: Vec<InFlight> = Vec::new();
        let mut pending = FuturesUnordered::new();
        let mut ceiling_budget = Duration::ZERO;

        for registered in self
            .adapters
            .iter()
            .filter(|r| kinds.contains(&r.adapter.kind()))
        {
            let provider = registered.adapter.provider_id().clone();
            let kind = registered.adapter.kind();

            if !self.health.allow_request(&provider) {
                log::info!("Skipping {} for {}: circuit open", provider, kind);
                self.stats.increment_info(InfoType::CircuitOpenSkip);
                result.report.outcomes.push(ProviderOutcome {
                    provider,
                    kind,
                    status: FetchStatus::SkippedCircuitOpen,
                    elapsed: Duration::ZERO,
                });
                continue;
            }

            let timeout = registered.timeout;
            let deadline = started + timeout;
            ceiling_budget = ceiling_budget.max(timeout);

            let adapter = Arc::clone(&registered.adapter);
            let bbox = *bbox;
            let handle = tokio::spawn(async move {
                let parts = bbox.split_antimeridian();
                let fetches = parts.iter().map(|part| adapter.fetch(part, deadline));
                match tokio::time::timeout_at(deadline, try_join_all(fetches)).await {
                    Ok(records) => records,
                    Err(_) => Err(ProviderError::Timeout {
                        provider: adapter.provider_id().clone(),
                        after: timeout,
                    }),
                }
            });

            let index = in_flight.len();
            in_flight.push(InFlight {
                provider,
                kind,
                abort: handle.abort_handle(),
                done: false,
            });
            pending.push(handle.map(move |joined| (index, joined)));
        }

        log::debug!(
            "Gathering {} kinds from {} providers (ceiling {}ms)",
            kinds.len(),
            in_flight.len(),
            ceiling_budget.as_millis()
        );

        let ceiling = started + ceiling_budget;
        loop {
            match tokio::time::timeout_at(ceiling, pending.next()).await {
                Ok(Some((index, joined))) => {
                    let task = &mut in_flight[index];
                    task.done = true;
                    let status = match joined {
                        Ok(Ok(records)) => self.on_success(task, records, &mut result.records),
                        Ok(Err(error)) => self.on_failure(task, error),
                        Err(join_error) => self.on_failure(
                            task,
                            ProviderError::Unavailable {
                                provider: task.provider.clone(),
                                status: None,
                                reason: format!("fetch task failed: {}", join_error),
                            },
                        ),
                    };
                    result.report.outcomes.push(ProviderOutcome {
                        provider: task.provider.clone(),
                        kind: task.kind,
                        status,
                        elapsed: started.elapsed(),
                    });
                }
                Ok(None) => break,
                Err(_) => {
                    for task in in_flight.iter_mut().filter(|t| !t.done) {
                        task.abort.abort();
                        task.done = true;
                        log::warn!(
                            "Abandoning {} for {} at the {}ms ceiling",
                            task.provider,
                            task.kind,
                            ceiling_budget.as_millis()
                        );
                        self.health.record_failure(&task.provider);
                        self.stats.increment_info(InfoType::TaskAbandoned);
                        result.report.outcomes.push(ProviderOutcome {
                            provider: task.provider.clone(),
                            kind: task.kind,
                            status: FetchStatus::Abandoned,
                            elapsed: started.elapsed(),
                        });
                    }
                    break;
                }
            }
        }

        for kind in kinds {
            let has_data = result
                .records
                .get(kind)
                .is_some_and(|records| records.iter().any(|r| !r.features.is_empty()));
            if !has_data {
                log::info!("No data for {} in this viewport", kind);
                self.stats.increment_error(ErrorType::NoDataForKind);
                result.report.no_data.insert(*kind);
            }
        }

        result
            .report
            .outcomes
            .sort_by(|a, b| (a.kind, &a.provider).cmp(&(b.kind, &b.provider)));
        result
    }

    fn on_success(
        &self,
        task: &InFlight,
        records: Vec<SourceRecord>,
        gathered: &mut BTreeMap<FeatureKind, Vec<SourceRecord>>,
    ) -> FetchStatus {
        self.health.record_success(&task.provider);
        let features = records.iter().map(|r| r.features.len()).sum();
        let count = records.len();
        log::debug!(
            "{} returned {} features for {}",
            task.provider,
            features,
            task.kind
        );
        gathered.entry(task.kind).or_default().extend(records);
        FetchStatus::Completed {
            records: count,
            features,
        }
    }

    fn on_failure(&self, task: &InFlight, error: ProviderError) -> FetchStatus {
        log::warn!("{} failed for {}: {}", task.provider, task.kind, error);
        self.health.record_failure(&task.provider);
        self.stats.increment_error(error.error_type());
        FetchStatus::Failed(error)
    }
}
