//! Provider health tracking (circuit breakers).
//!
//! Each provider gets its own circuit breaker. After N consecutive failures
//! the circuit opens and the orchestrator skips the provider without a network
//! call until a cooldown expires. A success closes the circuit again.
//!
//! [`ProviderHealth`] is the only process-wide mutable state in the pipeline.
//! It is created once and injected into the orchestrator; it is never
//! persisted and resets on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::CircuitBreakerConfig;
use crate::model::ProviderId;

/// Circuit breaker state for a single provider.
///
/// Tracks consecutive failures and opens the circuit after a threshold.
/// The circuit automatically allows another attempt after the cooldown.
pub struct CircuitBreaker {
    /// Number of consecutive failures before opening circuit
    failure_threshold: u32,
    /// Cooldown period before attempting to close circuit again
    cooldown_duration: Duration,
    /// Current consecutive failure count
    failure_count: AtomicU32,
    /// Whether the circuit is currently open
    is_open: AtomicBool,
    /// When the circuit was opened (for cooldown)
    opened_at: Mutex<Option<Instant>>,
    /// Wall-clock time of the last successful call
    last_success: Mutex<Option<DateTime<Utc>>>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with custom settings.
    ///
    /// # Arguments
    ///
    /// * `failure_threshold` - Number of consecutive failures before opening circuit
    /// * `cooldown_duration` - How long to wait before attempting to close circuit
    pub fn with_threshold(failure_threshold: u32, cooldown_duration: Duration) -> Self {
        CircuitBreaker {
            failure_threshold: failure_threshold.max(1),
            cooldown_duration,
            failure_count: AtomicU32::new(0),
            is_open: AtomicBool::new(false),
            opened_at: Mutex::new(None),
            last_success: Mutex::new(None),
        }
    }

    /// Records a successful call.
    ///
    /// Resets the failure count and closes the circuit if it was open.
    pub fn record_success(&self, provider: &ProviderId) {
        self.failure_count.store(0, Ordering::SeqCst);
        *lock(&self.last_success) = Some(Utc::now());
        if self.is_open.swap(false, Ordering::SeqCst) {
            *lock(&self.opened_at) = None;
            log::info!("Circuit for {}: closed after successful call", provider);
        }
    }

    /// Records a failed call.
    ///
    /// Increments the failure count and opens the circuit if the threshold is
    /// reached. A failure right after the cooldown re-opens the circuit, since
    /// the count was never reset.
    pub fn record_failure(&self, provider: &ProviderId) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;

        if count >= self.failure_threshold && !self.is_open.swap(true, Ordering::SeqCst) {
            *lock(&self.opened_at) = Some(Instant::now());
            log::warn!(
                "Circuit for {}: opened after {} consecutive failures (cooldown: {}ms)",
                provider,
                count,
                self.cooldown_duration.as_millis()
            );
        }
    }

    /// Checks if the circuit is open (calls should be skipped).
    ///
    /// Returns `true` if the circuit is open and cooldown hasn't expired.
    /// Returns `false` if the circuit is closed or cooldown has expired (allowing retry).
    pub fn is_circuit_open(&self, provider: &ProviderId) -> bool {
        if !self.is_open.load(Ordering::SeqCst) {
            return false;
        }

        let mut opened_at = lock(&self.opened_at);
        if let Some(opened) = *opened_at {
            if opened.elapsed() >= self.cooldown_duration {
                log::info!(
                    "Circuit for {}: cooldown expired, allowing a trial call",
                    provider
                );
                *opened_at = None;
                self.is_open.store(false, Ordering::SeqCst);
                return false;
            }
        }

        true
    }

    /// Gets the current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Gets whether the circuit is currently open, without applying the cooldown.
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    /// Wall-clock time of the last successful call.
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_success)
    }
}

/// Locks a mutex, recovering the data if a panicking holder poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Point-in-time view of one provider's health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealthSnapshot {
    /// Provider id
    pub provider: ProviderId,
    /// Consecutive failures so far
    pub consecutive_failures: u32,
    /// Whether the circuit is open
    pub circuit_open: bool,
    /// Last successful call
    pub last_success: Option<DateTime<Utc>>,
}

/// Per-provider circuit breakers.
pub struct ProviderHealth {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<ProviderId, Arc<CircuitBreaker>>>,
}

impl ProviderHealth {
    /// Creates an empty registry; breakers are created on first use.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        ProviderHealth {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    fn breaker(&self, provider: &ProviderId) -> Arc<CircuitBreaker> {
        if let Some(existing) = self
            .breakers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(provider)
        {
            return Arc::clone(existing);
        }
        let mut breakers = self.breakers.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(breakers.entry(provider.clone()).or_insert_with(|| {
            Arc::new(CircuitBreaker::with_threshold(
                self.config.failure_threshold,
                self.config.cooldown(),
            ))
        }))
    }

    /// Returns `true` if `provider` may be called now.
    pub fn allow_request(&self, provider: &ProviderId) -> bool {
        !self.breaker(provider).is_circuit_open(provider)
    }

    /// Records a successful call to `provider`.
    pub fn record_success(&self, provider: &ProviderId) {
        self.breaker(provider).record_success(provider);
    }

    /// Records a failed, timed-out or abandoned call to `provider`.
    pub fn record_failure(&self, provider: &ProviderId) {
        self.breaker(provider).record_failure(provider);
    }

    /// Consecutive failures recorded for `provider`.
    pub fn consecutive_failures(&self, provider: &ProviderId) -> u32 {
        self.breaker(provider).failure_count()
    }

    /// Health of every provider seen so far, sorted by id.
    pub fn snapshot(&self) -> Vec<ProviderHealthSnapshot> {
        let breakers = self.breakers.read().unwrap_or_else(|p| p.into_inner());
        let mut snapshot: Vec<_> = breakers
            .iter()
            .map(|(provider, breaker)| ProviderHealthSnapshot {
                provider: provider.clone(),
                consecutive_failures: breaker.failure_count(),
                circuit_open: breaker.is_open(),
                last_success: breaker.last_success(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.provider.cmp(&b.provider));
        snapshot
    }
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
