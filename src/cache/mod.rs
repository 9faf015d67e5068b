//! Single-flight response cache.
//!
//! Bundles are cached per [`CacheKey`] for the shortest TTL among their
//! layers. Unhealthy bundles are held for at most the degraded TTL, so a
//! provider outage is never served from cache for long.
//!
//! Concurrent requests for the same key are coalesced: the first caller
//! starts the computation on its own task, and every caller (the first one
//! included) receives the same `Arc`. A caller that goes away does not stop
//! the computation. If the computation itself dies, its slot is removed and
//! the next waiter starts over.

mod key;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use strum::IntoEnumIterator;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{AggregatorConfig, KindSettings};
use crate::model::{FeatureKind, LayerBundle, LayerStatus};

pub use key::CacheKey;

type Slots = Mutex<HashMap<CacheKey, Slot>>;

struct CachedBundle {
    bundle: Arc<LayerBundle>,
    expires_at: Instant,
}

enum Slot {
    Ready(CachedBundle),
    InFlight(broadcast::Sender<Arc<LayerBundle>>),
}

enum Claim {
    Hit(Arc<LayerBundle>),
    Wait(broadcast::Receiver<Arc<LayerBundle>>),
    Lead(broadcast::Sender<Arc<LayerBundle>>),
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Requests served from a valid entry
    pub hits: u64,
    /// Requests that started the computation
    pub misses: u64,
    /// Requests that waited on another caller's computation
    pub coalesced: u64,
    /// Valid or expired entries currently stored
    pub entries: usize,
    /// Computations currently running
    pub in_flight: usize,
}

#[derive(Debug, Clone)]
struct TtlPolicy {
    kind_ttls: BTreeMap<FeatureKind, Duration>,
    degraded_ttl: Duration,
}

impl TtlPolicy {
    fn ttl_for(&self, bundle: &LayerBundle) -> Duration {
        let mut ttl = bundle
            .layers
            .keys()
            .filter_map(|kind| self.kind_ttls.get(kind).copied())
            .min()
            .unwrap_or(self.degraded_ttl);
        if bundle
            .layers
            .values()
            .any(|layer| layer.status != LayerStatus::Ok)
        {
            ttl = ttl.min(self.degraded_ttl);
        }
        ttl
    }
}

/// Bundle cache with per-key single-flight.
pub struct ResponseCache {
    slots: Arc<Slots>,
    ttl: TtlPolicy,
    grain_degrees: f64,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

/// Removes the in-flight slot if the computation dies before storing.
struct InFlightGuard {
    slots: Arc<Slots>,
    key: CacheKey,
    tx: broadcast::Sender<Arc<LayerBundle>>,
    armed: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slots = lock(&self.slots);
        if matches!(slots.get(&self.key), Some(Slot::InFlight(tx)) if tx.same_channel(&self.tx)) {
            slots.remove(&self.key);
            log::debug!(
                "Bundle computation for role {} died; waiters will retry",
                self.key.role()
            );
        }
    }
}

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
    slots.lock().unwrap_or_else(|p| p.into_inner())
}

impl ResponseCache {
    /// Creates a cache.
    ///
    /// Kinds missing from `kind_ttls` use their built-in TTL.
    pub fn new(
        kind_ttls: BTreeMap<FeatureKind, Duration>,
        degraded_ttl: Duration,
        grain_degrees: f64,
    ) -> Self {
        let kind_ttls = FeatureKind::iter()
            .map(|kind| {
                let ttl = kind_ttls
                    .get(&kind)
                    .copied()
                    .unwrap_or_else(|| KindSettings::default_for(kind).ttl());
                (kind, ttl)
            })
            .collect();
        ResponseCache {
            slots: Arc::new(Mutex::new(HashMap::new())),
            ttl: TtlPolicy {
                kind_ttls,
                degraded_ttl,
            },
            grain_degrees,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Creates a cache from the aggregation config.
    pub fn from_config(config: &AggregatorConfig) -> Self {
        let ttls = FeatureKind::iter()
            .map(|kind| (kind, config.kind_settings(kind).ttl()))
            .collect();
        Self::new(
            ttls,
            Duration::from_millis(config.cache.degraded_ttl_ms),
            config.cache.grain_degrees,
        )
    }

    /// Viewport rounding grain in degrees.
    pub fn grain_degrees(&self) -> f64 {
        self.grain_degrees
    }

    /// How long `bundle` may be served.
    ///
    /// The shortest TTL among its layers, capped at the degraded TTL if any
    /// layer is not `ok`. A zero TTL means the bundle is not stored.
    pub fn ttl_for(&self, bundle: &LayerBundle) -> Duration {
        self.ttl.ttl_for(bundle)
    }

    fn claim(&self, key: &CacheKey) -> Claim {
        let mut slots = lock(&self.slots);
        match slots.get(key) {
            Some(Slot::Ready(entry)) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Claim::Hit(Arc::clone(&entry.bundle));
            }
            Some(Slot::InFlight(tx)) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                return Claim::Wait(tx.subscribe());
            }
            _ => {}
        }
        let (tx, _rx) = broadcast::channel(1);
        slots.insert(key.clone(), Slot::InFlight(tx.clone()));
        self.misses.fetch_add(1, Ordering::Relaxed);
        Claim::Lead(tx)
    }

    /// Returns the cached bundle for `key`, computing it at most once across
    /// concurrent callers.
    ///
    /// The computation runs on its own task and completes even if every
    /// caller is dropped. A panic in the computation is resumed in the caller
    /// that started it.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Arc<LayerBundle>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = LayerBundle> + Send + 'static,
    {
        loop {
            let mut rx = match self.claim(&key) {
                Claim::Hit(bundle) => {
                    log::debug!("Cache hit for role {}", key.role());
                    return bundle;
                }
                Claim::Lead(tx) => match self.spawn_computation(key.clone(), tx, compute()).await {
                    Ok(bundle) => return bundle,
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(_) => {
                        log::debug!("Bundle computation cancelled; retrying claim");
                        continue;
                    }
                },
                Claim::Wait(rx) => rx,
            };
            match rx.recv().await {
                Ok(bundle) => return bundle,
                Err(_) => log::debug!("In-flight computation vanished; retrying claim"),
            }
        }
    }

    fn spawn_computation<Fut>(
        &self,
        key: CacheKey,
        tx: broadcast::Sender<Arc<LayerBundle>>,
        computation: Fut,
    ) -> JoinHandle<Arc<LayerBundle>>
    where
        Fut: Future<Output = LayerBundle> + Send + 'static,
    {
        let policy = self.ttl.clone();
        let mut guard = InFlightGuard {
            slots: Arc::clone(&self.slots),
            key,
            tx,
            armed: true,
        };

        tokio::spawn(async move {
            let bundle = Arc::new(computation.await);
            let ttl = policy.ttl_for(&bundle);
            {
                let mut slots = lock(&guard.slots);
                if ttl.is_zero() {
                    slots.remove(&guard.key);
                } else {
                    slots.insert(
                        guard.key.clone(),
                        Slot::Ready(CachedBundle {
                            bundle: Arc::clone(&bundle),
                            expires_at: Instant::now() + ttl,
                        }),
                    );
                }
            }
            guard.armed = false;

            let waiters = guard.tx.receiver_count();
            // Receivers may already be gone; the bundle is cached either way.
            let _ = guard.tx.send(Arc::clone(&bundle));
            log::debug!(
                "Cached bundle for role {} for {}ms ({} waiters)",
                guard.key.role(),
                ttl.as_millis(),
                waiters
            );
            bundle
        })
    }

    /// Drops expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = lock(&self.slots);
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => entry.expires_at > now,
            Slot::InFlight(_) => true,
        });
        before - slots.len()
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let slots = lock(&self.slots);
        let in_flight = slots
            .values()
            .filter(|s| matches!(s, Slot::InFlight(_)))
            .count();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            entries: slots.len() - in_flight,
            in_flight,
        }
    }
}
