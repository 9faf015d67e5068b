//! Configuration constants.
//!
//! This module defines the defaults used when no configuration file is
//! supplied: provider endpoints, timeouts, retry and circuit breaker
//! parameters, cache TTLs and deduplication tolerance.

/// Default User-Agent string for provider requests.
///
/// Several public APIs (Overpass, Open-Meteo) ask clients to identify
/// themselves; requests without a User-Agent may be throttled harder.
pub const DEFAULT_USER_AGENT: &str = concat!("flood_layers/", env!("CARGO_PKG_VERSION"));

// Network operation timeouts
/// TCP connection timeout in seconds
pub const TCP_CONNECT_TIMEOUT_SECS: u64 = 5;
/// Idle pooled connections are closed after this many seconds
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 30;

// Per-provider budgets
/// Timeout for fast providers (weather), in milliseconds
pub const DEFAULT_FAST_PROVIDER_TIMEOUT_MS: u64 = 3_000;
/// Timeout for slow providers (elevation, population, Overpass), in milliseconds
/// Overpass and elevation lookups routinely take several seconds for a province-sized box
pub const DEFAULT_SLOW_PROVIDER_TIMEOUT_MS: u64 = 8_000;

// Retry strategy
/// Base of the exponential backoff in milliseconds (delays grow as base^n * factor)
pub const RETRY_INITIAL_DELAY_MS: u64 = 10;
/// Factor applied to every backoff delay
pub const RETRY_FACTOR: u64 = 10;
/// Maximum delay between retries in milliseconds
pub const RETRY_MAX_DELAY_MS: u64 = 1_000;
/// Retries after the initial attempt, per provider call
pub const DEFAULT_RETRY_ATTEMPTS: usize = 2;

// Circuit breaker
/// Consecutive failures before a provider's circuit opens
pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 3;
/// How long an open circuit short-circuits calls, in milliseconds
pub const CIRCUIT_COOLDOWN_MS: u64 = 60_000;

// Response cache
/// Viewport rounding grain in degrees (~1.1 km of latitude)
pub const CACHE_GRAIN_DEGREES: f64 = 0.01;
/// Upper bound on the TTL of a bundle with degraded or unavailable layers, in milliseconds
pub const DEGRADED_TTL_MS: u64 = 15_000;

// Per-kind cache TTL and freshness windows, in milliseconds
/// Precipitation changes minute to minute
pub const PRECIPITATION_TTL_MS: u64 = 2 * 60 * 1000;
/// Precipitation older than this is flagged stale
pub const PRECIPITATION_STALE_AFTER_MS: u64 = 15 * 60 * 1000;
/// Infrastructure edits propagate within the hour
pub const INFRASTRUCTURE_TTL_MS: u64 = 60 * 60 * 1000;
/// Infrastructure older than this is flagged stale
pub const INFRASTRUCTURE_STALE_AFTER_MS: u64 = 7 * 24 * 60 * 60 * 1000;
/// Population grids are published yearly
pub const POPULATION_TTL_MS: u64 = 24 * 60 * 60 * 1000;
/// Population estimates older than this are flagged stale
pub const POPULATION_STALE_AFTER_MS: u64 = 5 * 365 * 24 * 60 * 60 * 1000;
/// Terrain is effectively static
pub const ELEVATION_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;
/// Elevation samples older than this are flagged stale
pub const ELEVATION_STALE_AFTER_MS: u64 = 10 * 365 * 24 * 60 * 60 * 1000;

// Composition
/// Features of one kind closer than this many metres are merged
pub const DEDUP_TOLERANCE_M: f64 = 50.0;
/// Points per side of the sampling grid used by point-based providers
pub const SAMPLE_GRID_SIZE: usize = 4;

// Default provider endpoints
/// Open-Meteo forecast API (current precipitation)
pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";
/// Overpass API interpreter (OpenStreetMap infrastructure)
pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
/// Open-Elevation lookup API
pub const OPEN_ELEVATION_URL: &str = "https://api.open-elevation.com/api/v1/lookup";
/// Self-hosted population density grid service (GeoJSON)
pub const POPULATION_GRID_URL: &str = "http://127.0.0.1:8600/v1/density";
