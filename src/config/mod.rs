//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (timeouts, TTLs, thresholds, endpoints)
//! - The serde-backed `AggregatorConfig` consumed by the library
//! - CLI option types and parsing

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{
    AdapterType, AggregatorConfig, CacheConfig, CircuitBreakerConfig, KindSettings, LogFormat,
    LogLevel, Opt, ProviderConfig,
};
