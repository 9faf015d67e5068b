//! Error handling and processing statistics.
//!
//! This module provides:
//! - Error type definitions (fatal request errors, non-fatal provider errors)
//! - Categorization of transport failures into the provider taxonomy
//! - Retry strategy configuration
//! - Processing statistics tracking
//!
//! Only [`RequestError`] is fatal to a bundle request. Every [`ProviderError`]
//! degrades a single layer and is tallied in [`ProcessingStats`].

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use categorization::{categorize_reqwest_error, categorize_status, get_retry_strategy};
pub use stats::ProcessingStats;
pub use types::{ConfigError, ErrorType, InfoType, InitializationError, ProviderError, RequestError};
