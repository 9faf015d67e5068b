//! flood_layers library: open-data geospatial aggregation for flood dashboards
//!
//! This library fetches precipitation, critical infrastructure, population
//! density and elevation data from independent open-data providers, normalises
//! them into a common feature model, and serves role-filtered layer bundles for
//! a map viewport. Slow or failing providers degrade their own layer and never
//! the whole bundle.
//!
//! # Example
//!
//! ```no_run
//! use flood_layers::{AggregatorConfig, BoundingBox, FeatureKind, LayerService, Role};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AggregatorConfig::default();
//! let client = flood_layers::initialization::init_client(&config)?;
//! let service = LayerService::from_config(&config, &client)?;
//!
//! let viewport = BoundingBox::from_edges(24.7, 66.9, 25.1, 67.3)?;
//! let bundle = service
//!     .request_layer_bundle(
//!         &viewport,
//!         &Role::new("district"),
//!         &[FeatureKind::Precipitation, FeatureKind::Elevation],
//!     )
//!     .await?;
//! for (kind, status) in bundle.health() {
//!     println!("{kind}: {status}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

#![warn(missing_docs)]

pub mod adapters;
pub mod cache;
pub mod composer;
pub mod config;
pub mod error_handling;
pub mod geo;
pub mod health;
pub mod initialization;
pub mod model;
pub mod orchestrator;
mod service;
pub mod visibility;

// Re-export public API
pub use config::{AggregatorConfig, LogFormat, LogLevel};
pub use error_handling::{ProviderError, RequestError};
pub use geo::{BoundingBox, GeoPoint};
pub use model::{Feature, FeatureKind, Layer, LayerBundle, LayerStatus};
pub use service::LayerService;
pub use visibility::{Role, VisibilityPolicy};
