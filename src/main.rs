//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `flood_layers` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - Printing the bundle as JSON
//!
//! All core functionality is implemented in the library crate.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;
use strum::IntoEnumIterator;

use flood_layers::config::Opt;
use flood_layers::initialization::{init_client, init_logger_with};
use flood_layers::{AggregatorConfig, FeatureKind, LayerService, Role};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    let _ = dotenvy::dotenv();

    let opt = Opt::parse();

    init_logger_with(opt.log_level.clone().into(), opt.log_format.clone())
        .context("Failed to initialize logger")?;

    let config = match &opt.config {
        Some(path) => AggregatorConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AggregatorConfig::default(),
    };
    config.validate().context("Invalid configuration")?;

    let client = init_client(&config).context("Failed to initialize HTTP client")?;
    let service =
        LayerService::from_config(&config, &client).context("Failed to build layer service")?;

    let kinds: Vec<FeatureKind> = if opt.kinds.is_empty() {
        FeatureKind::iter().collect()
    } else {
        opt.kinds.clone()
    };
    let role = Role::new(&opt.role);

    let bundle = match service.request_layer_bundle(&opt.bbox, &role, &kinds).await {
        Ok(bundle) => bundle,
        Err(e) => {
            eprintln!("flood_layers error: {}", e);
            process::exit(2);
        }
    };

    let json = if opt.pretty {
        serde_json::to_string_pretty(bundle.as_ref())
    } else {
        serde_json::to_string(bundle.as_ref())
    }
    .context("Failed to serialize layer bundle")?;
    println!("{}", json);

    for (kind, status) in bundle.health() {
        log::info!("{}: {}", kind, status);
    }
    for provider in service.health_snapshot() {
        log::info!(
            "{}: {} consecutive failures{}",
            provider.provider,
            provider.consecutive_failures,
            if provider.circuit_open {
                " (circuit open)"
            } else {
                ""
            }
        );
    }
    service.stats().log_summary();

    Ok(())
}
