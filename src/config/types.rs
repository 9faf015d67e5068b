//! Configuration types and CLI options.
//!
//! This module defines the aggregation configuration (providers, circuit
//! breaker, per-kind cache TTLs, visibility table) and the command-line
//! options of the `flood_layers` binary.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::constants::*;
use crate::error_handling::ConfigError;
use crate::geo::{BoundingBox, Crs};
use crate::model::{FeatureKind, ProviderId};
use crate::visibility::{Role, VisibilityPolicy};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Which adapter implementation talks to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterType {
    /// Open-Meteo current precipitation (point grid)
    OpenMeteo,
    /// Overpass API infrastructure query (bounding box)
    Overpass,
    /// GeoJSON population density grid (bounding box in provider CRS)
    PopulationGrid,
    /// Open-Elevation lookup (point grid)
    OpenElevation,
}

impl AdapterType {
    /// The feature kind this adapter produces.
    pub fn kind(&self) -> FeatureKind {
        match self {
            AdapterType::OpenMeteo => FeatureKind::Precipitation,
            AdapterType::Overpass => FeatureKind::Infrastructure,
            AdapterType::PopulationGrid => FeatureKind::PopulationDensity,
            AdapterType::OpenElevation => FeatureKind::Elevation,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retry_attempts() -> usize {
    DEFAULT_RETRY_ATTEMPTS
}

/// Connection settings for one external provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider id, used for health tracking and attribution
    pub id: String,
    /// Adapter implementation
    pub adapter: AdapterType,
    /// Endpoint URL
    pub base_url: String,
    /// Individual call timeout in milliseconds
    pub timeout_ms: u64,
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    /// CRS of coordinates exchanged with the provider
    #[serde(default)]
    pub crs: Crs,
    /// Preferred provider when deduplicating ties for this kind
    #[serde(default)]
    pub primary: bool,
    /// Disabled providers are never registered
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ProviderConfig {
    /// Builds an enabled provider with default retry and CRS settings.
    pub fn new(id: &str, adapter: AdapterType, base_url: &str, timeout_ms: u64) -> Self {
        ProviderConfig {
            id: id.to_string(),
            adapter,
            base_url: base_url.to_string(),
            timeout_ms,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            crs: Crs::Wgs84,
            primary: false,
            enabled: true,
        }
    }

    /// Provider id as a typed identifier.
    pub fn provider_id(&self) -> ProviderId {
        ProviderId::new(&self.id)
    }

    /// Kind of data served by the provider.
    pub fn kind(&self) -> FeatureKind {
        self.adapter.kind()
    }

    /// Individual call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Circuit breaker thresholds shared by all providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long an open circuit skips the provider, in milliseconds
    pub cooldown_ms: u64,
}

impl CircuitBreakerConfig {
    /// Cooldown as a duration.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            failure_threshold: CIRCUIT_FAILURE_THRESHOLD,
            cooldown_ms: CIRCUIT_COOLDOWN_MS,
        }
    }
}

/// Cache and freshness settings for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSettings {
    /// How long a layer of this kind may be served from cache, in milliseconds
    pub ttl_ms: u64,
    /// Observations older than this are flagged stale, in milliseconds
    pub stale_after_ms: u64,
}

impl KindSettings {
    /// Built-in settings for `kind`.
    pub fn default_for(kind: FeatureKind) -> Self {
        let (ttl_ms, stale_after_ms) = match kind {
            FeatureKind::Precipitation => (PRECIPITATION_TTL_MS, PRECIPITATION_STALE_AFTER_MS),
            FeatureKind::Infrastructure => (INFRASTRUCTURE_TTL_MS, INFRASTRUCTURE_STALE_AFTER_MS),
            FeatureKind::PopulationDensity => (POPULATION_TTL_MS, POPULATION_STALE_AFTER_MS),
            FeatureKind::Elevation => (ELEVATION_TTL_MS, ELEVATION_STALE_AFTER_MS),
        };
        KindSettings {
            ttl_ms,
            stale_after_ms,
        }
    }

    /// Cache TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Freshness window as a duration.
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Viewport rounding grain in degrees
    pub grain_degrees: f64,
    /// Upper bound on the TTL of bundles with unhealthy layers, in milliseconds
    pub degraded_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            grain_degrees: CACHE_GRAIN_DEGREES,
            degraded_ttl_ms: DEGRADED_TTL_MS,
        }
    }
}

/// Complete configuration of the aggregation layer.
///
/// Every field has a default, so a JSON file only needs the keys it changes.
///
/// # Examples
///
/// ```
/// use flood_layers::config::AggregatorConfig;
///
/// let config = AggregatorConfig::from_json_str(r#"{ "dedup_tolerance_m": 25.0 }"#).unwrap();
/// assert_eq!(config.dedup_tolerance_m, 25.0);
/// assert_eq!(config.providers.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// External providers
    pub providers: Vec<ProviderConfig>,
    /// Circuit breaker thresholds
    pub circuit_breaker: CircuitBreakerConfig,
    /// Per-kind TTL and freshness overrides
    pub kinds: BTreeMap<FeatureKind, KindSettings>,
    /// Response cache settings
    pub cache: CacheConfig,
    /// Deduplication distance in metres
    pub dedup_tolerance_m: f64,
    /// Points per side of the sampling grid for point-based providers
    pub sample_grid_size: usize,
    /// User-Agent sent to providers
    pub user_agent: String,
    /// Role → visible kinds; `None` uses the built-in portal table
    pub visibility: Option<BTreeMap<Role, Vec<FeatureKind>>>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        let mut elevation = ProviderConfig::new(
            "open-elevation",
            AdapterType::OpenElevation,
            OPEN_ELEVATION_URL,
            DEFAULT_SLOW_PROVIDER_TIMEOUT_MS,
        );
        elevation.primary = true;
        let mut weather = ProviderConfig::new(
            "open-meteo",
            AdapterType::OpenMeteo,
            OPEN_METEO_URL,
            DEFAULT_FAST_PROVIDER_TIMEOUT_MS,
        );
        weather.primary = true;
        let mut population = ProviderConfig::new(
            "population-grid",
            AdapterType::PopulationGrid,
            POPULATION_GRID_URL,
            DEFAULT_SLOW_PROVIDER_TIMEOUT_MS,
        );
        population.crs = Crs::WebMercator;

        AggregatorConfig {
            providers: vec![
                weather,
                ProviderConfig::new(
                    "overpass",
                    AdapterType::Overpass,
                    OVERPASS_URL,
                    DEFAULT_SLOW_PROVIDER_TIMEOUT_MS,
                ),
                population,
                elevation,
            ],
            circuit_breaker: CircuitBreakerConfig::default(),
            kinds: BTreeMap::new(),
            cache: CacheConfig::default(),
            dedup_tolerance_m: DEDUP_TOLERANCE_M,
            sample_grid_size: SAMPLE_GRID_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            visibility: None,
        }
    }
}

impl AggregatorConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        let mut primaries = HashSet::new();
        for provider in &self.providers {
            if !ids.insert(provider.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
            url::Url::parse(&provider.base_url).map_err(|e| {
                ConfigError::Invalid(format!(
                    "provider '{}' has invalid base_url '{}': {}",
                    provider.id, provider.base_url, e
                ))
            })?;
            if provider.timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' has a zero timeout",
                    provider.id
                )));
            }
            if provider.enabled && provider.primary && !primaries.insert(provider.kind()) {
                return Err(ConfigError::Invalid(format!(
                    "more than one primary provider for {}",
                    provider.kind()
                )));
            }
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if !(self.cache.grain_degrees.is_finite() && self.cache.grain_degrees > 0.0) {
            return Err(ConfigError::Invalid(
                "cache.grain_degrees must be a positive number".into(),
            ));
        }
        if !(self.dedup_tolerance_m.is_finite() && self.dedup_tolerance_m >= 0.0) {
            return Err(ConfigError::Invalid(
                "dedup_tolerance_m must be a non-negative number".into(),
            ));
        }
        if !(1..=32).contains(&self.sample_grid_size) {
            return Err(ConfigError::Invalid(
                "sample_grid_size must be between 1 and 32".into(),
            ));
        }
        Ok(())
    }

    /// Enabled providers.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// TTL and freshness for `kind`, falling back to the built-in values.
    pub fn kind_settings(&self, kind: FeatureKind) -> KindSettings {
        self.kinds
            .get(&kind)
            .copied()
            .unwrap_or_else(|| KindSettings::default_for(kind))
    }

    /// Primary provider per kind.
    pub fn primary_providers(&self) -> HashMap<FeatureKind, ProviderId> {
        self.enabled_providers()
            .filter(|p| p.primary)
            .map(|p| (p.kind(), p.provider_id()))
            .collect()
    }

    /// The role visibility policy.
    pub fn visibility_policy(&self) -> VisibilityPolicy {
        match &self.visibility {
            Some(table) => VisibilityPolicy::from_table(table.clone()),
            None => VisibilityPolicy::default(),
        }
    }
}

/// Parses `south,west,north,east` into a validated bounding box.
fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("bbox must be four numbers: {}", e))?;
    let &[south, west, north, east] = parts.as_slice() else {
        return Err(format!(
            "bbox must be south,west,north,east (got {} values)",
            parts.len()
        ));
    };
    BoundingBox::from_edges(south, west, north, east).map_err(|e| e.to_string())
}

/// Command-line options for the `flood_layers` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flood_layers",
    version,
    about = "Fetches a role-filtered layer bundle for a map viewport"
)]
pub struct Opt {
    /// Viewport as south,west,north,east in degrees (west > east crosses the antimeridian)
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bbox: BoundingBox,

    /// Portal role the bundle is filtered for
    #[arg(long, default_value = "civilian")]
    pub role: String,

    /// Layer kinds to request (defaults to every kind)
    #[arg(long, value_delimiter = ',')]
    pub kinds: Vec<FeatureKind>,

    /// JSON configuration file
    #[arg(long, env = "FLOOD_LAYERS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain")]
    pub log_format: LogFormat,

    /// Pretty-print the bundle JSON
    #[arg(long)]
    pub pretty: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(log::LevelFilter::from(LogLevel::Info), log::LevelFilter::Info);
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AggregatorConfig::default();
        config.validate().expect("default config should validate");
        assert_eq!(config.providers.len(), 4);
        let primaries = config.primary_providers();
        assert_eq!(
            primaries.get(&FeatureKind::Precipitation),
            Some(&ProviderId::new("open-meteo"))
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AggregatorConfig::from_json_str(
            r#"{
                "circuit_breaker": { "failure_threshold": 5 },
                "kinds": { "precipitation": { "ttl_ms": 1000, "stale_after_ms": 60000 } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.cooldown_ms, CIRCUIT_COOLDOWN_MS);
        assert_eq!(
            config.kind_settings(FeatureKind::Precipitation).ttl(),
            Duration::from_secs(1)
        );
        assert_eq!(
            config.kind_settings(FeatureKind::Elevation),
            KindSettings::default_for(FeatureKind::Elevation)
        );
    }

    #[test]
    fn test_provider_defaults_from_json() {
        let config = AggregatorConfig::from_json_str(
            r#"{ "providers": [
                { "id": "pop", "adapter": "population-grid",
                  "base_url": "http://localhost:8600/v1/density",
                  "timeout_ms": 9000, "crs": "EPSG:3857" }
            ] }"#,
        )
        .unwrap();
        let provider = &config.providers[0];
        assert_eq!(provider.kind(), FeatureKind::PopulationDensity);
        assert_eq!(provider.crs, Crs::WebMercator);
        assert_eq!(provider.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert!(provider.enabled);
        assert!(!provider.primary);
    }

    #[test]
    fn test_visibility_table_from_json() {
        let config = AggregatorConfig::from_json_str(
            r#"{ "visibility": { "Responder": ["elevation"] } }"#,
        )
        .unwrap();
        let policy = config.visibility_policy();
        assert!(policy.is_visible(&Role::new("responder"), FeatureKind::Elevation));
        assert!(!policy.knows_role(&Role::new("civilian")));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut config = AggregatorConfig::default();
        let dup = config.providers[0].clone();
        config.providers.push(dup);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_two_primaries_for_one_kind() {
        let mut config = AggregatorConfig::default();
        let mut second = config.providers[0].clone();
        second.id = "open-meteo-mirror".into();
        config.providers.push(second);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url_and_grain() {
        let mut config = AggregatorConfig::default();
        config.providers[1].base_url = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = AggregatorConfig::default();
        config.cache.grain_degrees = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "sample_grid_size": 2 }}"#).unwrap();
        let config = AggregatorConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.sample_grid_size, 2);
    }

    #[test]
    fn test_load_from_missing_path() {
        let result = AggregatorConfig::load_from_path(Path::new("/nonexistent/flood.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_parse_bbox() {
        let bbox = parse_bbox("24.0, 66.5, 28.5, 71.2").unwrap();
        assert_eq!(bbox.south(), 24.0);
        assert_eq!(bbox.east(), 71.2);
        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_bbox("30,0,10,1").is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let opt = Opt::try_parse_from([
            "flood_layers",
            "--bbox",
            "-20,170,-10,-170",
            "--role",
            "district",
            "--kinds",
            "precipitation,elevation",
        ])
        .unwrap();
        assert!(opt.bbox.crosses_antimeridian());
        assert_eq!(
            opt.kinds,
            vec![FeatureKind::Precipitation, FeatureKind::Elevation]
        );
        assert_eq!(opt.role, "district");
    }
}
