//! Error type definitions.
//!
//! This module defines all error and info types used throughout the crate.

use std::path::PathBuf;
use std::time::Duration;

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

use crate::model::ProviderId;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

/// Error types for configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration parsed but violates a constraint.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Fatal, caller-side request errors.
///
/// These are raised synchronously before any provider is contacted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The bounding box violates coordinate invariants.
    #[error("Invalid viewport: {0}")]
    InvalidViewport(String),

    /// The role has no entry in the visibility table.
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// The request named no layer kinds.
    #[error("No layer kinds requested")]
    NoKindsRequested,
}

/// Non-fatal provider failures.
///
/// These never fail a bundle request; they degrade the affected layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network failure or non-success HTTP status.
    #[error("{provider} unavailable: {reason}")]
    Unavailable {
        /// Provider that failed
        provider: ProviderId,
        /// HTTP status, when the server answered
        status: Option<u16>,
        /// Human-readable cause
        reason: String,
    },

    /// The provider asked us to back off (HTTP 429 or `Retry-After`).
    #[error("{provider} rate limited")]
    RateLimited {
        /// Provider that throttled us
        provider: ProviderId,
        /// Suggested wait, if the provider sent one
        retry_after: Option<Duration>,
    },

    /// The payload could not be parsed.
    #[error("{provider} returned a malformed response: {reason}")]
    MalformedResponse {
        /// Provider that answered
        provider: ProviderId,
        /// Parse failure description
        reason: String,
    },

    /// The call did not finish before its deadline.
    #[error("{provider} timed out after {}ms", .after.as_millis())]
    Timeout {
        /// Provider that was too slow
        provider: ProviderId,
        /// Budget that elapsed
        after: Duration,
    },
}

impl ProviderError {
    /// Provider the error belongs to.
    pub fn provider(&self) -> &ProviderId {
        match self {
            ProviderError::Unavailable { provider, .. }
            | ProviderError::RateLimited { provider, .. }
            | ProviderError::MalformedResponse { provider, .. }
            | ProviderError::Timeout { provider, .. } => provider,
        }
    }

    /// Statistics category for this error.
    pub fn error_type(&self) -> ErrorType {
        match self {
            ProviderError::Unavailable { .. } => ErrorType::ProviderUnavailable,
            ProviderError::RateLimited { .. } => ErrorType::ProviderRateLimited,
            ProviderError::MalformedResponse { .. } => ErrorType::ProviderMalformedResponse,
            ProviderError::Timeout { .. } => ErrorType::RequestTimeout,
        }
    }

    /// Returns `true` if retrying the same call might succeed.
    ///
    /// Only transport failures and 5xx responses are retried. Rate limits
    /// are backoff signals, and malformed payloads will not parse on retry.
    pub fn is_retriable(&self) -> bool {
        match self {
            ProviderError::Unavailable { status, .. } => match status {
                None => true,
                Some(code) => (500..600).contains(code),
            },
            _ => false,
        }
    }
}

/// Categories of failures tallied during bundle requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorType {
    /// Network failure or non-success HTTP status
    ProviderUnavailable,
    /// HTTP 429 or a `Retry-After` answer
    ProviderRateLimited,
    /// Payload could not be parsed
    ProviderMalformedResponse,
    /// Provider deadline exceeded
    RequestTimeout,
    /// A requested kind ended with no features
    NoDataForKind,
}

/// Informational events that are not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum InfoType {
    /// Provider skipped without a network call
    CircuitOpenSkip,
    /// Provider record could not be normalised
    RecordDropped,
    /// Transient failure retried
    RetryAttempt,
    /// Provider still pending at the ceiling
    TaskAbandoned,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorType {
    /// Human-readable label used in summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::ProviderUnavailable => "Provider unavailable",
            ErrorType::ProviderRateLimited => "Provider rate limited",
            ErrorType::ProviderMalformedResponse => "Provider malformed response",
            ErrorType::RequestTimeout => "Request timeout",
            ErrorType::NoDataForKind => "No data for kind",
        }
    }
}

impl std::fmt::Display for InfoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InfoType {
    /// Human-readable label used in summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoType::CircuitOpenSkip => "Circuit open, provider skipped",
            InfoType::RecordDropped => "Malformed record dropped",
            InfoType::RetryAttempt => "Retry attempt",
            InfoType::TaskAbandoned => "Provider abandoned at ceiling",
        }
    }
}
