//! Error types for the orchestration core
//!
//! Two families live here:
//! - [`AppError`]: setup and programmer faults (bad config, unknown model,
//!   empty prompt). These fail fast and surface as a non-zero exit code.
//! - [`ProviderError`]: runtime failures of a single provider call. These are
//!   expected, get classified (see [`crate::classify`]) and travel as values.

use crate::classify::{Classification, ErrorCategory};
use std::fmt;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unknown model '{name}'. Available models: {available}")]
    UnknownModel { name: String, available: String },

    #[error("Routing failed: {0}")]
    RoutingFailed(String),

    #[error("Provider {provider} failed: {source}")]
    ProviderFailed {
        provider: String,
        #[source]
        source: ClassifiedError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

/// Low-level transport failure kinds reported by a [`crate::providers::Transport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    /// Deadline elapsed before a response arrived
    Timeout,
    /// Peer actively refused the connection
    ConnectionRefused,
    /// Host name could not be resolved
    DnsNotFound,
    /// Connection dropped mid-request
    ConnectionReset,
    /// Anything else the HTTP client reports
    Other,
}

impl TransportFault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection refused",
            Self::DnsNotFound => "dns lookup failed",
            Self::ConnectionReset => "connection reset",
            Self::Other => "transport error",
        }
    }
}

/// Failure of a single provider call
///
/// Carries exactly what the classifier needs: the HTTP status (if the
/// provider answered), the transport fault (if it did not), and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    status: Option<u16>,
    fault: Option<TransportFault>,
    message: String,
}

impl ProviderError {
    /// Provider answered with an HTTP error (or an error envelope mapped to one)
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            fault: None,
            message: message.into(),
        }
    }

    /// Request never produced a response
    pub fn transport(fault: TransportFault, message: impl Into<String>) -> Self {
        Self {
            status: None,
            fault: Some(fault),
            message: message.into(),
        }
    }

    /// Deadline elapsed while waiting for the provider
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::transport(
            TransportFault::Timeout,
            format!("request timeout after {}ms", timeout_ms),
        )
    }

    /// No API key configured for the provider
    pub fn missing_api_key(provider: &str, env_vars: &[String]) -> Self {
        Self {
            status: None,
            fault: None,
            message: format!(
                "authentication failed: no API key configured for {} (set {})",
                provider,
                env_vars.join(" or ")
            ),
        }
    }

    /// Response body arrived but the generated text could not be extracted
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            status: None,
            fault: None,
            message: format!("failed to parse response: {}", message.into()),
        }
    }

    /// Free-form failure with no status and no transport fault
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            status: None,
            fault: None,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn fault(&self) -> Option<TransportFault> {
        self.fault
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// A provider failure paired with its classification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} [{}]", .error, .classification.category)]
pub struct ClassifiedError {
    pub error: ProviderError,
    pub classification: Classification,
}

impl ClassifiedError {
    pub fn new(error: ProviderError) -> Self {
        let classification = crate::classify::classify(&error);
        Self {
            error,
            classification,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.classification.category
    }

    pub fn is_retryable(&self) -> bool {
        self.classification.retryable
    }
}

impl From<ProviderError> for ClassifiedError {
    fn from(error: ProviderError) -> Self {
        Self::new(error)
    }
}
