//! Error classification for provider failures
//!
//! Maps a raw [`ProviderError`] to an [`ErrorCategory`] and a retryable
//! verdict. The retry executor consults this to decide whether another
//! attempt can help. Classification is a pure function of its input.

use crate::error::{ProviderError, TransportFault};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Auth,
    RateLimit,
    Timeout,
    InvalidRequest,
    NotFound,
    Overloaded,
    Network,
    Parse,
    GenericServer,
}

impl ErrorCategory {
    /// Label used in logs, metrics and JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate-limit",
            Self::Timeout => "timeout",
            Self::InvalidRequest => "invalid-request",
            Self::NotFound => "not-found",
            Self::Overloaded => "overloaded",
            Self::Network => "network",
            Self::Parse => "parse",
            Self::GenericServer => "generic-server",
        }
    }

    /// Whether errors of this category may succeed on a later attempt
    ///
    /// Exhaustive on purpose: a new variant must be classified here.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit
            | Self::Timeout
            | Self::Overloaded
            | Self::Network
            | Self::GenericServer => true,
            Self::Auth | Self::InvalidRequest | Self::NotFound | Self::Parse => false,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (category, retryable) pair derived from a raw error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub retryable: bool,
}

impl Classification {
    fn of(category: ErrorCategory) -> Self {
        Self {
            category,
            retryable: category.is_retryable(),
        }
    }
}

/// Classify a provider failure
///
/// Rules are evaluated in order and the first match wins. Note that a plain
/// HTTP 404 is caught by the generic 4xx rule before the not-found rule; both
/// are non-retryable.
pub fn classify(error: &ProviderError) -> Classification {
    let message = error.message().to_ascii_lowercase();
    let status = error.status();
    let fault = error.fault();
    let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    let category = if matches!(status, Some(401 | 403))
        || has(&["invalid api key", "authentication", "unauthorized"])
    {
        ErrorCategory::Auth
    } else if status == Some(429) || has(&["rate limit", "too many requests"]) {
        ErrorCategory::RateLimit
    } else if fault == Some(TransportFault::Timeout) || has(&["timeout", "timed out"]) {
        ErrorCategory::Timeout
    } else if matches!(status, Some(400..=499)) {
        ErrorCategory::InvalidRequest
    } else if status == Some(404) || has(&["not found"]) {
        ErrorCategory::NotFound
    } else if status == Some(503) || has(&["overloaded", "capacity"]) {
        ErrorCategory::Overloaded
    } else if matches!(
        fault,
        Some(
            TransportFault::ConnectionRefused
                | TransportFault::DnsNotFound
                | TransportFault::ConnectionReset
        )
    ) || has(&[
        "connection refused",
        "econnrefused",
        "enotfound",
        "dns",
        "connection reset",
        "econnreset",
        "socket hang up",
    ]) {
        ErrorCategory::Network
    } else if matches!(status, Some(500..=599)) {
        ErrorCategory::GenericServer
    } else if has(&["parse", "json"]) {
        ErrorCategory::Parse
    } else {
        ErrorCategory::GenericServer
    };

    Classification::of(category)
}
