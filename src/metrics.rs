//! Prometheus metrics collection
//!
//! Tracks:
//! - Provider attempts by outcome
//! - Classified provider failures by category
//! - Provider call latency
//! - Router fallback hops
//! - Orchestration outcomes (success, partial, failure)
//!
//! The CLI renders the registry in Prometheus text format with `--metrics`.

use crate::classify::ErrorCategory;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Outcome label for a single provider attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failure => "failure",
        }
    }
}

/// Outcome label for a whole orchestration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every requested model succeeded
    Success,
    /// At least one model succeeded, at least one failed
    Partial,
    /// No model succeeded
    Failure,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Partial => "partial",
            RunOutcome::Failure => "failure",
        }
    }

    /// Derive the run outcome from success/failure counts
    pub fn from_counts(successes: usize, failures: usize) -> Self {
        match (successes, failures) {
            (0, _) => RunOutcome::Failure,
            (_, 0) => RunOutcome::Success,
            _ => RunOutcome::Partial,
        }
    }
}

/// Metrics collector
///
/// Provider labels are bounded by the provider registry, categories by
/// [`ErrorCategory`], so cardinality stays small.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    provider_attempts: IntCounterVec,
    provider_failures: IntCounterVec,
    provider_latency: HistogramVec,
    router_fallbacks: IntCounterVec,
    orchestrations: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let provider_attempts = IntCounterVec::new(
            Opts::new(
                "jarvis_provider_attempts_total",
                "Total provider call attempts by provider and outcome",
            ),
            &["provider", "outcome"],
        )?;

        let provider_failures = IntCounterVec::new(
            Opts::new(
                "jarvis_provider_failures_total",
                "Total classified provider failures by provider and error category",
            ),
            &["provider", "category"],
        )?;

        let provider_latency = HistogramVec::new(
            HistogramOpts::new(
                "jarvis_provider_latency_seconds",
                "Provider call latency in seconds (successful and failed attempts)",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["provider"],
        )?;

        let router_fallbacks = IntCounterVec::new(
            Opts::new(
                "jarvis_router_fallbacks_total",
                "Total router fallback hops by failed provider and alternate provider",
            ),
            &["from", "to"],
        )?;

        let orchestrations = IntCounterVec::new(
            Opts::new(
                "jarvis_orchestrations_total",
                "Total orchestration runs by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(provider_attempts.clone()))?;
        registry.register(Box::new(provider_failures.clone()))?;
        registry.register(Box::new(provider_latency.clone()))?;
        registry.register(Box::new(router_fallbacks.clone()))?;
        registry.register(Box::new(orchestrations.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            provider_attempts,
            provider_failures,
            provider_latency,
            router_fallbacks,
            orchestrations,
        })
    }

    /// Record one provider attempt and its latency
    pub fn record_attempt(
        &self,
        provider: &str,
        outcome: AttemptOutcome,
        latency: Duration,
    ) -> Result<(), prometheus::Error> {
        self.provider_attempts
            .get_metric_with_label_values(&[provider, outcome.as_str()])?
            .inc();
        self.provider_latency
            .get_metric_with_label_values(&[provider])?
            .observe(latency.as_secs_f64());
        Ok(())
    }

    /// Record a classified provider failure
    pub fn record_failure(
        &self,
        provider: &str,
        category: ErrorCategory,
    ) -> Result<(), prometheus::Error> {
        self.provider_failures
            .get_metric_with_label_values(&[provider, category.as_str()])?
            .inc();
        Ok(())
    }

    /// Record a router fallback hop
    pub fn record_fallback(&self, from: &str, to: &str) -> Result<(), prometheus::Error> {
        self.router_fallbacks
            .get_metric_with_label_values(&[from, to])?
            .inc();
        Ok(())
    }

    /// Record an orchestration run outcome
    pub fn record_orchestration(&self, outcome: RunOutcome) -> Result<(), prometheus::Error> {
        self.orchestrations
            .get_metric_with_label_values(&[outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Current attempt count for a provider/outcome pair (0 if never recorded)
    pub fn attempt_count(&self, provider: &str, outcome: AttemptOutcome) -> u64 {
        self.provider_attempts
            .get_metric_with_label_values(&[provider, outcome.as_str()])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Current fallback count for a from/to pair (0 if never recorded)
    pub fn fallback_count(&self, from: &str, to: &str) -> u64 {
        self.router_fallbacks
            .get_metric_with_label_values(&[from, to])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Gather all metrics and encode them in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        tracing::debug!(
            metric_family_count = metric_families.len(),
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                e.utf8_error().valid_up_to(),
                e
            ))
        })
    }

    /// Log a recording failure without interrupting the caller
    pub(crate) fn log_recording_failure(operation: &str, error: &prometheus::Error) {
        tracing::error!(
            operation = operation,
            error = %error,
            "Metrics recording failed. Observability degraded but request continues."
        );
    }
}
