//! Per-provider health tracking for the router
//!
//! Every chat attempt feeds one sample (latency plus success or failure)
//! into the tracker. A provider is unhealthy when more than half of its
//! requests failed and its most recent failure is less than an hour old;
//! once the last failure ages out it is healthy again regardless of rate.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Failure rate above which a provider may be considered unhealthy
pub const UNHEALTHY_FAILURE_RATE: f64 = 0.5;
/// How long a failure counts against a provider
pub const FAILURE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Running counters for one provider
///
/// Fields are private; they only change through [`HealthTracker`] so the
/// counters stay consistent with each other.
#[derive(Clone, Debug)]
pub struct ProviderHealth {
    name: String,
    total_requests: u64,
    total_failures: u64,
    last_failure: Option<Instant>,
    avg_response_ms: f64,
}

impl ProviderHealth {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total_requests: 0,
            total_failures: 0,
            last_failure: None,
            avg_response_ms: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Cumulative mean response time; zero before the first request
    pub fn avg_response_time(&self) -> Duration {
        Duration::from_micros((self.avg_response_ms.max(0.0) * 1000.0).round() as u64)
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_requests as f64
        }
    }

    /// Unhealthy predicate evaluated at `now`
    pub fn is_unhealthy_at(&self, now: Instant) -> bool {
        let recent_failure = self
            .last_failure
            .is_some_and(|at| now.saturating_duration_since(at) < FAILURE_WINDOW);
        recent_failure && self.failure_rate() > UNHEALTHY_FAILURE_RATE
    }

    fn record(&mut self, latency: Duration, failed: bool, now: Instant) {
        self.total_requests += 1;
        let sample = latency.as_secs_f64() * 1000.0;
        self.avg_response_ms += (sample - self.avg_response_ms) / self.total_requests as f64;
        if failed {
            self.total_failures += 1;
            self.last_failure = Some(now);
        }
    }
}

/// Health state for every provider the router knows
pub struct HealthTracker {
    health: RwLock<HashMap<String, ProviderHealth>>,
}

impl HealthTracker {
    /// Start all `providers` with empty counters (healthy)
    pub fn new<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let health: HashMap<String, ProviderHealth> = providers
            .into_iter()
            .map(|name| {
                let name = name.into();
                (name.clone(), ProviderHealth::new(name))
            })
            .collect();

        tracing::debug!(
            total_providers = health.len(),
            "HealthTracker initialized with all providers healthy"
        );

        Self {
            health: RwLock::new(health),
        }
    }

    /// Record one attempt outcome
    ///
    /// The whole read-modify-write happens under one write guard with no
    /// await inside, so concurrent chats never lose updates.
    pub async fn record(&self, provider: &str, latency: Duration, failed: bool) {
        let now = Instant::now();
        let mut health = self.health.write().await;

        let Some(entry) = health.get_mut(provider) else {
            tracing::warn!(
                provider = %provider,
                "Attempted to record health for unknown provider"
            );
            return;
        };

        let was_unhealthy = entry.is_unhealthy_at(now);
        entry.record(latency, failed, now);
        let is_unhealthy = entry.is_unhealthy_at(now);

        if is_unhealthy && !was_unhealthy {
            tracing::warn!(
                provider = %provider,
                failure_rate = entry.failure_rate(),
                total_requests = entry.total_requests,
                "Provider marked as unhealthy"
            );
        } else if was_unhealthy && !is_unhealthy {
            tracing::info!(provider = %provider, "Provider recovered to healthy state");
        }
    }

    pub async fn record_success(&self, provider: &str, latency: Duration) {
        self.record(provider, latency, false).await;
    }

    pub async fn record_failure(&self, provider: &str, latency: Duration) {
        self.record(provider, latency, true).await;
    }

    /// Unknown providers are reported unhealthy
    pub async fn is_healthy(&self, provider: &str) -> bool {
        let now = Instant::now();
        let health = self.health.read().await;
        health
            .get(provider)
            .is_some_and(|h| !h.is_unhealthy_at(now))
    }

    pub async fn snapshot(&self, provider: &str) -> Option<ProviderHealth> {
        self.health.read().await.get(provider).cloned()
    }

    pub async fn get_all_statuses(&self) -> Vec<ProviderHealth> {
        self.health.read().await.values().cloned().collect()
    }

    /// Names of healthy providers among `names`, order preserved
    pub async fn healthy_subset<'a>(&self, names: &[&'a str]) -> Vec<&'a str> {
        let now = Instant::now();
        let health = self.health.read().await;
        names
            .iter()
            .copied()
            .filter(|n| health.get(*n).is_some_and(|h| !h.is_unhealthy_at(now)))
            .collect()
    }

    /// Average latency per provider among `names`, missing entries omitted
    pub async fn latencies<'a>(&self, names: &[&'a str]) -> Vec<(&'a str, Duration)> {
        let health = self.health.read().await;
        names
            .iter()
            .copied()
            .filter_map(|n| health.get(n).map(|h| (n, h.avg_response_time())))
            .collect()
    }
}
