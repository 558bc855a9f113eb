//! Retry executor with exponential backoff
//!
//! Runs one provider call up to `max_retries + 1` times. Attempt 0 starts
//! immediately; before attempt k ≥ 1 the executor sleeps
//! `min(base * 2^(k-1), cap)`. Only failures the classifier marks retryable
//! are retried, and every attempt gets the full timeout again.

use crate::config::OrchestrationConfig;
use crate::error::ClassifiedError;
use crate::providers::{Completion, PromptRequest, ProviderAdapter};
use std::time::Duration;
use tokio::time::Instant;

/// Default base backoff in milliseconds (doubles each retry)
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;
/// Default backoff cap in milliseconds
///
/// With base=1000ms the cap is reached on attempt 4:
/// 1000, 2000, 4000, 8000, 8000, ...
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;

/// Backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            base_backoff_ms,
            max_backoff_ms,
        }
    }

    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self::new(config.base_backoff_ms, config.max_backoff_ms)
    }

    pub fn base_backoff_ms(&self) -> u64 {
        self.base_backoff_ms
    }

    pub fn max_backoff_ms(&self) -> u64 {
        self.max_backoff_ms
    }

    /// Delay before `attempt` (0 for the first attempt)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff(self, attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS)
    }
}

/// Calculate exponential backoff with overflow protection
///
/// Returns the delay in milliseconds applied before the given attempt
/// (0-indexed). Attempt 0 never waits; attempt k waits
/// `base * 2^(k-1)`, capped at the policy's maximum.
///
/// # Examples
/// With the default policy (base=1000ms, cap=8000ms):
/// - Attempt 1: 1000ms
/// - Attempt 2: 2000ms
/// - Attempt 3: 4000ms
/// - Attempt 4+: 8000ms (capped)
pub fn calculate_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    if attempt == 0 {
        return 0;
    }
    let exponent = attempt - 1;
    policy
        .base_backoff_ms
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(policy.max_backoff_ms)
}

/// What happened on one attempt
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 0-based attempt index
    pub index: u32,
    /// Delay slept before this attempt started
    pub backoff: Duration,
    /// Wall clock of the call itself, excluding backoff
    pub duration: Duration,
    pub outcome: Result<Completion, ClassifiedError>,
}

impl AttemptRecord {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Every attempt made for one model; the final attempt decides the outcome
#[derive(Debug, Clone)]
pub struct AttemptResult {
    model: String,
    previous: Vec<AttemptRecord>,
    last: AttemptRecord,
}

impl AttemptResult {
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Total attempts made, always at least 1
    pub fn attempts(&self) -> u32 {
        self.previous.len() as u32 + 1
    }

    pub fn outcome(&self) -> &Result<Completion, ClassifiedError> {
        &self.last.outcome
    }

    pub fn into_outcome(self) -> Result<Completion, ClassifiedError> {
        self.last.outcome
    }

    /// True when the model succeeded after at least one failed attempt
    pub fn recovered(&self) -> bool {
        self.last.is_success() && !self.previous.is_empty()
    }

    /// All attempt records in order
    pub fn records(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.previous.iter().chain(std::iter::once(&self.last))
    }

    pub fn last(&self) -> &AttemptRecord {
        &self.last
    }
}

/// Call `adapter` until it succeeds, fails non-retryably, or runs out of
/// retries
///
/// Never returns an error itself: the final failure is carried in the
/// result's outcome so callers can aggregate it with other models.
pub async fn execute_with_retry(
    adapter: &dyn ProviderAdapter,
    request: &PromptRequest,
    timeout: Duration,
    max_retries: u32,
    policy: &RetryPolicy,
) -> AttemptResult {
    let model = adapter.name().to_string();
    let mut previous = Vec::new();
    let mut attempt: u32 = 0;

    loop {
        let backoff = policy.delay_for(attempt);
        if !backoff.is_zero() {
            tracing::debug!(
                model = %model,
                attempt = attempt,
                backoff_ms = backoff.as_millis() as u64,
                "Backing off before retry"
            );
            tokio::time::sleep(backoff).await;
        }

        let start = Instant::now();
        let outcome = adapter
            .call(request, timeout)
            .await
            .map_err(ClassifiedError::from);
        let record = AttemptRecord {
            index: attempt,
            backoff,
            duration: start.elapsed(),
            outcome,
        };

        let retry = match &record.outcome {
            Ok(_) => {
                if attempt > 0 {
                    tracing::info!(
                        model = %model,
                        attempt = attempt,
                        "{} recovered on attempt {}",
                        model,
                        attempt + 1
                    );
                }
                false
            }
            Err(err) if !err.is_retryable() => {
                tracing::warn!(
                    model = %model,
                    attempt = attempt,
                    category = %err.category(),
                    error = %err.error,
                    "Non-retryable failure, giving up"
                );
                false
            }
            Err(err) if attempt >= max_retries => {
                tracing::warn!(
                    model = %model,
                    attempts = attempt + 1,
                    category = %err.category(),
                    error = %err.error,
                    "All retry attempts exhausted"
                );
                false
            }
            Err(err) => {
                tracing::warn!(
                    model = %model,
                    attempt = attempt,
                    max_retries = max_retries,
                    category = %err.category(),
                    error = %err.error,
                    "Retryable failure"
                );
                true
            }
        };

        if !retry {
            return AttemptResult {
                model,
                previous,
                last: record,
            };
        }

        previous.push(record);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorCategory;
    use crate::error::ProviderError;
    use crate::providers::{MockAdapter, MockStep};

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_backoff_ms(), 1000);
        assert_eq!(policy.max_backoff_ms(), 8000);
        assert_eq!(RetryPolicy::from_config(&OrchestrationConfig::default()), policy);
    }

    #[test]
    fn test_calculate_backoff_exponential_for_small_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(calculate_backoff(&policy, 0), 0);
        assert_eq!(calculate_backoff(&policy, 1), 1000);
        assert_eq!(calculate_backoff(&policy, 2), 2000);
        assert_eq!(calculate_backoff(&policy, 3), 4000);
        assert_eq!(calculate_backoff(&policy, 4), 8000);
        assert_eq!(calculate_backoff(&policy, 5), 8000);
    }

    #[test]
    fn test_calculate_backoff_capped_at_maximum() {
        let policy = RetryPolicy::new(u64::MAX / 2, 8000);
        assert_eq!(calculate_backoff(&policy, 64), 8000);
        assert_eq!(calculate_backoff(&policy, u32::MAX), 8000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_has_single_attempt() {
        let mock = MockAdapter::always_ok("m", "hi", Duration::from_millis(5));
        let result = execute_with_retry(
            &mock,
            &PromptRequest::from_prompt("x"),
            Duration::from_secs(1),
            3,
            &RetryPolicy::default(),
        )
        .await;
        assert_eq!(result.attempts(), 1);
        assert!(!result.recovered());
        assert_eq!(result.outcome().as_ref().unwrap().output, "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let mock = MockAdapter::always_fail("m", ProviderError::http(401, "bad key"));
        let result = execute_with_retry(
            &mock,
            &PromptRequest::from_prompt("x"),
            Duration::from_secs(1),
            5,
            &RetryPolicy::default(),
        )
        .await;
        assert_eq!(result.attempts(), 1);
        assert_eq!(mock.calls(), 1);
        let err = result.outcome().as_ref().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_exhausts_retries() {
        let mock = MockAdapter::always_fail("m", ProviderError::http(500, "boom"));
        let result = execute_with_retry(
            &mock,
            &PromptRequest::from_prompt("x"),
            Duration::from_secs(1),
            2,
            &RetryPolicy::new(10, 100),
        )
        .await;
        assert_eq!(result.attempts(), 3);
        assert_eq!(mock.calls(), 3);
        let backoffs: Vec<u64> = result
            .records()
            .map(|r| r.backoff.as_millis() as u64)
            .collect();
        assert_eq!(backoffs, vec![0, 10, 20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_is_flagged() {
        let mock = MockAdapter::scripted(
            "m",
            vec![
                MockStep::fail(ProviderError::http(429, "slow down")),
                MockStep::ok("finally"),
            ],
        );
        let result = execute_with_retry(
            &mock,
            &PromptRequest::from_prompt("x"),
            Duration::from_secs(1),
            3,
            &RetryPolicy::default(),
        )
        .await;
        assert_eq!(result.attempts(), 2);
        assert!(result.recovered());
        let indexes: Vec<u32> = result.records().map(|r| r.index).collect();
        assert_eq!(indexes, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_one_attempt() {
        let mock = MockAdapter::always_fail("m", ProviderError::http(503, "busy"));
        let result = execute_with_retry(
            &mock,
            &PromptRequest::from_prompt("x"),
            Duration::from_secs(1),
            0,
            &RetryPolicy::default(),
        )
        .await;
        assert_eq!(result.attempts(), 1);
        assert!(result.outcome().is_err());
    }
}
