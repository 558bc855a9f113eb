//! Fan-out/fan-in orchestration across providers
//!
//! One prompt goes to every requested model at once. Each model runs through
//! the retry executor independently; the orchestrator waits for all of them
//! to settle and partitions the outcomes. A failing model never cancels or
//! fails its siblings.

use crate::classify::ErrorCategory;
use crate::config::OrchestrationConfig;
use crate::error::{AppError, AppResult};
use crate::metrics::{AttemptOutcome, Metrics, RunOutcome};
use crate::providers::{PromptRequest, ProviderRegistry};
use crate::retry::{AttemptResult, RetryPolicy, execute_with_retry};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// A model that produced output
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSuccess {
    pub model: String,
    pub output: String,
    /// Duration of the successful call
    pub duration: Duration,
    /// Wall clock of the whole invocation, including earlier attempts and backoff
    pub total_duration: Duration,
    pub attempts: u32,
    pub recovered: bool,
}

/// A model that exhausted its attempts or failed non-retryably
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFailure {
    pub model: String,
    pub error: String,
    pub category: ErrorCategory,
    pub retryable: bool,
    pub attempts: u32,
    pub total_duration: Duration,
}

/// Outcome of one orchestration run
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    pub run_id: Uuid,
    pub successes: Vec<ModelSuccess>,
    pub failures: Vec<ModelFailure>,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

impl OrchestrationResult {
    /// Partial success counts as success
    pub fn success(&self) -> bool {
        !self.successes.is_empty()
    }

    pub fn total_models(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn outcome(&self) -> RunOutcome {
        RunOutcome::from_counts(self.successes.len(), self.failures.len())
    }

    pub fn find_success(&self, model: &str) -> Option<&ModelSuccess> {
        self.successes.iter().find(|s| s.model == model)
    }

    pub fn find_failure(&self, model: &str) -> Option<&ModelFailure> {
        self.failures.iter().find(|f| f.model == model)
    }

    /// Machine-readable report written to stdout or `--output`
    pub fn to_report(&self) -> OrchestrationReport {
        OrchestrationReport {
            success: self.success(),
            total_models: self.total_models(),
            success_count: self.successes.len(),
            failure_count: self.failures.len(),
            results: self
                .successes
                .iter()
                .map(|s| ReportResult {
                    model: s.model.clone(),
                    result: ReportOutput {
                        output: s.output.clone(),
                        duration_ms: millis(s.duration),
                    },
                    attempts: s.attempts,
                    duration: millis(s.total_duration),
                })
                .collect(),
            failures: self
                .failures
                .iter()
                .map(|f| ReportFailure {
                    model: f.model.clone(),
                    error: f.error.clone(),
                })
                .collect(),
            duration: millis(self.duration),
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Human-readable summary for stderr
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Orchestration {}: {}/{} models succeeded in {}ms",
            self.run_id,
            self.successes.len(),
            self.total_models(),
            millis(self.duration)
        );
        for s in &self.successes {
            let recovered = if s.recovered { ", recovered" } else { "" };
            let _ = writeln!(
                out,
                "  [ok]     {} {}ms ({} attempt{}{})",
                s.model,
                millis(s.duration),
                s.attempts,
                plural(s.attempts),
                recovered
            );
        }
        for f in &self.failures {
            let _ = writeln!(
                out,
                "  [failed] {} after {} attempt{} [{}]: {}",
                f.model,
                f.attempts,
                plural(f.attempts),
                f.category,
                f.error
            );
        }
        out
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

fn plural(n: u32) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// JSON shape of an orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationReport {
    pub success: bool,
    pub total_models: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<ReportResult>,
    pub failures: Vec<ReportFailure>,
    /// Milliseconds
    pub duration: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub model: String,
    pub result: ReportOutput,
    pub attempts: u32,
    /// Milliseconds, including retries
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutput {
    pub output: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFailure {
    pub model: String,
    pub error: String,
}

/// Runs prompts against several providers concurrently
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    config: OrchestrationConfig,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: OrchestrationConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            registry,
            config,
            policy,
            metrics,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    /// Send `request` to every model in `models` and wait for all of them
    ///
    /// # Errors
    /// Only input faults are errors: no models, a duplicated or unknown
    /// model name, an empty prompt or a zero timeout. Individual model failures are
    /// reported in [`OrchestrationResult::failures`].
    pub async fn orchestrate(
        &self,
        models: &[String],
        request: &PromptRequest,
        timeout_ms: u64,
        max_retries: u32,
    ) -> AppResult<OrchestrationResult> {
        if models.is_empty() {
            return Err(AppError::Validation(
                "at least one model must be specified".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for model in models {
            if !seen.insert(model.as_str()) {
                return Err(AppError::Validation(format!(
                    "model '{}' was requested more than once",
                    model
                )));
            }
            self.registry.require(model)?;
        }
        if request.is_empty() {
            return Err(AppError::Validation("prompt is empty".to_string()));
        }
        if timeout_ms == 0 {
            return Err(AppError::Validation(
                "timeout must be at least 1ms".to_string(),
            ));
        }

        let timeout = Duration::from_millis(self.config.clamp_timeout(timeout_ms));
        let run_id = Uuid::new_v4();

        tracing::info!(
            run_id = %run_id,
            models = ?models,
            timeout_ms = timeout.as_millis() as u64,
            max_retries = max_retries,
            prompt_tokens = request.estimate_tokens(),
            "Starting orchestration"
        );

        let timestamp = Utc::now();
        let start = Instant::now();

        let invocations = models.iter().filter_map(|model| self.registry.get(model)).map(|adapter| {
            let policy = &self.policy;
            async move {
                let invocation_start = Instant::now();
                let result =
                    execute_with_retry(adapter.as_ref(), request, timeout, max_retries, policy)
                        .await;
                (result, invocation_start.elapsed())
            }
        });
        let settled = join_all(invocations).await;
        let duration = start.elapsed();

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for (result, total_duration) in settled {
            self.record_attempts(&result);
            let attempts = result.attempts();
            let recovered = result.recovered();
            let model = result.model().to_string();
            match result.into_outcome() {
                Ok(completion) => successes.push(ModelSuccess {
                    model,
                    output: completion.output,
                    duration: completion.duration,
                    total_duration,
                    attempts,
                    recovered,
                }),
                Err(err) => failures.push(ModelFailure {
                    model,
                    error: err.error.to_string(),
                    category: err.category(),
                    retryable: err.is_retryable(),
                    attempts,
                    total_duration,
                }),
            }
        }

        let result = OrchestrationResult {
            run_id,
            successes,
            failures,
            duration,
            timestamp,
        };

        if let Err(e) = self.metrics.record_orchestration(result.outcome()) {
            Metrics::log_recording_failure("record_orchestration", &e);
        }

        tracing::info!(
            run_id = %run_id,
            success_count = result.successes.len(),
            failure_count = result.failures.len(),
            duration_ms = millis(duration),
            "Orchestration finished"
        );

        Ok(result)
    }

    fn record_attempts(&self, result: &AttemptResult) {
        for record in result.records() {
            let outcome = if record.is_success() {
                AttemptOutcome::Success
            } else {
                AttemptOutcome::Failure
            };
            if let Err(e) = self
                .metrics
                .record_attempt(result.model(), outcome, record.duration)
            {
                Metrics::log_recording_failure("record_attempt", &e);
            }
            if let Err(err) = &record.outcome
                && let Err(e) = self.metrics.record_failure(result.model(), err.category())
            {
                Metrics::log_recording_failure("record_failure", &e);
            }
        }
    }
}
