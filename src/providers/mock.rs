//! In-process provider double
//!
//! Used by `--mock` / `USE_MOCK_MODELS` runs and by tests. A mock either
//! replays a fixed script of outcomes or simulates latency and random
//! failures from [`MockConfig`].

use super::{Completion, PromptRequest, ProviderAdapter, TokenUsage, estimate_tokens, preview, with_deadline};
use crate::config::MockConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// One scripted outcome
#[derive(Debug, Clone)]
pub enum MockStep {
    Succeed { output: String, latency: Duration },
    Fail { error: ProviderError, latency: Duration },
}

impl MockStep {
    pub fn ok(output: impl Into<String>) -> Self {
        Self::Succeed {
            output: output.into(),
            latency: Duration::ZERO,
        }
    }

    pub fn fail(error: ProviderError) -> Self {
        Self::Fail {
            error,
            latency: Duration::ZERO,
        }
    }

    /// Same step, but only resolving after `latency`
    pub fn after(self, latency: Duration) -> Self {
        match self {
            Self::Succeed { output, .. } => Self::Succeed { output, latency },
            Self::Fail { error, .. } => Self::Fail { error, latency },
        }
    }
}

enum Behaviour {
    /// Steps are consumed front to back; the final step repeats forever
    Scripted(Mutex<VecDeque<MockStep>>),
    Simulated {
        min_latency_ms: u64,
        max_latency_ms: u64,
        failure_rate: f64,
    },
}

pub struct MockAdapter {
    name: String,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl MockAdapter {
    /// Script of outcomes, one per call
    ///
    /// An empty script behaves like a provider that always returns an
    /// empty string.
    pub fn scripted(name: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            name: name.into(),
            behaviour: Behaviour::Scripted(Mutex::new(steps.into())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_ok(name: impl Into<String>, output: impl Into<String>, latency: Duration) -> Self {
        Self::scripted(name, vec![MockStep::ok(output).after(latency)])
    }

    pub fn always_fail(name: impl Into<String>, error: ProviderError) -> Self {
        Self::scripted(name, vec![MockStep::fail(error)])
    }

    /// Random latency in `[min, max]` and a `failure_rate` chance of a
    /// retryable server error
    pub fn simulated(name: impl Into<String>, config: &MockConfig) -> Self {
        Self {
            name: name.into(),
            behaviour: Behaviour::Simulated {
                min_latency_ms: config.min_latency_ms,
                max_latency_ms: config.max_latency_ms.max(config.min_latency_ms),
                failure_rate: config.failure_rate.clamp(0.0, 1.0),
            },
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self, request: &PromptRequest) -> MockStep {
        match &self.behaviour {
            Behaviour::Scripted(steps) => {
                let mut steps = steps.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if steps.len() > 1 {
                    steps.pop_front().unwrap_or_else(|| MockStep::ok(""))
                } else {
                    steps.front().cloned().unwrap_or_else(|| MockStep::ok(""))
                }
            }
            Behaviour::Simulated {
                min_latency_ms,
                max_latency_ms,
                failure_rate,
            } => {
                // ThreadRng is not Send; draw everything before any await
                let mut rng = rand::rng();
                let latency =
                    Duration::from_millis(rng.random_range(*min_latency_ms..=*max_latency_ms));
                if rng.random_bool(*failure_rate) {
                    MockStep::fail(ProviderError::http(500, "simulated provider failure"))
                        .after(latency)
                } else {
                    let output = format!(
                        "[{} mock] response to: {}",
                        self.name,
                        preview(request.last_user_text(), 80)
                    );
                    MockStep::ok(output).after(latency)
                }
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        request: &PromptRequest,
        timeout: Duration,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step(request);
        let start = Instant::now();

        let output = with_deadline(timeout, async move {
            let (result, latency) = match step {
                MockStep::Succeed { output, latency } => (Ok(output), latency),
                MockStep::Fail { error, latency } => (Err(error), latency),
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        })
        .await?;

        let usage = TokenUsage {
            input_tokens: request.estimate_tokens() as u64,
            output_tokens: estimate_tokens(&output) as u64,
        };

        Ok(Completion {
            output,
            duration: start.elapsed(),
            usage: Some(usage),
        })
    }
}
