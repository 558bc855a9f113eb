//! Provider selection and single-call fallback
//!
//! Selection order (first rule that yields a provider wins):
//! 1. explicit provider in the options
//! 2. vision requirement restricts candidates (no candidate is an error)
//! 3. function-calling requirement narrows candidates when any qualify
//! 4. cost-optimization heuristics for the task type
//! 5. round robin across healthy candidates when load balancing is on
//! 6. lowest average latency when speed is preferred
//! 7. configured default provider, else the first candidate

use super::health::HealthTracker;
use super::{ChatResponse, RouteOptions, RoutingDecision, SelectionReason, TaskType};
use crate::config::RouterConfig;
use crate::error::{AppError, AppResult, ClassifiedError};
use crate::metrics::{AttemptOutcome, Metrics};
use crate::providers::{
    Completion, PromptRequest, ProviderProfile, ProviderRegistry, TokenUsage, estimate_tokens,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub struct ProviderRouter {
    registry: Arc<ProviderRegistry>,
    config: RouterConfig,
    health: HealthTracker,
    metrics: Arc<Metrics>,
    timeout: Duration,
    cursor: AtomicUsize,
}

impl ProviderRouter {
    /// `timeout` bounds each provider call made by [`chat`](Self::chat)
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: RouterConfig,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        let health = HealthTracker::new(registry.names());
        Self {
            registry,
            config,
            health,
            metrics,
            timeout,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Pick a provider name for `request`
    pub async fn route(&self, request: &PromptRequest, options: &RouteOptions) -> AppResult<String> {
        self.decide(request, options).await.map(|d| d.provider)
    }

    /// Pick a provider and report which rule chose it
    ///
    /// # Errors
    /// - `UnknownModel` if an explicit provider is not registered
    /// - `RoutingFailed` if no provider is registered, or vision is required
    ///   and no provider supports it
    ///
    /// A vision requirement overrides an explicit provider that lacks vision.
    pub async fn decide(
        &self,
        request: &PromptRequest,
        options: &RouteOptions,
    ) -> AppResult<RoutingDecision> {
        if self.registry.is_empty() {
            return Err(AppError::RoutingFailed(
                "no providers are registered".to_string(),
            ));
        }

        if let Some(explicit) = &options.provider {
            self.registry.require(explicit)?;
        }

        let mut candidates: Vec<&ProviderProfile> = self.registry.profiles().collect();

        if options.requires_vision {
            candidates.retain(|p| p.supports_vision);
            if candidates.is_empty() {
                return Err(AppError::RoutingFailed(
                    "no registered provider supports vision input".to_string(),
                ));
            }
        }

        if let Some(explicit) = &options.provider {
            if candidates.iter().any(|p| &p.name == explicit) {
                return Ok(self.decided(explicit, SelectionReason::Explicit, options));
            }
            tracing::warn!(
                provider = %explicit,
                "Requested provider does not support vision input; choosing a vision-capable one"
            );
        }

        if options.requires_functions {
            let capable: Vec<&ProviderProfile> = candidates
                .iter()
                .copied()
                .filter(|p| p.supports_functions)
                .collect();
            if capable.is_empty() {
                tracing::warn!(
                    candidates = candidates.len(),
                    "No candidate supports function calling; ignoring the requirement"
                );
            } else {
                candidates = capable;
            }
        }

        if self.config.cost_optimization
            && let Some(name) = self.cost_optimized(&candidates, request, options.task_type)
        {
            return Ok(self.decided(name, SelectionReason::CostOptimized, options));
        }

        let names: Vec<&str> = candidates.iter().map(|p| p.name.as_str()).collect();

        if self.config.load_balancing {
            let healthy = self.health.healthy_subset(&names).await;
            let pool = if healthy.is_empty() { &names } else { &healthy };
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
            return Ok(self.decided(pool[index], SelectionReason::LoadBalanced, options));
        }

        if options.prefer_speed {
            let healthy = self.health.healthy_subset(&names).await;
            let pool = if healthy.is_empty() { &names } else { &healthy };
            let fastest = self
                .health
                .latencies(pool)
                .await
                .into_iter()
                .min_by_key(|(_, latency)| *latency)
                .map(|(name, _)| name);
            if let Some(name) = fastest {
                return Ok(self.decided(name, SelectionReason::Fastest, options));
            }
        }

        if let Some(default) = self.config.default_provider.as_deref()
            && names.contains(&default)
        {
            return Ok(self.decided(default, SelectionReason::Default, options));
        }

        Ok(self.decided(names[0], SelectionReason::FirstAvailable, options))
    }

    fn decided(
        &self,
        provider: &str,
        reason: SelectionReason,
        options: &RouteOptions,
    ) -> RoutingDecision {
        tracing::debug!(
            provider = %provider,
            reason = reason.as_str(),
            task_type = options.task_type.as_str(),
            requires_vision = options.requires_vision,
            "Provider selected"
        );
        RoutingDecision::new(provider, reason)
    }

    fn cost_optimized<'a>(
        &self,
        candidates: &[&'a ProviderProfile],
        request: &PromptRequest,
        task_type: TaskType,
    ) -> Option<&'a str> {
        let configured = |preferred: &Option<String>| {
            preferred.as_deref().and_then(|want| {
                candidates
                    .iter()
                    .copied()
                    .find(|p| p.name == want)
                    .map(|p| p.name.as_str())
            })
        };

        match task_type {
            TaskType::Simple => candidates
                .iter()
                .copied()
                .min_by(|a, b| a.unit_cost().total_cmp(&b.unit_cost()))
                .map(|p| p.name.as_str()),
            TaskType::Creative => configured(&self.config.creative_provider),
            TaskType::Coding => configured(&self.config.coding_provider),
            TaskType::Analysis if request.estimate_tokens() >= self.config.long_context_tokens => {
                configured(&self.config.analysis_provider)
            }
            TaskType::Analysis | TaskType::General => None,
        }
    }

    /// Route `request`, call the chosen provider, and fall back on failure
    ///
    /// With `fallback_enabled` at most `min(max_fallback_hops, providers - 1)`
    /// alternates are tried, healthy ones first, each at most once.
    ///
    /// # Errors
    /// Routing errors from [`decide`](Self::decide), or `ProviderFailed`
    /// carrying the last provider's classified error.
    pub async fn chat(
        &self,
        request: &PromptRequest,
        options: &RouteOptions,
    ) -> AppResult<ChatResponse> {
        if request.is_empty() {
            return Err(AppError::Validation("prompt is empty".to_string()));
        }

        let decision = self.decide(request, options).await?;
        let primary = decision.provider;

        let mut last_error = match self.attempt(&primary, request).await {
            Ok(completion) => return Ok(self.respond(&primary, request, completion, None)),
            Err(err) => err,
        };

        let max_hops = if self.config.fallback_enabled {
            self.config
                .max_fallback_hops
                .min(self.registry.len().saturating_sub(1))
        } else {
            0
        };

        let mut tried = vec![primary.clone()];
        let mut failed_provider = primary.clone();

        for hop in 1..=max_hops {
            let Some(alternate) = self.pick_alternate(&tried, options).await else {
                tracing::warn!(
                    provider = %failed_provider,
                    "No alternate provider available for fallback"
                );
                break;
            };

            tracing::warn!(
                from = %failed_provider,
                to = %alternate,
                hop = hop,
                max_hops = max_hops,
                category = %last_error.category(),
                "Falling back to alternate provider"
            );
            if let Err(e) = self.metrics.record_fallback(&failed_provider, &alternate) {
                Metrics::log_recording_failure("record_fallback", &e);
            }

            match self.attempt(&alternate, request).await {
                Ok(completion) => {
                    return Ok(self.respond(&alternate, request, completion, Some(primary)));
                }
                Err(err) => {
                    last_error = err;
                    tried.push(alternate.clone());
                    failed_provider = alternate;
                }
            }
        }

        Err(AppError::ProviderFailed {
            provider: failed_provider,
            source: last_error,
        })
    }

    /// First untried provider, healthy ones before unhealthy, registry order
    async fn pick_alternate(&self, tried: &[String], options: &RouteOptions) -> Option<String> {
        let untried: Vec<&str> = self
            .registry
            .profiles()
            .filter(|p| !tried.contains(&p.name))
            .filter(|p| !options.requires_vision || p.supports_vision)
            .map(|p| p.name.as_str())
            .collect();

        let healthy = self.health.healthy_subset(&untried).await;
        healthy
            .first()
            .or_else(|| untried.first())
            .map(|name| name.to_string())
    }

    /// One call with health and metrics bookkeeping
    async fn attempt(
        &self,
        provider: &str,
        request: &PromptRequest,
    ) -> Result<Completion, ClassifiedError> {
        let start = Instant::now();
        let result = match self.registry.get(provider) {
            Some(adapter) => adapter.call(request, self.timeout).await,
            None => Err(crate::error::ProviderError::other(format!(
                "provider '{}' disappeared from the registry",
                provider
            ))),
        };
        let elapsed = start.elapsed();

        self.health.record(provider, elapsed, result.is_err()).await;

        let outcome = if result.is_ok() {
            AttemptOutcome::Success
        } else {
            AttemptOutcome::Failure
        };
        if let Err(e) = self.metrics.record_attempt(provider, outcome, elapsed) {
            Metrics::log_recording_failure("record_attempt", &e);
        }

        result.map_err(|error| {
            let classified = ClassifiedError::from(error);
            if let Err(e) = self.metrics.record_failure(provider, classified.category()) {
                Metrics::log_recording_failure("record_failure", &e);
            }
            tracing::warn!(
                provider = %provider,
                category = %classified.category(),
                retryable = classified.is_retryable(),
                error = %classified.error,
                "Provider call failed"
            );
            classified
        })
    }

    fn respond(
        &self,
        provider: &str,
        request: &PromptRequest,
        completion: Completion,
        fallback_from: Option<String>,
    ) -> ChatResponse {
        let tokens = completion.usage.unwrap_or_else(|| TokenUsage {
            input_tokens: request.estimate_tokens() as u64,
            output_tokens: estimate_tokens(&completion.output) as u64,
        });
        let (model, cost) = self
            .registry
            .profile(provider)
            .map(|p| (p.model.clone(), p.cost_for(&tokens)))
            .unwrap_or_default();

        tracing::info!(
            provider = %provider,
            model = %model,
            tokens = tokens.total(),
            cost_usd = cost,
            duration_ms = completion.duration.as_millis() as u64,
            fallback = fallback_from.is_some(),
            "Chat completed"
        );

        ChatResponse {
            content: completion.output,
            provider: provider.to_string(),
            model,
            cost,
            tokens,
            duration: completion.duration,
            fallback_from,
        }
    }
}
