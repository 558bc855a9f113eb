//! Provider adapters and the provider registry
//!
//! An adapter translates a generic [`PromptRequest`] into one vendor's wire
//! format and the vendor's response back into plain text. Adapters are held
//! in an explicit [`ProviderRegistry`] that is built once and injected into
//! the orchestrator and router.

pub mod anthropic;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod transport;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use mock::{MockAdapter, MockStep};
pub use openai::OpenAiAdapter;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

use crate::config::{Config, ProviderKind, ProviderSettings};
use crate::error::{AppError, AppResult, ProviderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A role-tagged chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Immutable input to a provider call
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    messages: Vec<Message>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
}

impl PromptRequest {
    /// Single free-text prompt, sent as one user message
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::from_messages(vec![Message::user(prompt)])
    }

    /// Ordered conversation
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Override the provider's configured max_tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Override the provider's configured temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    /// True when there is no non-whitespace content at all
    pub fn is_empty(&self) -> bool {
        self.messages.iter().all(|m| m.content.trim().is_empty())
    }

    /// Rough prompt size in tokens across all messages
    pub fn estimate_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum()
    }

    /// System messages joined with blank lines, if any
    pub(crate) fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// Last user message, used for log previews and mock output
    pub fn last_user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Estimate token count from text (simple heuristic: chars / 4)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Token accounting reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Successful provider output
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub output: String,
    pub duration: Duration,
    pub usage: Option<TokenUsage>,
}

/// One AI backend
///
/// Implementations must never panic on provider misbehaviour: every
/// transport or semantic failure becomes a [`ProviderError`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry name of this provider (e.g. "claude")
    fn name(&self) -> &str;

    /// Send `request` and wait at most `timeout` for the generated text
    async fn call(
        &self,
        request: &PromptRequest,
        timeout: Duration,
    ) -> Result<Completion, ProviderError>;
}

/// Static facts about a provider used by the router
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    pub name: String,
    pub model: String,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub supports_vision: bool,
    pub supports_functions: bool,
}

impl ProviderProfile {
    /// Profile with zero cost and no special capabilities
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            supports_vision: false,
            supports_functions: false,
        }
    }

    pub fn with_costs(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.input_cost_per_1k = input_per_1k;
        self.output_cost_per_1k = output_per_1k;
        self
    }

    pub fn with_vision(mut self) -> Self {
        self.supports_vision = true;
        self
    }

    pub fn with_functions(mut self) -> Self {
        self.supports_functions = true;
        self
    }

    /// Combined per-1k price used to rank providers by cheapness
    pub fn unit_cost(&self) -> f64 {
        self.input_cost_per_1k + self.output_cost_per_1k
    }

    /// Cost in USD for the given usage
    pub fn cost_for(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (usage.output_tokens as f64 / 1000.0) * self.output_cost_per_1k
    }
}

impl From<&ProviderSettings> for ProviderProfile {
    fn from(settings: &ProviderSettings) -> Self {
        Self {
            name: settings.name().to_string(),
            model: settings.model().to_string(),
            input_cost_per_1k: settings.input_cost_per_1k(),
            output_cost_per_1k: settings.output_cost_per_1k(),
            supports_vision: settings.supports_vision(),
            supports_functions: settings.supports_functions(),
        }
    }
}

struct RegisteredProvider {
    profile: ProviderProfile,
    adapter: Arc<dyn ProviderAdapter>,
}

/// Map from provider name to adapter, in registration order
#[derive(Default)]
pub struct ProviderRegistry {
    entries: Vec<RegisteredProvider>,
    index: HashMap<String, usize>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under `profile.name`
    ///
    /// # Errors
    /// Returns `AppError::Config` if the name is already registered.
    pub fn register(
        &mut self,
        profile: ProviderProfile,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> AppResult<()> {
        if self.index.contains_key(&profile.name) {
            return Err(AppError::Config(format!(
                "Provider '{}' is already registered",
                profile.name
            )));
        }
        self.index.insert(profile.name.clone(), self.entries.len());
        self.entries.push(RegisteredProvider { profile, adapter });
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(
        mut self,
        profile: ProviderProfile,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> AppResult<Self> {
        self.register(profile, adapter)?;
        Ok(self)
    }

    /// Build adapters for every configured provider
    ///
    /// With `config.mock.enabled` every provider is backed by a simulated
    /// [`MockAdapter`] instead of a real HTTP adapter. API keys are resolved
    /// through `env` (normally `|k| std::env::var(k).ok()`); a missing key is
    /// not an error here, the adapter fails its calls with an auth error.
    pub fn from_config<F>(config: &Config, transport: Arc<dyn Transport>, env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = Self::new();

        for settings in &config.providers {
            let profile = ProviderProfile::from(settings);
            let adapter: Arc<dyn ProviderAdapter> = if config.mock.enabled {
                Arc::new(MockAdapter::simulated(settings.name(), &config.mock))
            } else {
                let api_key = settings.resolve_api_key(&env);
                if api_key.is_none() {
                    tracing::warn!(
                        provider = %settings.name(),
                        env_vars = ?settings.api_key_vars(),
                        "No API key found; calls to this provider will fail with an auth error"
                    );
                }
                match settings.kind() {
                    ProviderKind::Openai => {
                        Arc::new(OpenAiAdapter::new(settings, api_key, transport.clone()))
                    }
                    ProviderKind::Anthropic => {
                        Arc::new(AnthropicAdapter::new(settings, api_key, transport.clone()))
                    }
                    ProviderKind::Gemini => {
                        Arc::new(GeminiAdapter::new(settings, api_key, transport.clone()))
                    }
                }
            };
            registry.register(profile, adapter)?;
        }

        tracing::info!(
            providers = ?registry.names(),
            mock = config.mock.enabled,
            "Provider registry initialized"
        );

        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ProviderAdapter>> {
        self.index.get(name).map(|&i| &self.entries[i].adapter)
    }

    pub fn profile(&self, name: &str) -> Option<&ProviderProfile> {
        self.index.get(name).map(|&i| &self.entries[i].profile)
    }

    /// All profiles in registration order
    pub fn profiles(&self) -> impl Iterator<Item = &ProviderProfile> {
        self.entries.iter().map(|e| &e.profile)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.profile.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fail with `AppError::UnknownModel` unless `name` is registered
    pub fn require(&self, name: &str) -> AppResult<&Arc<dyn ProviderAdapter>> {
        self.get(name).ok_or_else(|| AppError::UnknownModel {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }
}

/// Await `fut` for at most `timeout`, mapping expiry to a timeout failure
///
/// The abandoned future is dropped; the remote side may keep working.
pub(crate) async fn with_deadline<T, F>(timeout: Duration, fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(ProviderError::timeout(timeout.as_millis() as u64)),
    }
}

/// Parse a response body as JSON, mapping failure to a parse error
pub(crate) fn parse_json(body: &str) -> Result<serde_json::Value, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::parse(format!("invalid JSON body: {}", e)))
}

/// Envelope code as an HTTP status, if it is one
pub(crate) fn http_status(code: u64) -> Option<u16> {
    u16::try_from(code)
        .ok()
        .filter(|status| (100..=599).contains(status))
}

/// Serialize a request body
pub(crate) fn encode_body<T: Serialize>(body: &T) -> Result<serde_json::Value, ProviderError> {
    serde_json::to_value(body)
        .map_err(|e| ProviderError::other(format!("failed to encode request body: {}", e)))
}

/// Clip text for log fields
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let clipped: String = text.chars().take(max_chars).collect();
        format!("{}…", clipped)
    }
}
