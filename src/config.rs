//! Configuration management for the orchestrator
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Every section has defaults, so the CLI works without a config file; the
//! environment (`USE_MOCK_MODELS`, `LOG_LEVEL`, per-provider API keys) is
//! layered on top by [`Config::apply_env`] and [`ProviderSettings::resolve_api_key`].

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

/// Hard upper bound on any per-call timeout (10 minutes)
pub const TIMEOUT_CEILING_MS: u64 = 600_000;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default = "builtin_providers")]
    pub providers: Vec<ProviderSettings>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub mock: MockConfig,
}

/// Fan-out, timeout and retry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestrationConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Caller-supplied timeouts are clamped to this value
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub default_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Models used when the CLI is invoked without `--models` (empty = all providers)
    #[serde(default)]
    pub default_models: Vec<String>,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            default_retries: default_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            default_models: Vec::new(),
        }
    }
}

impl OrchestrationConfig {
    /// Clamp a caller-specified timeout to the configured maximum
    pub fn clamp_timeout(&self, requested_ms: u64) -> u64 {
        if requested_ms > self.max_timeout_ms {
            tracing::warn!(
                requested_ms = requested_ms,
                max_timeout_ms = self.max_timeout_ms,
                "Requested timeout exceeds configured maximum, clamping"
            );
            self.max_timeout_ms
        } else {
            requested_ms
        }
    }
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_timeout_ms() -> u64 {
    120_000
}

fn default_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions (also Mistral, xAI and other compatible APIs)
    Openai,
    /// Anthropic messages API
    Anthropic,
    /// Google Gemini generateContent API
    Gemini,
}

/// Individual provider configuration
///
/// All fields are private to enforce invariants. Configuration is loaded via
/// deserialization and validated via Config::validate().
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderSettings {
    name: String,
    kind: ProviderKind,
    model: String,
    base_url: String,
    /// Primary environment variable holding the API key
    api_key_env: String,
    /// Additional environment variables checked in order after `api_key_env`
    #[serde(default)]
    api_key_aliases: Vec<String>,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_temperature")]
    temperature: f64,
    /// USD per 1000 prompt tokens
    #[serde(default)]
    input_cost_per_1k: f64,
    /// USD per 1000 completion tokens
    #[serde(default)]
    output_cost_per_1k: f64,
    #[serde(default)]
    supports_vision: bool,
    #[serde(default)]
    supports_functions: bool,
}

impl ProviderSettings {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn input_cost_per_1k(&self) -> f64 {
        self.input_cost_per_1k
    }

    pub fn output_cost_per_1k(&self) -> f64 {
        self.output_cost_per_1k
    }

    pub fn supports_vision(&self) -> bool {
        self.supports_vision
    }

    pub fn supports_functions(&self) -> bool {
        self.supports_functions
    }

    /// All environment variables that may hold this provider's key, in lookup order
    pub fn api_key_vars(&self) -> Vec<String> {
        std::iter::once(self.api_key_env.clone())
            .chain(self.api_key_aliases.iter().cloned())
            .collect()
    }

    /// Resolve the API key through `lookup` (normally `std::env::var`)
    ///
    /// Empty values are treated as unset.
    pub fn resolve_api_key<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key_vars()
            .iter()
            .filter_map(|var| lookup(var))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }

    #[allow(clippy::too_many_arguments)]
    fn builtin(
        name: &str,
        kind: ProviderKind,
        model: &str,
        base_url: &str,
        api_key_env: &str,
        api_key_aliases: &[&str],
        costs: (f64, f64),
        supports_vision: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            model: model.to_string(),
            base_url: base_url.to_string(),
            api_key_env: api_key_env.to_string(),
            api_key_aliases: api_key_aliases.iter().map(|s| s.to_string()).collect(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            input_cost_per_1k: costs.0,
            output_cost_per_1k: costs.1,
            supports_vision,
            supports_functions: true,
        }
    }
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f64 {
    0.7
}

fn builtin_providers() -> Vec<ProviderSettings> {
    vec![
        ProviderSettings::builtin(
            "claude",
            ProviderKind::Anthropic,
            "claude-3-5-sonnet-20241022",
            "https://api.anthropic.com/v1",
            "ANTHROPIC_API_KEY",
            &["CLAUDE_API_KEY"],
            (0.003, 0.015),
            true,
        ),
        ProviderSettings::builtin(
            "gpt",
            ProviderKind::Openai,
            "gpt-4o",
            "https://api.openai.com/v1",
            "OPENAI_API_KEY",
            &[],
            (0.0025, 0.01),
            true,
        ),
        ProviderSettings::builtin(
            "gemini",
            ProviderKind::Gemini,
            "gemini-1.5-pro",
            "https://generativelanguage.googleapis.com/v1beta",
            "GEMINI_API_KEY",
            &["GOOGLE_API_KEY"],
            (0.00125, 0.005),
            true,
        ),
        ProviderSettings::builtin(
            "mistral",
            ProviderKind::Openai,
            "mistral-large-latest",
            "https://api.mistral.ai/v1",
            "MISTRAL_API_KEY",
            &[],
            (0.002, 0.006),
            false,
        ),
    ]
}

/// Provider router settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Used when no other rule picks a provider
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Enables task-type heuristics that trade capability for cost
    #[serde(default)]
    pub cost_optimization: bool,
    /// Round robin across healthy providers
    #[serde(default)]
    pub load_balancing: bool,
    #[serde(default)]
    pub fallback_enabled: bool,
    /// Preferred provider for creative tasks
    #[serde(default)]
    pub creative_provider: Option<String>,
    /// Preferred provider for coding tasks
    #[serde(default)]
    pub coding_provider: Option<String>,
    /// Preferred provider for long-context analysis
    #[serde(default)]
    pub analysis_provider: Option<String>,
    /// Estimated prompt tokens at which analysis counts as long-context
    #[serde(default = "default_long_context_tokens")]
    pub long_context_tokens: usize,
    /// Upper bound on fallback hops per chat call (also bounded by provider count)
    #[serde(default = "default_max_fallback_hops")]
    pub max_fallback_hops: usize,
}

fn default_long_context_tokens() -> usize {
    4_000
}

fn default_max_fallback_hops() -> usize {
    1
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            cost_optimization: false,
            load_balancing: false,
            fallback_enabled: false,
            creative_provider: None,
            coding_provider: None,
            analysis_provider: None,
            long_context_tokens: default_long_context_tokens(),
            max_fallback_hops: default_max_fallback_hops(),
        }
    }
}

/// Simulated provider behaviour for `USE_MOCK_MODELS`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mock_min_latency")]
    pub min_latency_ms: u64,
    #[serde(default = "default_mock_max_latency")]
    pub max_latency_ms: u64,
    /// Probability in [0, 1] that a simulated call fails with a retryable error
    #[serde(default)]
    pub failure_rate: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_latency_ms: default_mock_min_latency(),
            max_latency_ms: default_mock_max_latency(),
            failure_rate: 0.0,
        }
    }
}

fn default_mock_min_latency() -> u64 {
    50
}

fn default_mock_max_latency() -> u64 {
    300
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for Config {
    /// Built-in configuration: four providers, task preferences wired to them
    fn default() -> Self {
        Self {
            orchestration: OrchestrationConfig {
                default_models: vec!["claude".to_string(), "gpt".to_string()],
                ..OrchestrationConfig::default()
            },
            providers: builtin_providers(),
            router: RouterConfig {
                default_provider: Some("claude".to_string()),
                fallback_enabled: true,
                creative_provider: Some("claude".to_string()),
                coding_provider: Some("gpt".to_string()),
                analysis_provider: Some("claude".to_string()),
                ..RouterConfig::default()
            },
            observability: ObservabilityConfig::default(),
            mock: MockConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        let config: Self = toml::from_str(&content).map_err(|source| {
            AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            }
        })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Load from `path` if given, otherwise use the built-in defaults
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Apply `USE_MOCK_MODELS` and `LOG_LEVEL` overrides
    ///
    /// `lookup` is normally `|k| std::env::var(k).ok()`; tests inject a map.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("USE_MOCK_MODELS") {
            self.mock.enabled = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            let level = level.trim().to_ascii_lowercase();
            if LOG_LEVELS.contains(&level.as_str()) {
                self.observability.log_level = level;
            } else {
                tracing::warn!(
                    log_level = %level,
                    "Ignoring unrecognised LOG_LEVEL (expected debug, info, warn or error)"
                );
            }
        }
    }

    /// Look up a provider by name
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Models to orchestrate when the caller names none
    pub fn default_models(&self) -> Vec<String> {
        if self.orchestration.default_models.is_empty() {
            self.providers.iter().map(|p| p.name.clone()).collect()
        } else {
            self.orchestration.default_models.clone()
        }
    }

    /// Names of all configured providers, in configuration order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        if self.providers.is_empty() {
            return Err(AppError::Config(
                "No providers configured. Add at least one [[providers]] entry.".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(AppError::Config(
                    "Provider name must not be empty".to_string(),
                ));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(AppError::Config(format!(
                    "Duplicate provider name '{}'. Provider names must be unique.",
                    provider.name
                )));
            }
            if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
            {
                return Err(AppError::Config(format!(
                    "Provider '{}' has invalid base_url '{}'. \
                    base_url must start with 'http://' or 'https://'.",
                    provider.name, provider.base_url
                )));
            }
            if provider.max_tokens == 0 {
                return Err(AppError::Config(format!(
                    "Provider '{}' has max_tokens=0. max_tokens must be greater than 0.",
                    provider.name
                )));
            }
            if !(0.0..=2.0).contains(&provider.temperature) {
                return Err(AppError::Config(format!(
                    "Provider '{}' has invalid temperature {}. \
                    temperature must be a finite number between 0.0 and 2.0.",
                    provider.name, provider.temperature
                )));
            }
            for (field, cost) in [
                ("input_cost_per_1k", provider.input_cost_per_1k),
                ("output_cost_per_1k", provider.output_cost_per_1k),
            ] {
                if !cost.is_finite() || cost < 0.0 {
                    return Err(AppError::Config(format!(
                        "Provider '{}' has invalid {} {}. Costs must be finite and non-negative.",
                        provider.name, field, cost
                    )));
                }
            }
            if provider.api_key_env.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "Provider '{}' has an empty api_key_env",
                    provider.name
                )));
            }
        }

        let orch = &self.orchestration;
        if orch.max_timeout_ms == 0 || orch.max_timeout_ms > TIMEOUT_CEILING_MS {
            return Err(AppError::Config(format!(
                "orchestration.max_timeout_ms must be in (0, {}], got {}",
                TIMEOUT_CEILING_MS, orch.max_timeout_ms
            )));
        }
        if orch.default_timeout_ms == 0 || orch.default_timeout_ms > orch.max_timeout_ms {
            return Err(AppError::Config(format!(
                "orchestration.default_timeout_ms must be in (0, max_timeout_ms={}], got {}",
                orch.max_timeout_ms, orch.default_timeout_ms
            )));
        }
        if orch.base_backoff_ms == 0 {
            return Err(AppError::Config(
                "orchestration.base_backoff_ms must be greater than 0".to_string(),
            ));
        }
        if orch.max_backoff_ms < orch.base_backoff_ms {
            return Err(AppError::Config(format!(
                "orchestration.max_backoff_ms ({}) must be >= base_backoff_ms ({})",
                orch.max_backoff_ms, orch.base_backoff_ms
            )));
        }
        for model in &orch.default_models {
            if self.provider(model).is_none() {
                return Err(AppError::Config(format!(
                    "orchestration.default_models references unknown provider '{}'. Available: {}",
                    model,
                    self.provider_names().join(", ")
                )));
            }
        }

        for (field, value) in [
            ("router.default_provider", &self.router.default_provider),
            ("router.creative_provider", &self.router.creative_provider),
            ("router.coding_provider", &self.router.coding_provider),
            ("router.analysis_provider", &self.router.analysis_provider),
        ] {
            if let Some(name) = value
                && self.provider(name).is_none()
            {
                return Err(AppError::Config(format!(
                    "{} references unknown provider '{}'. Available: {}",
                    field,
                    name,
                    self.provider_names().join(", ")
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.mock.failure_rate) {
            return Err(AppError::Config(format!(
                "mock.failure_rate must be between 0.0 and 1.0, got {}",
                self.mock.failure_rate
            )));
        }
        if self.mock.min_latency_ms > self.mock.max_latency_ms {
            return Err(AppError::Config(format!(
                "mock.min_latency_ms ({}) must not exceed mock.max_latency_ms ({})",
                self.mock.min_latency_ms, self.mock.max_latency_ms
            )));
        }

        if !LOG_LEVELS.contains(&self.observability.log_level.as_str()) {
            return Err(AppError::Config(format!(
                "observability.log_level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.observability.log_level
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TEST_CONFIG: &str = r#"
[orchestration]
default_timeout_ms = 30000
max_timeout_ms = 60000
default_retries = 2
default_models = ["claude", "local"]

[[providers]]
name = "claude"
kind = "anthropic"
model = "claude-3-5-sonnet-20241022"
base_url = "https://api.anthropic.com/v1"
api_key_env = "ANTHROPIC_API_KEY"
api_key_aliases = ["CLAUDE_API_KEY"]
input_cost_per_1k = 0.003
output_cost_per_1k = 0.015
supports_vision = true

[[providers]]
name = "local"
kind = "openai"
model = "llama3"
base_url = "http://localhost:11434/v1"
api_key_env = "LOCAL_API_KEY"
max_tokens = 2048
temperature = 0.2

[router]
default_provider = "local"
cost_optimization = true
fallback_enabled = true

[observability]
log_level = "debug"
"#;

    #[test]
    fn test_config_from_str_parses_successfully() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.orchestration.default_timeout_ms, 30_000);
        assert_eq!(config.orchestration.default_retries, 2);
        // unspecified fields keep their defaults
        assert_eq!(config.orchestration.base_backoff_ms, 1_000);
        assert_eq!(config.orchestration.max_backoff_ms, 8_000);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_provider_fields_and_defaults() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        let claude = config.provider("claude").expect("claude configured");
        assert_eq!(claude.kind(), ProviderKind::Anthropic);
        assert_eq!(claude.max_tokens(), 4096);
        assert_eq!(claude.temperature(), 0.7);
        assert!(claude.supports_vision());
        assert!(!claude.supports_functions());

        let local = config.provider("local").expect("local configured");
        assert_eq!(local.kind(), ProviderKind::Openai);
        assert_eq!(local.max_tokens(), 2048);
        assert_eq!(local.input_cost_per_1k(), 0.0);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().expect("built-in config must validate");
        assert_eq!(
            config.provider_names(),
            vec!["claude", "gpt", "gemini", "mistral"]
        );
        assert!(!config.mock.enabled);
    }

    #[test]
    fn test_empty_file_uses_builtin_providers() {
        let config = Config::from_str("").expect("empty config is valid");
        assert_eq!(config.providers.len(), 4);
        assert!(config.router.default_provider.is_none());
        assert_eq!(config.default_models().len(), 4);
    }

    #[test]
    fn test_clamp_timeout() {
        let config = Config::default();
        assert_eq!(config.orchestration.clamp_timeout(5_000), 5_000);
        assert_eq!(config.orchestration.clamp_timeout(999_999), 120_000);
    }

    #[test]
    fn test_resolve_api_key_checks_aliases_in_order() {
        let config = Config::default();
        let claude = config.provider("claude").unwrap();

        let env: HashMap<&str, &str> = [("CLAUDE_API_KEY", "alias-key")].into_iter().collect();
        let key = claude.resolve_api_key(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(key.as_deref(), Some("alias-key"));

        let env: HashMap<&str, &str> = [("ANTHROPIC_API_KEY", "primary"), ("CLAUDE_API_KEY", "alias")]
            .into_iter()
            .collect();
        let key = claude.resolve_api_key(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_resolve_api_key_ignores_blank_values() {
        let config = Config::default();
        let gpt = config.provider("gpt").unwrap();
        assert_eq!(gpt.resolve_api_key(|_| Some("   ".to_string())), None);
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> =
            [("USE_MOCK_MODELS", "true"), ("LOG_LEVEL", "WARN")].into_iter().collect();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert!(config.mock.enabled);
        assert_eq!(config.observability.log_level, "warn");
    }

    #[test]
    fn test_apply_env_ignores_bad_log_level() {
        let mut config = Config::default();
        config.apply_env(|k| (k == "LOG_LEVEL").then(|| "loud".to_string()));
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_rejects_duplicate_provider_names() {
        let toml = r#"
[[providers]]
name = "a"
kind = "openai"
model = "m"
base_url = "http://localhost:1/v1"
api_key_env = "A_KEY"

[[providers]]
name = "a"
kind = "openai"
model = "m"
base_url = "http://localhost:2/v1"
api_key_env = "A_KEY"

[orchestration]
default_models = ["a"]
"#;
        let err = Config::from_str(toml).unwrap_err();
        assert!(err.to_string().contains("Duplicate provider name 'a'"));
    }

    #[test]
    fn test_rejects_unknown_router_provider() {
        let toml = r#"
[router]
coding_provider = "copilot"
"#;
        let err = Config::from_str(toml).unwrap_err();
        assert!(err.to_string().contains("router.coding_provider"));
    }

    #[test]
    fn test_rejects_default_timeout_above_max() {
        let toml = r#"
[orchestration]
default_timeout_ms = 90000
max_timeout_ms = 60000
"#;
        let err = Config::from_str(toml).unwrap_err();
        assert!(err.to_string().contains("default_timeout_ms"));
    }

    #[test]
    fn test_rejects_backoff_cap_below_base() {
        let toml = r#"
[orchestration]
base_backoff_ms = 2000
max_backoff_ms = 1000
"#;
        assert!(Config::from_str(toml).is_err());
    }

    #[test]
    fn test_rejects_invalid_failure_rate() {
        let toml = r#"
[mock]
failure_rate = 1.5
"#;
        let err = Config::from_str(toml).unwrap_err();
        assert!(err.to_string().contains("failure_rate"));
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let toml = r#"
[orchestration]
default_models = ["x"]

[[providers]]
name = "x"
kind = "gemini"
model = "m"
base_url = "ftp://example.com"
api_key_env = "X_KEY"
"#;
        let err = Config::from_str(toml).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }
}
