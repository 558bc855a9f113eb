//! Command-line interface for jarvis-orchestrate
//!
//! Provides argument parsing, prompt assembly and the `config` template
//! subcommand.

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::providers::{Message, PromptRequest};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Send one prompt to several AI models at once
#[derive(Parser, Debug)]
#[command(name = "jarvis-orchestrate")]
#[command(version)]
#[command(about = "Send one prompt to several AI models concurrently and collect every answer")]
#[command(
    long_about = "Fans a prompt out to multiple AI providers in parallel, retries transient \
    failures with exponential backoff, and prints a JSON report of every success and failure. \
    Exits 0 if at least one model answered."
)]
pub struct Cli {
    /// Prompt text
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Read the prompt from a file (appended after --prompt when both are given)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Comma-separated models to query (default: orchestration.default_models)
    #[arg(short, long, value_delimiter = ',')]
    pub models: Option<Vec<String>>,

    /// Per-attempt timeout in milliseconds (clamped to orchestration.max_timeout_ms)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Retries per model after the first attempt
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Optional system instruction sent ahead of the prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Path to a TOML configuration file (built-in defaults otherwise)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Use simulated providers instead of real APIs
    #[arg(long)]
    pub mock: bool,

    /// Dump Prometheus metrics to stderr when done
    #[arg(long)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Build the prompt request from `--prompt`, `--file` and `--system`
    ///
    /// # Errors
    /// `Io` if the prompt file cannot be read, `Validation` if no prompt text
    /// remains after trimming.
    pub fn prompt_request(&self) -> AppResult<PromptRequest> {
        let mut parts = Vec::new();
        if let Some(prompt) = &self.prompt {
            parts.push(prompt.trim().to_string());
        }
        if let Some(path) = &self.file {
            let content = std::fs::read_to_string(path).map_err(|source| AppError::Io {
                path: path.display().to_string(),
                source,
            })?;
            parts.push(content.trim().to_string());
        }
        parts.retain(|p| !p.is_empty());

        if parts.is_empty() {
            return Err(AppError::Validation(
                "no prompt given; pass --prompt <text> or --file <path>".to_string(),
            ));
        }

        let mut messages = Vec::new();
        if let Some(system) = self.system.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(parts.join("\n\n")));
        Ok(PromptRequest::from_messages(messages))
    }

    /// Models named on the command line, else the configured defaults
    pub fn models(&self, config: &Config) -> Vec<String> {
        match &self.models {
            Some(models) => models
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            None => config.default_models(),
        }
    }

    pub fn timeout_ms(&self, config: &Config) -> u64 {
        self.timeout
            .unwrap_or(config.orchestration.default_timeout_ms)
    }

    pub fn retries(&self, config: &Config) -> u32 {
        self.retries.unwrap_or(config.orchestration.default_retries)
    }
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# Jarvis Orchestrator Configuration
# ==================================
#
# Every section is optional; omitted values fall back to the built-in
# defaults shown here. API keys are never stored in this file: each
# provider names the environment variables that hold its key.

# ─────────────────────────────────────────────────────────────────────────────
# ORCHESTRATION
# ─────────────────────────────────────────────────────────────────────────────

[orchestration]
# Per-attempt timeout when --timeout is not given (milliseconds)
default_timeout_ms = 60000

# Caller-supplied timeouts are clamped to this (milliseconds)
max_timeout_ms = 120000

# Retries per model after the first attempt when --retries is not given
default_retries = 3

# Exponential backoff: base * 2^(attempt-1), capped at max_backoff_ms
base_backoff_ms = 1000
max_backoff_ms = 8000

# Models queried when --models is not given (empty = all providers)
default_models = ["claude", "gpt"]

# ─────────────────────────────────────────────────────────────────────────────
# PROVIDERS
# ─────────────────────────────────────────────────────────────────────────────
#
# kind selects the wire protocol:
#   - anthropic: Anthropic messages API
#   - openai:    OpenAI chat completions (also Mistral and other compatible APIs)
#   - gemini:    Google generateContent API
#
# Costs are USD per 1000 tokens and only affect router cost estimates.

[[providers]]
name = "claude"
kind = "anthropic"
model = "claude-3-5-sonnet-20241022"
base_url = "https://api.anthropic.com/v1"
api_key_env = "ANTHROPIC_API_KEY"
api_key_aliases = ["CLAUDE_API_KEY"]
max_tokens = 4096
temperature = 0.7
input_cost_per_1k = 0.003
output_cost_per_1k = 0.015
supports_vision = true
supports_functions = true

[[providers]]
name = "gpt"
kind = "openai"
model = "gpt-4o"
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
max_tokens = 4096
temperature = 0.7
input_cost_per_1k = 0.0025
output_cost_per_1k = 0.01
supports_vision = true
supports_functions = true

[[providers]]
name = "gemini"
kind = "gemini"
model = "gemini-1.5-pro"
base_url = "https://generativelanguage.googleapis.com/v1beta"
api_key_env = "GEMINI_API_KEY"
api_key_aliases = ["GOOGLE_API_KEY"]
max_tokens = 4096
temperature = 0.7
input_cost_per_1k = 0.00125
output_cost_per_1k = 0.005
supports_vision = true
supports_functions = true

[[providers]]
name = "mistral"
kind = "openai"
model = "mistral-large-latest"
base_url = "https://api.mistral.ai/v1"
api_key_env = "MISTRAL_API_KEY"
max_tokens = 4096
temperature = 0.7
input_cost_per_1k = 0.002
output_cost_per_1k = 0.006
supports_vision = false
supports_functions = true

# ─────────────────────────────────────────────────────────────────────────────
# ROUTER
# ─────────────────────────────────────────────────────────────────────────────

[router]
default_provider = "claude"

# Task heuristics: simple -> cheapest, creative/coding/analysis -> preferred provider
cost_optimization = false
creative_provider = "claude"
coding_provider = "gpt"
analysis_provider = "claude"

# Estimated prompt tokens at which analysis counts as long-context
long_context_tokens = 4000

# Round robin across healthy providers
load_balancing = false

# Retry a failed chat on an alternate provider, at most max_fallback_hops times
fallback_enabled = true
max_fallback_hops = 1

# ─────────────────────────────────────────────────────────────────────────────
# MOCK PROVIDERS (--mock or USE_MOCK_MODELS=true)
# ─────────────────────────────────────────────────────────────────────────────

[mock]
enabled = false
min_latency_ms = 50
max_latency_ms = 300
# Probability of a simulated retryable failure per call (0.0 - 1.0)
failure_rate = 0.0

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# trace, debug, info, warn or error (LOG_LEVEL and RUST_LOG override this)
log_level = "info"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_arguments() {
        let cli = Cli::parse_from(["jarvis-orchestrate"]);
        assert!(cli.config.is_none());
        assert!(cli.command.is_none());
        assert!(!cli.mock);
        assert!(cli.prompt_request().is_err());
    }

    #[test]
    fn short_flags() {
        let cli = Cli::parse_from([
            "jarvis-orchestrate",
            "-p",
            "Explain ownership",
            "-m",
            "claude,gpt, gemini",
            "-t",
            "5000",
            "-r",
            "1",
            "-o",
            "out.json",
            "-c",
            "jarvis.toml",
        ]);
        assert_eq!(cli.prompt.as_deref(), Some("Explain ownership"));
        assert_eq!(cli.timeout, Some(5000));
        assert_eq!(cli.retries, Some(1));
        assert_eq!(cli.output, Some(PathBuf::from("out.json")));
        assert_eq!(cli.config.as_deref(), Some("jarvis.toml"));
        assert_eq!(
            cli.models(&Config::default()),
            vec!["claude", "gpt", "gemini"]
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Cli::try_parse_from(["jarvis-orchestrate", "-p", "hi", "-t", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(Cli::try_parse_from(["jarvis-orchestrate", "-p", "hi", "-t", "1"]).is_ok());
    }

    #[test]
    fn defaults_come_from_config() {
        let cli = Cli::parse_from(["jarvis-orchestrate", "-p", "hi"]);
        let config = Config::default();
        assert_eq!(cli.models(&config), vec!["claude", "gpt"]);
        assert_eq!(cli.timeout_ms(&config), 60_000);
        assert_eq!(cli.retries(&config), 3);
    }

    #[test]
    fn system_flag_adds_system_message() {
        let cli = Cli::parse_from(["jarvis-orchestrate", "-p", "hi", "--system", "Be terse"]);
        let request = cli.prompt_request().unwrap();
        assert_eq!(
            request.messages(),
            &[Message::system("Be terse"), Message::user("hi")]
        );
    }

    #[test]
    fn whitespace_prompt_is_rejected() {
        let cli = Cli::parse_from(["jarvis-orchestrate", "-p", "   "]);
        assert!(matches!(cli.prompt_request(), Err(AppError::Validation(_))));
    }

    #[test]
    fn config_subcommand() {
        let cli = Cli::parse_from(["jarvis-orchestrate", "config"]);
        assert!(matches!(cli.command, Some(Command::Config { output: None })));
    }

    #[test]
    fn config_subcommand_with_output() {
        let cli = Cli::parse_from(["jarvis-orchestrate", "config", "-o", "my-config.toml"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config { output: Some(ref path) }) if path == &PathBuf::from("my-config.toml")
        ));
    }

    #[test]
    fn template_is_a_valid_config() {
        let config: Config = generate_config_template()
            .parse()
            .expect("template should parse and validate");
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.router.max_fallback_hops, 1);
        assert_eq!(config.default_models(), vec!["claude", "gpt"]);
    }

    #[test]
    fn template_has_all_sections() {
        let template = generate_config_template();
        assert!(template.contains("[orchestration]"));
        assert!(template.contains("[[providers]]"));
        assert!(template.contains("[router]"));
        assert!(template.contains("[mock]"));
        assert!(template.contains("[observability]"));
    }
}
