//! Provider routing
//!
//! Picks one provider per chat request from capability requirements, task
//! heuristics, load and observed latency, then falls back to an alternate
//! provider when the chosen one fails.

pub mod health;
pub mod provider_router;

pub use health::{HealthTracker, ProviderHealth};
pub use provider_router::ProviderRouter;

use crate::providers::TokenUsage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Task type hint used by cost optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Simple,
    Creative,
    Coding,
    Analysis,
    #[default]
    General,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Creative => "creative",
            Self::Coding => "coding",
            Self::Analysis => "analysis",
            Self::General => "general",
        }
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "creative" => Ok(Self::Creative),
            "coding" | "code" => Ok(Self::Coding),
            "analysis" => Ok(Self::Analysis),
            "general" => Ok(Self::General),
            other => Err(format!(
                "unknown task type '{}' (expected simple, creative, coding, analysis or general)",
                other
            )),
        }
    }
}

/// Per-request routing options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOptions {
    pub provider: Option<String>,
    pub task_type: TaskType,
    pub requires_vision: bool,
    pub requires_functions: bool,
    pub prefer_speed: bool,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bypass selection and use this provider
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    pub fn requiring_vision(mut self) -> Self {
        self.requires_vision = true;
        self
    }

    pub fn requiring_functions(mut self) -> Self {
        self.requires_functions = true;
        self
    }

    pub fn preferring_speed(mut self) -> Self {
        self.prefer_speed = true;
        self
    }
}

/// Which selection rule picked the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Explicit,
    CostOptimized,
    LoadBalanced,
    Fastest,
    Default,
    FirstAvailable,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::CostOptimized => "cost_optimized",
            Self::LoadBalanced => "load_balanced",
            Self::Fastest => "fastest",
            Self::Default => "default",
            Self::FirstAvailable => "first_available",
        }
    }
}

/// Result of a routing decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub provider: String,
    pub reason: SelectionReason,
}

impl RoutingDecision {
    pub fn new(provider: impl Into<String>, reason: SelectionReason) -> Self {
        Self {
            provider: provider.into(),
            reason,
        }
    }
}

/// Successful routed chat
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub content: String,
    /// Provider that produced `content` (the fallback target if one was used)
    pub provider: String,
    pub model: String,
    /// USD, from reported or estimated token usage
    pub cost: f64,
    pub tokens: TokenUsage,
    pub duration: Duration,
    /// Provider that failed first, when the response came from a fallback
    pub fallback_from: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_parse() {
        assert_eq!("simple".parse::<TaskType>().unwrap(), TaskType::Simple);
        assert_eq!("Coding".parse::<TaskType>().unwrap(), TaskType::Coding);
        assert_eq!("code".parse::<TaskType>().unwrap(), TaskType::Coding);
        assert!("poetry".parse::<TaskType>().is_err());
        assert_eq!(TaskType::default(), TaskType::General);
    }

    #[test]
    fn test_route_options_builder() {
        let opts = RouteOptions::new()
            .with_task_type(TaskType::Analysis)
            .requiring_vision()
            .preferring_speed();
        assert_eq!(opts.task_type, TaskType::Analysis);
        assert!(opts.requires_vision);
        assert!(!opts.requires_functions);
        assert!(opts.prefer_speed);
        assert!(opts.provider.is_none());
    }
}
