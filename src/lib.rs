//! Jarvis Orchestrator - concurrent multi-provider AI orchestration
//!
//! Sends one prompt to several AI providers at once, retries transient
//! failures with exponential backoff, classifies every failure, and routes
//! single chats to the best available provider with health-aware fallback.

pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod retry;
pub mod router;
pub mod telemetry;
