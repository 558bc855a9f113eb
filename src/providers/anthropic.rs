//! Anthropic messages adapter
//!
//! Vendor quirks handled here:
//! - system messages are hoisted into the top-level `system` field
//! - generated text is split across `content[*]` blocks of type `text`
//! - errors come back as `{"type": "error", "error": {"type": ..., "message": ...}}`,
//!   sometimes with a 200 status, so the envelope type decides the status

use super::transport::{HttpRequest, Transport};
use super::{
    Completion, PromptRequest, ProviderAdapter, Role, TokenUsage, encode_body, parse_json,
    preview, with_deadline,
};
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Map an Anthropic error envelope type to the HTTP status it stands for
pub(crate) fn status_for_error_type(error_type: &str) -> u16 {
    match error_type {
        "authentication_error" => 401,
        "permission_error" => 403,
        "not_found_error" => 404,
        "request_too_large" => 413,
        "rate_limit_error" => 429,
        "overloaded_error" => 503,
        "invalid_request_error" => 400,
        _ => 500,
    }
}

/// Adapter for `POST {base_url}/messages`
pub struct AnthropicAdapter {
    name: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f64,
    api_key: Option<String>,
    api_key_vars: Vec<String>,
    transport: Arc<dyn Transport>,
}

impl AnthropicAdapter {
    pub fn new(
        settings: &ProviderSettings,
        api_key: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            name: settings.name().to_string(),
            model: settings.model().to_string(),
            base_url: settings.base_url().trim_end_matches('/').to_string(),
            max_tokens: settings.max_tokens(),
            temperature: settings.temperature(),
            api_key,
            api_key_vars: settings.api_key_vars(),
            transport,
        }
    }

    fn build_body(&self, request: &PromptRequest) -> Result<serde_json::Value, ProviderError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens().unwrap_or(self.max_tokens),
            temperature: request.temperature().unwrap_or(self.temperature),
            system: request.system_text(),
            messages: request
                .messages()
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| AnthropicMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };
        encode_body(&body)
    }
}

/// Extract text (and usage) from a messages response
pub(crate) fn parse_response(
    status: u16,
    body: &str,
) -> Result<(String, Option<TokenUsage>), ProviderError> {
    let value = parse_json(body).map_err(|parse_err| {
        if (200..300).contains(&status) {
            parse_err
        } else {
            ProviderError::http(status, preview(body, 200))
        }
    })?;

    let is_error_envelope = value.get("type").and_then(|t| t.as_str()) == Some("error");
    if is_error_envelope || !(200..300).contains(&status) {
        let error = value.get("error");
        let error_type = error
            .and_then(|e| e.get("type"))
            .and_then(|t| t.as_str())
            .unwrap_or("api_error");
        let message = error
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| preview(body, 200));
        let status = if is_error_envelope {
            status_for_error_type(error_type)
        } else {
            status
        };
        return Err(ProviderError::http(
            status,
            format!("{}: {}", error_type, message),
        ));
    }

    let parsed: MessagesResponse = serde_json::from_value(value)
        .map_err(|e| ProviderError::parse(format!("unexpected response shape: {}", e)))?;

    let texts: Vec<String> = parsed
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();

    if texts.is_empty() {
        return Err(ProviderError::parse("no text block in content[]"));
    }

    let usage = parsed.usage.map(|u| TokenUsage {
        input_tokens: u.input_tokens,
        output_tokens: u.output_tokens,
    });

    Ok((texts.concat(), usage))
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        request: &PromptRequest,
        timeout: Duration,
    ) -> Result<Completion, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::missing_api_key(&self.name, &self.api_key_vars));
        };

        let http_request =
            HttpRequest::post(format!("{}/messages", self.base_url), self.build_body(request)?)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION);

        tracing::debug!(
            provider = %self.name,
            model = %self.model,
            messages = request.messages().len(),
            timeout_ms = timeout.as_millis() as u64,
            "Sending messages request"
        );

        let start = Instant::now();
        let (output, usage) = with_deadline(timeout, async {
            let response = self.transport.send(http_request).await?;
            parse_response(response.status, &response.body)
        })
        .await?;

        Ok(Completion {
            output,
            duration: start.elapsed(),
            usage,
        })
    }
}
