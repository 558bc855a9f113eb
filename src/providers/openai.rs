//! OpenAI chat-completions adapter
//!
//! Also serves any OpenAI-compatible endpoint (Mistral, xAI, local
//! llama.cpp / Ollama servers) by pointing `base_url` at it.

use super::transport::{HttpRequest, Transport};
use super::{Completion, PromptRequest, ProviderAdapter, TokenUsage, parse_json, preview, with_deadline};
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Adapter for `POST {base_url}/chat/completions`
pub struct OpenAiAdapter {
    name: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f64,
    api_key: Option<String>,
    api_key_vars: Vec<String>,
    transport: Arc<dyn Transport>,
}

impl OpenAiAdapter {
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
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: request
                .messages()
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: request.max_tokens().unwrap_or(self.max_tokens),
            temperature: request.temperature().unwrap_or(self.temperature),
        };
        super::encode_body(&body)
    }
}

/// HTTP status implied by an error envelope delivered on a 2xx
///
/// A numeric `code` is taken as-is when it is a valid status. String codes
/// are checked before the broader `type`.
pub(crate) fn status_for_error(error: &serde_json::Value) -> u16 {
    let code = error.get("code");
    if let Some(status) = code
        .and_then(|c| c.as_u64())
        .and_then(super::http_status)
    {
        return status;
    }

    let by_code = code.and_then(|c| c.as_str()).and_then(|c| match c {
        "invalid_api_key" | "invalid_organization" => Some(401),
        "rate_limit_exceeded" | "insufficient_quota" => Some(429),
        "model_not_found" => Some(404),
        "context_length_exceeded" | "invalid_value" => Some(400),
        _ => None,
    });
    if let Some(status) = by_code {
        return status;
    }

    match error.get("type").and_then(|t| t.as_str()).unwrap_or_default() {
        "authentication_error" => 401,
        "permission_error" => 403,
        "not_found_error" => 404,
        "rate_limit_error" | "insufficient_quota" | "requests" | "tokens" => 429,
        "invalid_request_error" => 400,
        _ => 500,
    }
}

/// Extract text (and usage) from a chat-completions response
pub(crate) fn parse_response(
    status: u16,
    body: &str,
) -> Result<(String, Option<TokenUsage>), ProviderError> {
    // Non-JSON error pages still carry a meaningful status
    let value = parse_json(body).map_err(|parse_err| {
        if (200..300).contains(&status) {
            parse_err
        } else {
            ProviderError::http(status, preview(body, 200))
        }
    })?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error")
            .to_string();
        let status = if (200..300).contains(&status) {
            status_for_error(error)
        } else {
            status
        };
        return Err(ProviderError::http(status, message));
    }

    if !(200..300).contains(&status) {
        return Err(ProviderError::http(status, preview(body, 200)));
    }

    let parsed: ChatCompletionResponse = serde_json::from_value(value)
        .map_err(|e| ProviderError::parse(format!("unexpected response shape: {}", e)))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| ProviderError::parse("missing choices[0].message.content"))?;

    let usage = parsed.usage.map(|u| TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    Ok((text, usage))
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
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

        let http_request = HttpRequest::post(
            format!("{}/chat/completions", self.base_url),
            self.build_body(request)?,
        )
        .header("Authorization", format!("Bearer {}", api_key));

        tracing::debug!(
            provider = %self.name,
            model = %self.model,
            messages = request.messages().len(),
            timeout_ms = timeout.as_millis() as u64,
            "Sending chat completion request"
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
