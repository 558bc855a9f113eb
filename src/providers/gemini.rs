//! Google Gemini generateContent adapter

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

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<OwnedPart>,
}

#[derive(Debug, Serialize)]
struct OwnedPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

/// Adapter for `POST {base_url}/models/{model}:generateContent`
///
/// The key travels in the `x-goog-api-key` header so it never lands in URLs
/// that may be logged.
pub struct GeminiAdapter {
    name: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f64,
    api_key: Option<String>,
    api_key_vars: Vec<String>,
    transport: Arc<dyn Transport>,
}

impl GeminiAdapter {
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
        let body = GenerateContentRequest {
            contents: request
                .messages()
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| Content {
                    role: if m.role == Role::Assistant { "model" } else { "user" },
                    parts: vec![Part { text: &m.content }],
                })
                .collect(),
            system_instruction: request.system_text().map(|text| SystemInstruction {
                parts: vec![OwnedPart { text }],
            }),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens().unwrap_or(self.max_tokens),
                temperature: request.temperature().unwrap_or(self.temperature),
            },
        };
        encode_body(&body)
    }
}

/// Extract text (and usage) from a generateContent response
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

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let code = error
            .get("code")
            .and_then(|c| c.as_u64())
            .and_then(super::http_status)
            .unwrap_or(if (200..300).contains(&status) { 500 } else { status });
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        let reason = error.get("status").and_then(|s| s.as_str()).unwrap_or("ERROR");
        return Err(ProviderError::http(code, format!("{}: {}", reason, message)));
    }

    if !(200..300).contains(&status) {
        return Err(ProviderError::http(status, preview(body, 200)));
    }

    let parsed: GenerateContentResponse = serde_json::from_value(value)
        .map_err(|e| ProviderError::parse(format!("unexpected response shape: {}", e)))?;

    let texts: Vec<String> = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if texts.is_empty() {
        return Err(ProviderError::parse(
            "missing candidates[0].content.parts[*].text",
        ));
    }

    let usage = parsed.usage_metadata.map(|u| TokenUsage {
        input_tokens: u.prompt_token_count,
        output_tokens: u.candidates_token_count,
    });

    Ok((texts.concat(), usage))
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
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

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let http_request =
            HttpRequest::post(url, self.build_body(request)?).header("x-goog-api-key", api_key);

        tracing::debug!(
            provider = %self.name,
            model = %self.model,
            timeout_ms = timeout.as_millis() as u64,
            "Sending generateContent request"
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
