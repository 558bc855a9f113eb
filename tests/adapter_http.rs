//! HTTP-level tests for the vendor adapters
//!
//! Each adapter is pointed at a wiremock server through the real
//! `ReqwestTransport`, so request paths, headers, bodies and response
//! parsing are exercised end to end.

use jarvis_orchestrator::classify::{ErrorCategory, classify};
use jarvis_orchestrator::config::{Config, ProviderSettings};
use jarvis_orchestrator::error::TransportFault;
use jarvis_orchestrator::providers::{
    AnthropicAdapter, GeminiAdapter, Message, OpenAiAdapter, PromptRequest, ProviderAdapter,
    ReqwestTransport, Transport,
};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a single provider of `kind` pointed at `base_url`
fn settings(kind: &str, model: &str, base_url: &str) -> ProviderSettings {
    let toml = format!(
        r#"
[[providers]]
name = "test-{kind}"
kind = "{kind}"
model = "{model}"
base_url = "{base_url}"
api_key_env = "TEST_API_KEY"
max_tokens = 256
temperature = 0.5
"#
    );
    Config::from_str(&toml)
        .expect("test config should parse")
        .providers
        .remove(0)
}

fn transport() -> Arc<dyn Transport> {
    Arc::new(ReqwestTransport::new().expect("client should build"))
}

fn key() -> Option<String> {
    Some("test-key".to_string())
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_openai_sends_bearer_and_parses_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "max_tokens": 256,
            "messages": [{"role": "user", "content": "Hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hi there"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(
        &settings("openai", "gpt-4o", &format!("{}/v1", server.uri())),
        key(),
        transport(),
    );
    let completion = adapter
        .call(&PromptRequest::from_prompt("Hello"), TIMEOUT)
        .await
        .expect("call should succeed");

    assert_eq!(completion.output, "Hi there");
    let usage = completion.usage.expect("usage reported");
    assert_eq!(usage.input_tokens, 3);
    assert_eq!(usage.output_tokens, 2);
}

#[tokio::test]
async fn test_openai_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached for requests", "type": "requests"}
        })))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&settings("openai", "gpt-4o", &server.uri()), key(), transport());
    let err = adapter
        .call(&PromptRequest::from_prompt("Hello"), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(429));
    assert!(err.message().contains("Rate limit"));
    assert_eq!(classify(&err).category, ErrorCategory::RateLimit);
}

#[tokio::test]
async fn test_openai_html_error_page_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&settings("openai", "m", &server.uri()), key(), transport());
    let err = adapter
        .call(&PromptRequest::from_prompt("Hello"), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(502));
    let c = classify(&err);
    assert_eq!(c.category, ErrorCategory::GenericServer);
    assert!(c.retryable);
}

#[tokio::test]
async fn test_openai_missing_content_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&settings("openai", "m", &server.uri()), key(), transport());
    let err = adapter
        .call(&PromptRequest::from_prompt("Hello"), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.status(), None);
    assert_eq!(classify(&err).category, ErrorCategory::Parse);
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&settings("openai", "m", &server.uri()), key(), transport());
    let err = adapter
        .call(&PromptRequest::from_prompt("Hello"), Duration::from_millis(200))
        .await
        .unwrap_err();

    assert_eq!(err.fault(), Some(TransportFault::Timeout));
    let c = classify(&err);
    assert_eq!(c.category, ErrorCategory::Timeout);
    assert!(c.retryable);
}

#[tokio::test]
async fn test_missing_key_fails_without_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&settings("openai", "m", &server.uri()), None, transport());
    let err = adapter
        .call(&PromptRequest::from_prompt("Hello"), TIMEOUT)
        .await
        .unwrap_err();

    assert!(err.message().contains("TEST_API_KEY"));
    let c = classify(&err);
    assert_eq!(c.category, ErrorCategory::Auth);
    assert!(!c.retryable);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Nothing listens on port 9 (discard) on a test machine
    let adapter = OpenAiAdapter::new(&settings("openai", "m", "http://127.0.0.1:9"), key(), transport());
    let err = adapter
        .call(&PromptRequest::from_prompt("Hello"), TIMEOUT)
        .await
        .unwrap_err();

    assert!(err.fault().is_some(), "expected a transport fault, got {}", err);
    let c = classify(&err);
    assert!(c.retryable);
}

// ---------------------------------------------------------------------------
// Anthropic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_anthropic_headers_and_system_hoisting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-3-5-sonnet-20241022",
            "system": "Be brief.",
            "messages": [{"role": "user", "content": "Hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "message",
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": " back"}
            ],
            "usage": {"input_tokens": 5, "output_tokens": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(
        &settings(
            "anthropic",
            "claude-3-5-sonnet-20241022",
            &format!("{}/v1", server.uri()),
        ),
        key(),
        transport(),
    );
    let request = PromptRequest::from_messages(vec![
        Message::system("Be brief."),
        Message::user("Hello"),
    ]);
    let completion = adapter.call(&request, TIMEOUT).await.expect("call should succeed");

    assert_eq!(completion.output, "Hello back");
    assert_eq!(completion.usage.map(|u| u.total()), Some(7));
}

#[tokio::test]
async fn test_anthropic_auth_error_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(&settings("anthropic", "c", &server.uri()), key(), transport());
    let err = adapter
        .call(&PromptRequest::from_prompt("Hello"), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert!(err.message().contains("authentication_error"));
    assert_eq!(classify(&err).category, ErrorCategory::Auth);
}

#[tokio::test]
async fn test_anthropic_overloaded_envelope_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(&settings("anthropic", "c", &server.uri()), key(), transport());
    let err = adapter
        .call(&PromptRequest::from_prompt("Hello"), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    let c = classify(&err);
    assert_eq!(c.category, ErrorCategory::Overloaded);
    assert!(c.retryable);
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_gemini_path_header_and_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [
                {"role": "user", "parts": [{"text": "Hi"}]},
                {"role": "model", "parts": [{"text": "Hello"}]},
                {"role": "user", "parts": [{"text": "How are you?"}]}
            ],
            "systemInstruction": {"parts": [{"text": "Be kind."}]},
            "generationConfig": {"maxOutputTokens": 256}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Fine, "}, {"text": "thanks"}]}}],
            "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 3}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::new(
        &settings(
            "gemini",
            "gemini-1.5-pro",
            &format!("{}/v1beta", server.uri()),
        ),
        key(),
        transport(),
    );
    let request = PromptRequest::from_messages(vec![
        Message::system("Be kind."),
        Message::user("Hi"),
        Message::assistant("Hello"),
        Message::user("How are you?"),
    ]);
    let completion = adapter.call(&request, TIMEOUT).await.expect("call should succeed");

    assert_eq!(completion.output, "Fine, thanks");
    let usage = completion.usage.expect("usage reported");
    assert_eq!(usage.input_tokens, 9);
    assert_eq!(usage.output_tokens, 3);
}

#[tokio::test]
async fn test_gemini_error_envelope_uses_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::new(&settings("gemini", "g", &server.uri()), key(), transport());
    let err = adapter
        .call(&PromptRequest::from_prompt("Hello"), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(429));
    assert!(err.message().starts_with("RESOURCE_EXHAUSTED"));
    assert_eq!(classify(&err).category, ErrorCategory::RateLimit);
}

#[tokio::test]
async fn test_gemini_blocked_candidate_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        })))
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::new(&settings("gemini", "g", &server.uri()), key(), transport());
    let err = adapter
        .call(&PromptRequest::from_prompt("Hello"), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(classify(&err).category, ErrorCategory::Parse);
}
